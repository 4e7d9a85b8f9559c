use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn root(state: web::Data<AppState>) -> HttpResponse {
    let server_domain = state.public_url.server_domain().await;

    HttpResponse::Ok().json(json!({
        "message": "Call bridge is running",
        "status": "healthy",
        "server_domain": server_domain
    }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": metrics.active_sessions,
            "total": metrics.total_sessions,
            "failed": metrics.failed_sessions,
            "failed_setups": metrics.failed_setups
        },
        "relay": {
            "call_frames": metrics.call_frames_relayed,
            "assistant_chunks": metrics.chunks_relayed
        }
    }))
}

/// Where the telephony platform will be told to connect.
pub async fn public_url_status(state: web::Data<AppState>) -> HttpResponse {
    let tunnel = state.public_url.current_tunnel_domain().await;
    let fallback = state.public_url.fallback_domain();
    let resolved = match &tunnel {
        Some(domain) => domain.clone(),
        None => fallback.to_string(),
    };

    HttpResponse::Ok().json(json!({
        "ngrok_running": tunnel.is_some(),
        "current_ngrok_url": tunnel.as_ref().map(|domain| format!("https://{}", domain)),
        "server_domain": resolved,
        "fallback_domain": if fallback.is_empty() { None } else { Some(fallback) }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App, HttpServer};

    fn state() -> web::Data<AppState> {
        // Nothing listens on the discard port
        state_with_ngrok("http://127.0.0.1:9")
    }

    fn state_with_ngrok(ngrok_api_url: &str) -> web::Data<AppState> {
        let mut config = AppConfig::default();
        config.public_url.ngrok_api_url = ngrok_api_url.into();
        config.public_url.server_domain = "bridge.example.com".into();
        web::Data::new(AppState::new(config).unwrap())
    }

    /// A local stand-in for the ngrok agent API with one https tunnel.
    fn start_ngrok_agent() -> (actix_web::dev::ServerHandle, String) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = HttpServer::new(|| {
            App::new().route(
                "/api/tunnels",
                web::get().to(|| async {
                    HttpResponse::Ok().json(json!({
                        "tunnels": [{"proto": "https", "public_url": "https://abc.ngrok.app"}]
                    }))
                }),
            )
        })
        .workers(1)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(server);
        (handle, url)
    }

    #[actix_web::test]
    async fn test_root_reports_the_live_tunnel() {
        let (agent, ngrok_api_url) = start_ngrok_agent();
        let app = test::init_service(
            App::new()
                .app_data(state_with_ngrok(&ngrok_api_url))
                .route("/", web::get().to(root)),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        agent.stop(false).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["server_domain"], "abc.ngrok.app");
    }

    #[actix_web::test]
    async fn test_root_falls_back_to_configured_domain() {
        let app = test::init_service(App::new().app_data(state()).route("/", web::get().to(root))).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["server_domain"], "bridge.example.com");
    }

    #[actix_web::test]
    async fn test_health_reports_sessions() {
        let state = state();
        state.session_started();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"]["active"], 1);
        assert_eq!(body["service"]["name"], "call-bridge");
    }

    #[actix_web::test]
    async fn test_public_url_without_ngrok() {
        let app = test::init_service(
            App::new()
                .app_data(state())
                .route("/public-url", web::get().to(public_url_status)),
        )
        .await;

        let req = test::TestRequest::get().uri("/public-url").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["ngrok_running"], false);
        assert_eq!(body["current_ngrok_url"], serde_json::Value::Null);
        assert_eq!(body["server_domain"], "bridge.example.com");
        assert_eq!(body["fallback_domain"], "bridge.example.com");
    }
}
