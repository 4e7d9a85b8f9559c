use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Active configuration, with the assistant API key masked.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config().redacted();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_config_is_redacted() {
        let mut config = AppConfig::default();
        config.assistant.api_key = "sk-live-123".into();
        config.assistant.assistant_id = "asst_1".into();
        let state = web::Data::new(AppState::new(config).unwrap());

        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/api/v1/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["assistant"]["api_key"], "********");
        assert_eq!(body["config"]["assistant"]["assistant_id"], "asst_1");
        assert_eq!(body["config"]["bridge"]["flush_threshold"], 50);
    }
}
