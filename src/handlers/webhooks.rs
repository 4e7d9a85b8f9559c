use actix_web::{web, HttpResponse};
use tracing::info;

/// Log a call status callback from the telephony platform.
pub async fn webhook_receiver(payload: web::Json<serde_json::Value>) -> HttpResponse {
    info!(payload = %payload.0, "Webhook payload");
    HttpResponse::Ok().json("Webhook received.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use serde_json::json;

    #[actix_web::test]
    async fn test_webhook_acknowledged() {
        let app = test::init_service(
            App::new().route("/api/v1/webhooks/receiver", web::post().to(webhook_receiver)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/webhooks/receiver")
            .set_json(json!({"event": "call.completed", "call_id": "c1"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body, json!("Webhook received."));
    }

    #[actix_web::test]
    async fn test_webhook_rejects_non_json() {
        let app = test::init_service(
            App::new().route("/api/v1/webhooks/receiver", web::post().to(webhook_receiver)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/webhooks/receiver")
            .insert_header(("content-type", "application/json"))
            .set_payload("not json")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_client_error());
    }
}
