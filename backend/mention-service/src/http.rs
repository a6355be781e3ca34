//! Health, readiness and metrics endpoints

use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::dispatcher::{BoundedDispatcher, DispatcherState};
use crate::metrics;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

async fn ready(dispatcher: web::Data<Arc<BoundedDispatcher>>) -> impl Responder {
    let state = dispatcher.state();
    let body = serde_json::json!({
        "state": format!("{:?}", state),
        "workers": dispatcher.config().workers,
        "capacity": dispatcher.config().capacity,
        "queued": dispatcher.queued(),
        "in_flight": dispatcher.in_flight(),
    });

    if state == DispatcherState::Running {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

async fn metrics_handler() -> impl Responder {
    match metrics::render() {
        Ok((content_type, body)) => HttpResponse::Ok().content_type(content_type).body(body),
        Err(e) => HttpResponse::InternalServerError().body(format!("error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use crate::shutdown::Shutdown;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().configure(configure)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request())
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_ready_follows_dispatcher_state() {
        let (tx, shutdown) = Shutdown::channel();
        let dispatcher = BoundedDispatcher::start(DispatcherConfig::default(), shutdown);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone(&dispatcher)))
                .configure(configure),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        tx.send(true).unwrap();
        dispatcher.stopped().await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_metrics_exposition() {
        metrics::record_message("matched");

        let app = test::init_service(App::new().configure(configure)).await;
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("mention_service_messages_total"));
    }
}
