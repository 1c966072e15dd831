// ============================================================================
// REST API
// ============================================================================
//
// - auth:     caller identity from gateway headers
// - error:    OrderError to HTTP status and JSON body
// - handlers: one handler per endpoint, all delegating to OrderCommandHandler
//
// ============================================================================

mod auth;
mod error;
mod handlers;

pub use handlers::AppState;

use actix_web::web;

use crate::metrics::metrics_handler;
use error::ApiError;

/// Register every route. Literal segments come before `/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Unreadable bodies answer with the same JSON shape as domain errors
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid request body: {}", err)).into()),
    );
    cfg.service(
        web::scope("/commandes")
            .route("", web::post().to(handlers::place_order))
            .route("/my", web::get().to(handlers::list_my_orders))
            .route("/boutique/all", web::get().to(handlers::list_vendor_orders))
            .route("/admin/all", web::get().to(handlers::list_all_orders))
            .route("/boutique/accept/{id}", web::post().to(handlers::accept_lot))
            .route("/boutique/start-delivery/{id}", web::post().to(handlers::start_delivery))
            .route("/boutique/mark-depot/{id}", web::post().to(handlers::mark_depot))
            .route("/admin/confirm-depot/{id}", web::post().to(handlers::confirm_depot))
            .route("/cancel/{id}", web::post().to(handlers::cancel))
            .route("/cancel-item/{id}/{product_id}", web::post().to(handlers::cancel_item))
            .route("/confirm-receipt/{id}", web::post().to(handlers::confirm_receipt))
            .route("/{id}", web::get().to(handlers::get_order)),
    )
    .route("/admin/dead-letters", web::get().to(handlers::dead_letters))
    .route("/metrics", web::get().to(metrics_handler))
    .route("/health", web::get().to(handlers::health));
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::auth::{USER_ID_HEADER, USER_ROLE_HEADER, VENDOR_ID_HEADER};
    use crate::actors::DlqActor;
    use crate::domain::order::read_model::InMemoryOrderReadModel;
    use crate::domain::order::snapshot::tests::{builder, seeded};
    use crate::domain::order::{OrderCommandHandler, OrderSettings};
    use crate::event_sourcing::InMemoryEventStore;
    use crate::metrics::Metrics;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use chrono::{Duration, FixedOffset, Utc};
    use kameo::prelude::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Ids {
        client: Uuid,
        vendor_a: Uuid,
        vendor_b: Uuid,
    }

    async fn state() -> (web::Data<AppState>, Arc<Metrics>, Ids) {
        let (directory, client, vendor_a, vendor_b) = seeded().await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let orders = OrderCommandHandler::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryOrderReadModel::new()),
            builder(&directory),
            Arc::new(directory.clone()),
            metrics.clone(),
            OrderSettings {
                order_number_prefix: "CMD".to_string(),
                business_offset: FixedOffset::east_opt(3 * 3600).unwrap(),
                max_order_number_attempts: 5,
            },
        );
        let dlq = DlqActor::spawn(DlqActor::new(None, 16, metrics.clone()));

        let state = web::Data::new(AppState {
            orders: Arc::new(orders),
            dlq: Some(dlq),
            health: None,
        });
        (state, metrics, Ids { client, vendor_a, vendor_b })
    }

    fn as_client(req: test::TestRequest, client: Uuid) -> test::TestRequest {
        req.insert_header((USER_ID_HEADER, client.to_string()))
            .insert_header((USER_ROLE_HEADER, "client"))
    }

    fn as_vendor(req: test::TestRequest, vendor: Uuid) -> test::TestRequest {
        req.insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((USER_ROLE_HEADER, "vendor"))
            .insert_header((VENDOR_ID_HEADER, vendor.to_string()))
    }

    fn as_admin(req: test::TestRequest) -> test::TestRequest {
        req.insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((USER_ROLE_HEADER, "admin"))
    }

    fn place_body(mode: &str) -> serde_json::Value {
        serde_json::json!({
            "typedelivery": mode,
            "adresseLivraison": "Lot II A 12, Antananarivo",
            "paiementMethode": "cash",
            "note": "ring twice",
            "dateDeliveryOrAbleCollect": (Utc::now() + Duration::days(1)).to_rfc3339(),
        })
    }

    #[actix_web::test]
    async fn test_order_lifecycle_over_http() {
        let (state, metrics, ids) = state().await;
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .app_data(web::Data::new(metrics.clone()))
                .configure(configure),
        )
        .await;

        // Place
        let req = as_client(test::TestRequest::post().uri("/commandes"), ids.client)
            .set_json(place_body("supermarket_delivery"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers().get(header::ETAG).unwrap(), "\"1\"");
        let order: serde_json::Value = test::read_body_json(resp).await;
        let total: Decimal = order["total"].as_str().unwrap().parse().unwrap();
        assert_eq!(total, Decimal::from(4500));
        let order_id = order["id"].as_str().unwrap().to_string();

        // Accept with the version just read
        let req = as_vendor(
            test::TestRequest::post().uri(&format!("/commandes/boutique/accept/{}", order_id)),
            ids.vendor_a,
        )
        .insert_header((header::IF_MATCH, "\"1\""))
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::ETAG).unwrap(), "\"2\"");

        // Stale write
        let req = as_client(test::TestRequest::post().uri(&format!("/commandes/cancel/{}", order_id)), ids.client)
            .insert_header((header::IF_MATCH, "\"1\""))
            .set_json(serde_json::json!({ "reason": "too slow" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // Admin confirms lot B at the depot; client cancellation is then refused
        let req = as_admin(test::TestRequest::post().uri(&format!("/commandes/admin/confirm-depot/{}", order_id)))
            .set_json(serde_json::json!({ "boutiqueId": ids.vendor_b }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = as_client(test::TestRequest::post().uri(&format!("/commandes/cancel/{}", order_id)), ids.client)
            .set_json(serde_json::json!({ "reason": "too slow" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "already_in_transit");

        // Listings
        let req = as_client(test::TestRequest::get().uri("/commandes/my"), ids.client).to_request();
        let mine: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(mine.len(), 1);

        let req = as_vendor(test::TestRequest::get().uri("/commandes/boutique/all"), ids.vendor_b).to_request();
        let theirs: Vec<serde_json::Value> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(theirs.len(), 1);

        let req = as_client(test::TestRequest::get().uri(&format!("/commandes/{}", order_id)), ids.client).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::ETAG).unwrap(), "\"3\"");
    }

    #[actix_web::test]
    async fn test_identity_and_role_gates() {
        let (state, metrics, ids) = state().await;
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .app_data(web::Data::new(metrics))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/commandes/my").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = as_client(test::TestRequest::get().uri("/commandes/admin/all"), ids.client).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = as_client(test::TestRequest::get().uri("/admin/dead-letters"), ids.client).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = as_admin(test::TestRequest::get().uri("/admin/dead-letters")).to_request();
        let report: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["stats"]["total_messages"], 0);

        let req = as_client(test::TestRequest::get().uri(&format!("/commandes/{}", Uuid::now_v7())), ids.client)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_placement_validation_errors() {
        let (state, metrics, ids) = state().await;
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .app_data(web::Data::new(metrics))
                .configure(configure),
        )
        .await;

        let req = as_client(test::TestRequest::post().uri("/commandes"), ids.client)
            .set_json(place_body("drone"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = as_client(test::TestRequest::post().uri("/commandes"), ids.client)
            .set_json(place_body("vendor_direct"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "multi_vendor_direct_delivery");

        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_item_cancellation_over_http() {
        let (state, metrics, ids) = state().await;
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .app_data(web::Data::new(metrics))
                .configure(configure),
        )
        .await;

        let req = as_client(test::TestRequest::post().uri("/commandes"), ids.client)
            .set_json(place_body("supermarket_delivery"))
            .to_request();
        let order: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let order_id = order["id"].as_str().unwrap().to_string();
        let product_a = order["lots"][0]["items"][0]["product_id"].as_str().unwrap().to_string();
        let product_b = order["lots"][1]["items"][0]["product_id"].as_str().unwrap().to_string();
        let cancel_uri = |product: &str| format!("/commandes/cancel-item/{}/{}", order_id, product);

        // Admins cancel whole orders, never single items
        let req = as_admin(test::TestRequest::post().uri(&cancel_uri(&product_b)))
            .set_json(serde_json::json!({ "boutiqueId": ids.vendor_b, "reason": "audit" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "forbidden");

        // Missing body
        let req = as_client(test::TestRequest::post().uri(&cancel_uri(&product_b)), ids.client).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "bad_request");

        let req = as_client(test::TestRequest::post().uri(&cancel_uri(&product_b)), ids.client)
            .set_json(serde_json::json!({ "boutiqueId": ids.vendor_b, "reason": "changed my mind" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::ETAG).unwrap(), "\"2\"");
        let order: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(order["lots"][1]["status"], "cancelled");
        assert_eq!(order["status"], "awaiting_vendor_acceptance");
        let total: Decimal = order["total"].as_str().unwrap().parse().unwrap();
        assert_eq!(total, Decimal::from(4000));

        // Last active item gone: the whole order is cancelled
        let req = as_vendor(test::TestRequest::post().uri(&cancel_uri(&product_a)), ids.vendor_a)
            .set_json(serde_json::json!({ "boutiqueId": ids.vendor_a, "reason": "out of stock" }))
            .to_request();
        let order: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(order["status"], "cancelled");
        let total: Decimal = order["total"].as_str().unwrap().parse().unwrap();
        assert_eq!(total, Decimal::ZERO);
    }
}
