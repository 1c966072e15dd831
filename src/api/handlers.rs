use actix_web::http::header::{self, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::actors::{DlqActor, GetDlqReport, GetSystemHealth, HealthMonitorActor};
use crate::domain::order::{
    Caller, DeliveryMode, OrderAggregate, OrderCommand, OrderCommandHandler, OrderError, PlaceOrderRequest,
    Role,
};
use super::error::ApiError;

// ============================================================================
// Order Endpoints
// ============================================================================

/// Shared state of every worker
pub struct AppState {
    pub orders: Arc<OrderCommandHandler>,
    pub dlq: Option<ActorRef<DlqActor>>,
    pub health: Option<ActorRef<HealthMonitorActor>>,
}

const RECENT_DEAD_LETTERS: usize = 50;

// ----------------------------------------------------------------------------
// Request bodies
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PlaceOrderBody {
    #[serde(rename = "typedelivery")]
    pub delivery_mode: String,
    #[serde(rename = "adresseLivraison", default)]
    pub delivery_address: Option<String>,
    #[serde(rename = "paiementMethode")]
    pub payment_method: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(rename = "dateDeliveryOrAbleCollect")]
    pub requested_at: DateTime<Utc>,
}

impl PlaceOrderBody {
    fn into_request(self) -> Result<PlaceOrderRequest, ApiError> {
        let delivery_mode: DeliveryMode = self.delivery_mode.parse().map_err(ApiError::BadRequest)?;
        Ok(PlaceOrderRequest {
            delivery_mode,
            delivery_address: self.delivery_address,
            payment_method: self.payment_method,
            note: self.note,
            requested_at: self.requested_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmDepotBody {
    #[serde(rename = "boutiqueId")]
    pub vendor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelItemBody {
    #[serde(rename = "boutiqueId")]
    pub vendor_id: Uuid,
    #[serde(default)]
    pub reason: String,
    #[serde(rename = "variationId", default)]
    pub variation_id: Option<Uuid>,
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Version sent in `If-Match`, quoted or bare
fn expected_version(req: &HttpRequest) -> Result<Option<i64>, ApiError> {
    let Some(value) = req.headers().get(header::IF_MATCH) else {
        return Ok(None);
    };

    let raw = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("If-Match is not valid text".to_string()))?
        .trim()
        .trim_start_matches("W/")
        .trim_matches('"');

    if raw == "*" {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("If-Match must carry an order version, got {:?}", raw)))
}

fn order_response(status: StatusCode, order: &OrderAggregate) -> HttpResponse {
    let mut response = HttpResponse::build(status);
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", order.version)) {
        response.insert_header((header::ETAG, etag));
    }
    response.json(order)
}

async fn run(
    state: &AppState,
    req: &HttpRequest,
    order_id: Uuid,
    command: OrderCommand,
) -> Result<HttpResponse, ApiError> {
    let expected = expected_version(req)?;
    let order = state.orders.handle(order_id, command, expected).await?;
    Ok(order_response(StatusCode::OK, &order))
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

/// `POST /commandes`
pub async fn place_order(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<PlaceOrderBody>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner().into_request()?;
    let order = state.orders.place_order(&caller, request, Utc::now()).await?;
    Ok(order_response(StatusCode::CREATED, &order))
}

/// `GET /commandes/my`
pub async fn list_my_orders(state: web::Data<AppState>, caller: Caller) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.orders.list_for_client(&caller).await?))
}

/// `GET /commandes/boutique/all`
pub async fn list_vendor_orders(state: web::Data<AppState>, caller: Caller) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.orders.list_for_vendor(&caller).await?))
}

/// `GET /commandes/admin/all`
pub async fn list_all_orders(state: web::Data<AppState>, caller: Caller) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.orders.list_all(&caller).await?))
}

/// `GET /commandes/{id}`
pub async fn get_order(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let order = state.orders.get(path.into_inner(), &caller).await?;
    Ok(order_response(StatusCode::OK, &order))
}

/// `POST /commandes/boutique/accept/{id}`
pub async fn accept_lot(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    run(&state, &req, path.into_inner(), OrderCommand::AcceptLot { caller, at: Utc::now() }).await
}

/// `POST /commandes/boutique/start-delivery/{id}`
pub async fn start_delivery(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    run(&state, &req, path.into_inner(), OrderCommand::StartDirectDelivery { caller, at: Utc::now() }).await
}

/// `POST /commandes/boutique/mark-depot/{id}`
pub async fn mark_depot(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    run(&state, &req, path.into_inner(), OrderCommand::MarkDepotDropOff { caller, at: Utc::now() }).await
}

/// `POST /commandes/admin/confirm-depot/{id}`
pub async fn confirm_depot(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<ConfirmDepotBody>,
) -> Result<HttpResponse, ApiError> {
    let command = OrderCommand::ConfirmDepotReceipt {
        caller,
        vendor_id: body.vendor_id,
        at: Utc::now(),
    };
    run(&state, &req, path.into_inner(), command).await
}

/// `POST /commandes/cancel/{id}`
pub async fn cancel(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: Caller,
    path: web::Path<Uuid>,
    body: web::Json<CancelBody>,
) -> Result<HttpResponse, ApiError> {
    let command = OrderCommand::Cancel {
        caller,
        reason: body.into_inner().reason,
        at: Utc::now(),
    };
    run(&state, &req, path.into_inner(), command).await
}

/// `POST /commandes/cancel-item/{id}/{produitId}`
pub async fn cancel_item(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: Caller,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<CancelItemBody>,
) -> Result<HttpResponse, ApiError> {
    let (order_id, product_id) = path.into_inner();
    let body = body.into_inner();
    let command = OrderCommand::CancelItem {
        caller,
        vendor_id: body.vendor_id,
        product_id,
        variation_id: body.variation_id,
        reason: body.reason,
        at: Utc::now(),
    };
    run(&state, &req, order_id, command).await
}

/// `POST /commandes/confirm-receipt/{id}`
pub async fn confirm_receipt(
    state: web::Data<AppState>,
    req: HttpRequest,
    caller: Caller,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    run(&state, &req, path.into_inner(), OrderCommand::ConfirmReceipt { caller, at: Utc::now() }).await
}

/// `GET /admin/dead-letters`
pub async fn dead_letters(state: web::Data<AppState>, caller: Caller) -> Result<HttpResponse, ApiError> {
    if caller.role != Role::Admin {
        return Err(OrderError::Forbidden("admin only").into());
    }

    let dlq = state
        .dlq
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Dead letter queue not running".to_string()))?;
    let report = dlq
        .ask(GetDlqReport { limit: RECENT_DEAD_LETTERS })
        .await
        .map_err(|_| ApiError::Unavailable("Dead letter queue not responding".to_string()))?;

    Ok(HttpResponse::Ok().json(report))
}

/// `GET /health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let Some(monitor) = &state.health else {
        return HttpResponse::Ok().json(serde_json::json!({ "overall_status": { "status": "healthy" } }));
    };

    match monitor.ask(GetSystemHealth).await {
        Ok(health) if health.overall_status.is_unhealthy() => HttpResponse::ServiceUnavailable().json(health),
        Ok(health) => HttpResponse::Ok().json(health),
        Err(_) => HttpResponse::ServiceUnavailable()
            .json(serde_json::json!({ "overall_status": { "status": "unhealthy", "reason": "health monitor not responding" } })),
    }
}
