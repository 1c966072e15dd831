use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use crate::domain::order::{Caller, Role};
use super::error::ApiError;

// ============================================================================
// Caller Extraction
// ============================================================================
//
// Authentication happens upstream; the gateway forwards the identity in
// `X-User-Id`, `X-User-Role` and, for vendor staff, `X-Vendor-Id`.
//
// ============================================================================

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";
pub const VENDOR_ID_HEADER: &str = "X-Vendor-Id";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn uuid_header(req: &HttpRequest, name: &str) -> Result<Option<Uuid>, ApiError> {
    header(req, name)
        .map(|value| {
            Uuid::parse_str(value).map_err(|_| ApiError::Unauthorized(format!("{} is not a UUID", name)))
        })
        .transpose()
}

pub fn caller_from_request(req: &HttpRequest) -> Result<Caller, ApiError> {
    let user_id = uuid_header(req, USER_ID_HEADER)?
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {}", USER_ID_HEADER)))?;

    let role: Role = header(req, USER_ROLE_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {}", USER_ROLE_HEADER)))?
        .parse()
        .map_err(ApiError::Unauthorized)?;

    match role {
        Role::Vendor => {
            let vendor_id = uuid_header(req, VENDOR_ID_HEADER)?
                .ok_or_else(|| ApiError::Unauthorized(format!("vendor staff requires {}", VENDOR_ID_HEADER)))?;
            Ok(Caller::vendor(user_id, vendor_id))
        }
        Role::Client => Ok(Caller::client(user_id)),
        Role::Admin => Ok(Caller::admin(user_id)),
        Role::Validator => Ok(Caller::validator(user_id)),
    }
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = caller_from_request(req);
        if let Err(e) = &result {
            tracing::warn!(path = %req.path(), error = %e, "Rejected request without a valid identity");
        }
        ready(result)
    }
}
