use uuid::Uuid;

use crate::event_sourcing::StoreError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

/// Coarse classification used by the HTTP layer and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    InvalidTransition,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    // Validation
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Same-day requests are only possible with vendor_direct delivery")]
    InvalidDeliveryMode,

    #[error("Direct delivery requires a single vendor, cart spans {vendor_count}")]
    MultiVendorDirectDelivery { vendor_count: usize },

    #[error("Vendor {0} does not offer direct delivery")]
    DeliveryNotOffered(Uuid),

    #[error("Vendor {0} does not deliver on the same day")]
    SameDayNotAllowed(Uuid),

    #[error("A delivery address is required for this delivery mode")]
    MissingDeliveryAddress,

    #[error("A cancellation reason is required")]
    MissingReason,

    #[error("Invalid quantity for product {0}")]
    InvalidQuantity(Uuid),

    #[error("Product {0} has no positive unit price")]
    InvalidPrice(Uuid),

    // Not found
    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Order has no lot for vendor {0}")]
    LotNotFound(Uuid),

    #[error("Lot has no item for product {0}")]
    ItemNotFound(Uuid),

    #[error("Vendor {0} not found")]
    VendorNotFound(Uuid),

    #[error("Client {0} not found")]
    ClientNotFound(Uuid),

    // Authorization
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    // State machine
    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error("Order is already cancelled")]
    AlreadyCancelled,

    #[error("Goods were already received at the depot")]
    AlreadyInTransit,

    // Concurrency
    #[error("Order was modified concurrently: expected version {expected}, current is {actual}")]
    ConcurrencyConflict { expected: i64, actual: i64 },

    #[error("Could not reserve a unique order number, last tried {0}")]
    DuplicateOrderNumber(String),

    #[error("Aggregate not initialized")]
    NotInitialized,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyCart
            | OrderError::InvalidDeliveryMode
            | OrderError::MultiVendorDirectDelivery { .. }
            | OrderError::DeliveryNotOffered(_)
            | OrderError::SameDayNotAllowed(_)
            | OrderError::MissingDeliveryAddress
            | OrderError::MissingReason
            | OrderError::InvalidQuantity(_)
            | OrderError::InvalidPrice(_) => ErrorKind::Validation,

            OrderError::OrderNotFound(_)
            | OrderError::LotNotFound(_)
            | OrderError::ItemNotFound(_)
            | OrderError::VendorNotFound(_)
            | OrderError::ClientNotFound(_) => ErrorKind::NotFound,

            OrderError::Forbidden(_) => ErrorKind::Forbidden,

            OrderError::InvalidTransition { .. }
            | OrderError::AlreadyCancelled
            | OrderError::AlreadyInTransit => ErrorKind::InvalidTransition,

            OrderError::ConcurrencyConflict { .. } | OrderError::DuplicateOrderNumber(_) => {
                ErrorKind::Conflict
            }

            OrderError::NotInitialized | OrderError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for the error body
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyCart => "empty_cart",
            OrderError::InvalidDeliveryMode => "invalid_delivery_mode",
            OrderError::MultiVendorDirectDelivery { .. } => "multi_vendor_direct_delivery",
            OrderError::DeliveryNotOffered(_) => "delivery_not_offered",
            OrderError::SameDayNotAllowed(_) => "same_day_not_allowed",
            OrderError::MissingDeliveryAddress => "missing_delivery_address",
            OrderError::MissingReason => "missing_reason",
            OrderError::InvalidQuantity(_) => "invalid_quantity",
            OrderError::InvalidPrice(_) => "invalid_price",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::LotNotFound(_) => "lot_not_found",
            OrderError::ItemNotFound(_) => "item_not_found",
            OrderError::VendorNotFound(_) => "vendor_not_found",
            OrderError::ClientNotFound(_) => "client_not_found",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::AlreadyCancelled => "already_cancelled",
            OrderError::AlreadyInTransit => "already_in_transit",
            OrderError::ConcurrencyConflict { .. } => "concurrency_conflict",
            OrderError::DuplicateOrderNumber(_) => "duplicate_order_number",
            OrderError::NotInitialized | OrderError::Storage(_) => "internal",
        }
    }

    pub(crate) fn invalid(action: &'static str, state: impl ToString) -> Self {
        OrderError::InvalidTransition { action, state: state.to_string() }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { expected, actual, .. } => {
                OrderError::ConcurrencyConflict { expected, actual }
            }
            StoreError::EmptyAppend => OrderError::Storage(anyhow::anyhow!("Cannot append empty event list")),
            StoreError::Backend(e) => OrderError::Storage(e),
        }
    }
}
