// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for asynchronous, concurrent operations.
//
// Structure:
// - core/           - Shared health types
// - infrastructure/ - Concrete infrastructure actors (notifications, DLQ, health)
//
// Note: Order logic runs in the OrderCommandHandler, NOT in actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

// Private module declarations
mod core;
mod infrastructure;

pub use self::core::HealthStatus;
pub use self::infrastructure::{
    AddToDlq,
    DeadLetterKind,
    DeadLetterSink,
    DlqActor,
    GetDlqReport,
    GetSystemHealth,
    HealthMonitorActor,
    NotificationDispatcher,
    UpdateHealth,
};
