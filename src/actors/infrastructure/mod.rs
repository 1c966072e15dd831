// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Actors for the side effects around the order write path:
// - Notification dispatch
// - Dead letter queue
// - Health monitoring
//
// ============================================================================

// Private module declarations
mod dlq;
mod health_monitor;
mod notification_dispatcher;

// Re-export for public API
pub use dlq::{AddToDlq, DeadLetterKind, DeadLetterSink, DlqActor, GetDlqReport};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, UpdateHealth};
pub use notification_dispatcher::NotificationDispatcher;
