// Private module declaration
mod endpoint;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// Re-export for public API
pub use endpoint::metrics_handler;

use crate::domain::order::OrderError;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order placement and command outcomes (throughput, latency)
// - Cancellations by granularity and role
// - Notification delivery and the dead letter queue
// - Cart clearing compensations
// - Circuit breaker state of the notification producer
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_placed: IntCounter,
    pub order_commands: IntCounterVec,
    pub order_command_duration: HistogramVec,
    pub order_cancellations: IntCounterVec,
    pub concurrency_conflicts: IntCounter,
    pub cart_clear_failures: IntCounter,

    // Notification Metrics
    pub notifications_sent: IntCounterVec,
    pub notifications_failed: IntCounterVec,

    // DLQ Metrics
    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_kind: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_placed = IntCounter::new("orders_placed_total", "Total orders placed")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let order_commands = IntCounterVec::new(
            Opts::new("order_commands_total", "Order commands handled"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(order_commands.clone()))?;

        let order_command_duration = HistogramVec::new(
            HistogramOpts::new("order_command_duration_seconds", "Order command handling duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(order_command_duration.clone()))?;

        let order_cancellations = IntCounterVec::new(
            Opts::new("order_cancellations_total", "Cancellations by granularity and role"),
            &["granularity", "role"],
        )?;
        registry.register(Box::new(order_cancellations.clone()))?;

        let concurrency_conflicts = IntCounter::new(
            "concurrency_conflicts_total",
            "Writes rejected because the order changed concurrently",
        )?;
        registry.register(Box::new(concurrency_conflicts.clone()))?;

        let cart_clear_failures = IntCounter::new(
            "cart_clear_failures_total",
            "Cart clears that failed after an order was placed",
        )?;
        registry.register(Box::new(cart_clear_failures.clone()))?;

        // Notification Metrics
        let notifications_sent = IntCounterVec::new(
            Opts::new("notifications_sent_total", "Notifications delivered"),
            &["kind"],
        )?;
        registry.register(Box::new(notifications_sent.clone()))?;

        let notifications_failed = IntCounterVec::new(
            Opts::new("notifications_failed_total", "Notifications that failed after all retries"),
            &["kind"],
        )?;
        registry.register(Box::new(notifications_failed.clone()))?;

        // DLQ Metrics
        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Total messages in dead letter queue",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_kind = IntCounterVec::new(
            Opts::new("dlq_messages_by_kind", "DLQ messages by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(dlq_messages_by_kind.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            order_commands,
            order_command_duration,
            order_cancellations,
            concurrency_conflicts,
            cart_clear_failures,
            notifications_sent,
            notifications_failed,
            dlq_messages_total,
            dlq_messages_by_kind,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record the outcome of an order command
    pub fn record_command(&self, command: &str, duration_secs: f64, result: Result<(), &OrderError>) {
        let outcome = match result {
            Ok(()) => "ok",
            Err(err) => err.kind().as_str(),
        };
        if let Err(OrderError::ConcurrencyConflict { .. }) = result {
            self.concurrency_conflicts.inc();
        }
        self.order_commands.with_label_values(&[command, outcome]).inc();
        self.order_command_duration.with_label_values(&[command]).observe(duration_secs);
    }

    /// Helper to record a cancellation
    pub fn record_cancellation(&self, granularity: &str, role: &str) {
        self.order_cancellations.with_label_values(&[granularity, role]).inc();
    }

    /// Helper to record a notification delivery outcome
    pub fn record_notification(&self, kind: &str, success: bool) {
        if success {
            self.notifications_sent.with_label_values(&[kind]).inc();
        } else {
            self.notifications_failed.with_label_values(&[kind]).inc();
        }
    }

    /// Helper to record DLQ message
    pub fn record_dlq_message(&self, kind: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_kind.with_label_values(&[kind]).inc();
    }

    /// Helper to update circuit breaker state
    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }
}
