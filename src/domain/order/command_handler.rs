use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::actors::{AddToDlq, DeadLetterKind, DeadLetterSink};
use crate::collaborators::CartService;
use crate::event_sourcing::{load_aggregate, Aggregate, DomainEvent, EventEnvelope, EventStore};
use crate::metrics::Metrics;
use crate::notifications::{CommittedEvents, NullSink, OrderEventSink};
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::order_number::reserve_order_number;
use super::read_model::OrderReadModel;
use super::snapshot::{OrderSnapshotBuilder, PlaceOrderRequest};
use super::value_objects::{Caller, Role};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Event Store → side effects
//
// Side effects (projection, cart clearing, notifications) run only after the
// append committed and never undo it.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub order_number_prefix: String,
    /// Timezone used for the timestamp part of order numbers
    pub business_offset: FixedOffset,
    pub max_order_number_attempts: u32,
}

pub struct OrderCommandHandler {
    event_store: Arc<dyn EventStore<OrderEvent>>,
    read_model: Arc<dyn OrderReadModel>,
    snapshots: OrderSnapshotBuilder,
    carts: Arc<dyn CartService>,
    sink: Arc<dyn OrderEventSink>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    metrics: Arc<Metrics>,
    settings: OrderSettings,
    cart_retry: RetryConfig,
    compensation_retry: RetryConfig,
}

impl OrderCommandHandler {
    pub fn new(
        event_store: Arc<dyn EventStore<OrderEvent>>,
        read_model: Arc<dyn OrderReadModel>,
        snapshots: OrderSnapshotBuilder,
        carts: Arc<dyn CartService>,
        metrics: Arc<Metrics>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            event_store,
            read_model,
            snapshots,
            carts,
            sink: Arc::new(NullSink),
            dead_letters: None,
            metrics,
            settings,
            cart_retry: RetryConfig::conservative(),
            compensation_retry: RetryConfig::aggressive(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn OrderEventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Inline and background retry policies for clearing the cart
    pub fn with_cart_retry(mut self, inline: RetryConfig, compensation: RetryConfig) -> Self {
        self.cart_retry = inline;
        self.compensation_retry = compensation;
        self
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Turn the caller's cart into a new order
    pub async fn place_order(
        &self,
        caller: &Caller,
        request: PlaceOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<OrderAggregate, OrderError> {
        let started = Instant::now();
        let result = self.try_place_order(caller, request, now).await;
        self.metrics
            .record_command("place_order", started.elapsed().as_secs_f64(), result.as_ref().map(|_| ()));

        if let Err(e) = &result {
            tracing::warn!(client_id = %caller.user_id, error = %e, "Order placement rejected");
        }
        result
    }

    async fn try_place_order(
        &self,
        caller: &Caller,
        request: PlaceOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<OrderAggregate, OrderError> {
        if caller.role != Role::Client {
            return Err(OrderError::Forbidden("only clients place orders"));
        }

        let draft = self.snapshots.build(caller.user_id, &request, now).await?;
        let order_id = draft.order_id;

        let order_number = reserve_order_number(
            self.read_model.as_ref(),
            &self.settings.order_number_prefix,
            now.with_timezone(&self.settings.business_offset),
            order_id,
            self.settings.max_order_number_attempts,
        )
        .await?;

        let events = OrderAggregate::place(draft.into_placed(order_number))?;
        let envelopes = self.envelopes(order_id, 0, events, caller);
        let version = self.event_store.append_events(order_id, 0, envelopes.clone()).await?;
        let order = OrderAggregate::load_from_events(&envelopes)?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            client_id = %order.client_id,
            lots = order.lots.len(),
            total = %order.total,
            version,
            "🛒 Order placed"
        );

        self.project(&order).await;
        self.clear_cart(order.id, order.client_id).await;
        self.metrics.orders_placed.inc();

        self.sink
            .publish(CommittedEvents {
                order: order.clone(),
                events: envelopes,
                actor: *caller,
            })
            .await;

        Ok(order)
    }

    /// Run a state-machine command against an existing order.
    /// `expected_version` is the version the caller read, when it sent one.
    pub async fn handle(
        &self,
        order_id: Uuid,
        command: OrderCommand,
        expected_version: Option<i64>,
    ) -> Result<OrderAggregate, OrderError> {
        let started = Instant::now();
        let name = command.name();
        let result = self.try_handle(order_id, &command, expected_version).await;
        self.metrics
            .record_command(name, started.elapsed().as_secs_f64(), result.as_ref().map(|_| ()));

        match &result {
            Err(e @ OrderError::ConcurrencyConflict { .. }) => {
                tracing::warn!(order_id = %order_id, command = name, error = %e, "Concurrent modification");
            }
            Err(e) => {
                tracing::debug!(order_id = %order_id, command = name, error = %e, "Command rejected");
            }
            Ok(_) => {}
        }
        result
    }

    async fn try_handle(
        &self,
        order_id: Uuid,
        command: &OrderCommand,
        expected_version: Option<i64>,
    ) -> Result<OrderAggregate, OrderError> {
        let mut order = self.load(order_id).await?;

        if let Some(expected) = expected_version {
            if expected != order.version {
                return Err(OrderError::ConcurrencyConflict { expected, actual: order.version });
            }
        }

        let events = order.handle_command(command)?;
        if events.is_empty() {
            return Ok(order);
        }

        let caller = command.caller();
        let envelopes = self.envelopes(order_id, order.version, events, caller);
        let version = self
            .event_store
            .append_events(order_id, order.version, envelopes.clone())
            .await?;

        for envelope in &envelopes {
            order.apply_envelope(envelope)?;
            self.record_cancellation(&envelope.event_data, caller);
        }

        tracing::info!(
            order_id = %order_id,
            command = command.name(),
            role = caller.role.as_str(),
            status = %order.status,
            version,
            "✅ Order command committed"
        );

        self.project(&order).await;
        self.sink
            .publish(CommittedEvents {
                order: order.clone(),
                events: envelopes,
                actor: *caller,
            })
            .await;

        Ok(order)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Order detail, always rebuilt from the event stream
    pub async fn get(&self, order_id: Uuid, caller: &Caller) -> Result<OrderAggregate, OrderError> {
        let order = self.load(order_id).await?;
        if !order.visible_to(caller) {
            return Err(OrderError::Forbidden("order belongs to another party"));
        }
        Ok(order)
    }

    pub async fn list_for_client(&self, caller: &Caller) -> Result<Vec<OrderAggregate>, OrderError> {
        if caller.role != Role::Client {
            return Err(OrderError::Forbidden("client listing"));
        }
        Ok(self.read_model.list_for_client(caller.user_id).await?)
    }

    pub async fn list_for_vendor(&self, caller: &Caller) -> Result<Vec<OrderAggregate>, OrderError> {
        match (caller.role, caller.vendor_id) {
            (Role::Vendor, Some(vendor_id)) => Ok(self.read_model.list_for_vendor(vendor_id).await?),
            _ => Err(OrderError::Forbidden("vendor listing")),
        }
    }

    pub async fn list_all(&self, caller: &Caller) -> Result<Vec<OrderAggregate>, OrderError> {
        if caller.role != Role::Admin {
            return Err(OrderError::Forbidden("admin listing"));
        }
        Ok(self.read_model.list_all().await?)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn load(&self, order_id: Uuid) -> Result<OrderAggregate, OrderError> {
        load_aggregate::<OrderAggregate, _>(self.event_store.as_ref(), order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    fn envelopes(
        &self,
        order_id: Uuid,
        current_version: i64,
        events: Vec<OrderEvent>,
        caller: &Caller,
    ) -> Vec<EventEnvelope<OrderEvent>> {
        let correlation_id = Uuid::now_v7();
        let mut previous: Option<Uuid> = None;
        events
            .into_iter()
            .zip(current_version + 1..)
            .map(|(event, sequence)| {
                let event_type = event.event_name().to_string();
                let envelope = EventEnvelope::new(order_id, sequence, event_type, event, correlation_id)
                    .with_user(caller.user_id)
                    .with_causation(previous)
                    .with_metadata("role", caller.role.as_str());
                previous = Some(envelope.event_id);
                envelope
            })
            .collect()
    }

    /// Read model failures are logged; the event stream stays authoritative
    async fn project(&self, order: &OrderAggregate) {
        if let Err(e) = self.read_model.upsert(order).await {
            tracing::error!(order_id = %order.id, error = %e, "Failed to update order read model");
        }
    }

    fn record_cancellation(&self, event: &OrderEvent, caller: &Caller) {
        let granularity = match event {
            OrderEvent::OrderCancelled(_) => "order",
            OrderEvent::LotCancelled(_) => "lot",
            OrderEvent::ItemCancelled(_) => "item",
            _ => return,
        };
        self.metrics.record_cancellation(granularity, caller.role.as_str());
    }

    /// Clear the client's cart after a committed placement.
    /// Retried inline; on failure a background compensation keeps retrying
    /// and dead-letters the request when it gives up.
    async fn clear_cart(&self, order_id: Uuid, client_id: Uuid) {
        let carts = self.carts.clone();
        let inline = retry_with_backoff("clear_cart", &self.cart_retry, || {
            let carts = carts.clone();
            async move { carts.clear_cart(client_id).await }
        })
        .await;

        let inline_attempts = match inline {
            RetryResult::Success(()) => return,
            RetryResult::Failed { attempts, .. } => attempts,
        };

        tracing::warn!(
            order_id = %order_id,
            client_id = %client_id,
            "Cart clear failed, scheduling compensation"
        );

        let failed_at = Utc::now();
        let compensation = self.compensation_retry.clone();
        let dead_letters = self.dead_letters.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let result = retry_with_backoff("clear_cart_compensation", &compensation, || {
                let carts = carts.clone();
                async move { carts.clear_cart(client_id).await }
            })
            .await;

            match result {
                RetryResult::Success(()) => {
                    tracing::info!(order_id = %order_id, client_id = %client_id, "Cart cleared by compensation");
                }
                RetryResult::Failed { error: e, attempts } => {
                    metrics.cart_clear_failures.inc();
                    tracing::error!(
                        order_id = %order_id,
                        client_id = %client_id,
                        error = %e,
                        "Cart could not be cleared"
                    );

                    if let Some(sink) = dead_letters {
                        sink.dead_letter(AddToDlq {
                            kind: DeadLetterKind::CartClear,
                            order_id,
                            payload: serde_json::json!({ "client_id": client_id }).to_string(),
                            error_message: e.to_string(),
                            failure_count: inline_attempts + attempts,
                            first_failed_at: failed_at,
                        })
                        .await;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryDirectory;
    use crate::domain::order::read_model::InMemoryOrderReadModel;
    use crate::domain::order::snapshot::tests::{builder, request, seeded};
    use crate::domain::order::{DeliveryMode, LotStatus, OrderStatus};
    use crate::event_sourcing::InMemoryEventStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        committed: Mutex<Vec<CommittedEvents>>,
    }

    #[async_trait]
    impl OrderEventSink for RecordingSink {
        async fn publish(&self, committed: CommittedEvents) {
            self.committed.lock().await.push(committed);
        }
    }

    #[derive(Default)]
    struct RecordingDeadLetters {
        letters: Mutex<Vec<AddToDlq>>,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingDeadLetters {
        async fn dead_letter(&self, letter: AddToDlq) {
            self.letters.lock().await.push(letter);
        }
    }

    struct Harness {
        handler: OrderCommandHandler,
        directory: InMemoryDirectory,
        store: Arc<InMemoryEventStore<OrderEvent>>,
        read_model: Arc<InMemoryOrderReadModel>,
        sink: Arc<RecordingSink>,
        dead_letters: Arc<RecordingDeadLetters>,
        metrics: Arc<Metrics>,
        client: Caller,
        vendor_a: Uuid,
        vendor_b: Uuid,
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    async fn harness() -> Harness {
        let (directory, client_id, vendor_a, vendor_b) = seeded().await;
        let store = Arc::new(InMemoryEventStore::new());
        let read_model = Arc::new(InMemoryOrderReadModel::new());
        let sink = Arc::new(RecordingSink::default());
        let dead_letters = Arc::new(RecordingDeadLetters::default());
        let metrics = Arc::new(Metrics::new().unwrap());

        let handler = OrderCommandHandler::new(
            store.clone(),
            read_model.clone(),
            builder(&directory),
            Arc::new(directory.clone()),
            metrics.clone(),
            OrderSettings {
                order_number_prefix: "CMD".to_string(),
                business_offset: FixedOffset::east_opt(3 * 3600).unwrap(),
                max_order_number_attempts: 5,
            },
        )
        .with_event_sink(sink.clone())
        .with_dead_letters(dead_letters.clone())
        .with_cart_retry(fast(2), fast(2));

        Harness {
            handler,
            directory,
            store,
            read_model,
            sink,
            dead_letters,
            metrics,
            client: Caller::client(client_id),
            vendor_a,
            vendor_b,
        }
    }

    fn tomorrow() -> DateTime<Utc> {
        Utc::now() + Duration::days(1)
    }

    async fn place(h: &Harness, mode: DeliveryMode) -> OrderAggregate {
        h.handler
            .place_order(&h.client, request(mode, tomorrow()), Utc::now())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_place_order_persists_projects_and_clears_cart() {
        let h = harness().await;
        let order = place(&h, DeliveryMode::SupermarketDelivery).await;

        assert_eq!(order.version, 1);
        assert_eq!(order.base_total, Decimal::from(2500));
        assert_eq!(order.delivery_fee.amount, Decimal::from(2000));
        assert_eq!(order.total, Decimal::from(4500));
        assert!(order.order_number.starts_with("CMD-"));
        assert!(order.order_number.ends_with("-0001"));

        assert_eq!(h.store.current_version(order.id).await.unwrap(), 1);
        assert_eq!(h.read_model.list_for_client(h.client.user_id).await.unwrap().len(), 1);
        assert!(!h.directory.has_cart(h.client.user_id).await);
        assert_eq!(h.sink.committed.lock().await.len(), 1);
        assert_eq!(h.metrics.orders_placed.get(), 1);
    }

    #[tokio::test]
    async fn test_second_placement_finds_empty_cart() {
        let h = harness().await;
        place(&h, DeliveryMode::SupermarketDelivery).await;

        let err = h
            .handler
            .place_order(&h.client, request(DeliveryMode::SupermarketDelivery, tomorrow()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::EmptyCart));
        assert_eq!(h.read_model.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_placement_persists_nothing() {
        let h = harness().await;
        let err = h
            .handler
            .place_order(&h.client, request(DeliveryMode::VendorDirect, tomorrow()), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::MultiVendorDirectDelivery { vendor_count: 2 }));
        assert_eq!(h.read_model.count().await.unwrap(), 0);
        assert!(h.directory.has_cart(h.client.user_id).await);
        assert!(h.sink.committed.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_only_clients_place_orders() {
        let h = harness().await;
        let err = h
            .handler
            .place_order(&Caller::admin(Uuid::new_v4()), request(DeliveryMode::Collect, tomorrow()), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_failed_cart_clear_keeps_order_and_dead_letters() {
        let h = harness().await;
        h.directory.fail_next_cart_clears(4);

        let order = place(&h, DeliveryMode::Collect).await;
        assert_eq!(h.store.current_version(order.id).await.unwrap(), 1);

        let mut waited = 0;
        while h.dead_letters.letters.lock().await.is_empty() && waited < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }

        let letters = h.dead_letters.letters.lock().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].kind, DeadLetterKind::CartClear);
        assert_eq!(letters[0].order_id, order.id);
        assert_eq!(letters[0].failure_count, 4);
        assert_eq!(h.metrics.cart_clear_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_compensation_clears_cart_eventually() {
        let h = harness().await;
        h.directory.fail_next_cart_clears(2);

        place(&h, DeliveryMode::Collect).await;

        let mut waited = 0;
        while h.directory.has_cart(h.client.user_id).await && waited < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            waited += 1;
        }
        assert!(!h.directory.has_cart(h.client.user_id).await);
        assert!(h.dead_letters.letters.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_commands_flow_through_the_store() {
        let h = harness().await;
        let order = place(&h, DeliveryMode::Collect).await;
        let staff_a = Caller::vendor(Uuid::new_v4(), h.vendor_a);
        let staff_b = Caller::vendor(Uuid::new_v4(), h.vendor_b);

        let order = h
            .handler
            .handle(order.id, OrderCommand::AcceptLot { caller: staff_a, at: Utc::now() }, Some(1))
            .await
            .unwrap();
        assert_eq!(order.version, 2);
        assert_eq!(order.status, OrderStatus::AwaitingVendorAcceptance);

        let order = h
            .handler
            .handle(order.id, OrderCommand::AcceptLot { caller: staff_b, at: Utc::now() }, None)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);

        let replayed = h.handler.get(order.id, &h.client).await.unwrap();
        assert_eq!(replayed.version, 3);
        assert!(replayed.lots.iter().all(|lot| lot.status == LotStatus::Preparing));
        assert_eq!(h.sink.committed.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let h = harness().await;
        let order = place(&h, DeliveryMode::Collect).await;
        let staff_a = Caller::vendor(Uuid::new_v4(), h.vendor_a);

        h.handler
            .handle(order.id, OrderCommand::AcceptLot { caller: staff_a, at: Utc::now() }, Some(1))
            .await
            .unwrap();

        let err = h
            .handler
            .handle(
                order.id,
                OrderCommand::Cancel { caller: h.client, reason: "changed my mind".to_string(), at: Utc::now() },
                Some(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ConcurrencyConflict { expected: 1, actual: 2 }));
        assert_eq!(h.metrics.concurrency_conflicts.get(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_item_cancel_appends_nothing() {
        let h = harness().await;
        let order = place(&h, DeliveryMode::SupermarketDelivery).await;
        let product_b = order.lots[1].items[0].product_id;
        let cancel = || OrderCommand::CancelItem {
            caller: h.client,
            vendor_id: h.vendor_b,
            product_id: product_b,
            variation_id: None,
            reason: "out of budget".to_string(),
            at: Utc::now(),
        };

        let first = h.handler.handle(order.id, cancel(), None).await.unwrap();
        assert_eq!(first.base_total, Decimal::from(2000));
        assert_eq!(first.total, Decimal::from(4000));

        let second = h.handler.handle(order.id, cancel(), None).await.unwrap();
        assert_eq!(second.version, first.version);
        assert_eq!(h.store.current_version(order.id).await.unwrap(), first.version);
    }

    #[tokio::test]
    async fn test_unknown_order_and_foreign_callers() {
        let h = harness().await;
        let order = place(&h, DeliveryMode::Collect).await;

        let err = h.handler.get(Uuid::now_v7(), &h.client).await.unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(_)));

        let stranger = Caller::client(Uuid::new_v4());
        let err = h.handler.get(order.id, &stranger).await.unwrap_err();
        assert!(matches!(err, OrderError::Forbidden(_)));

        let outsider = Caller::vendor(Uuid::new_v4(), Uuid::new_v4());
        assert!(h.handler.list_for_vendor(&outsider).await.unwrap().is_empty());
        assert!(h.handler.list_all(&h.client).await.is_err());
    }
}
