use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::Batch;
use scylla::value::{CqlValue, Row};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, DomainEvent, EventEnvelope, deserialize_event, serialize_event};

// ============================================================================
// Event Store - Repository for Events
// ============================================================================
//
// Responsibilities:
// 1. Append events (append-only)
// 2. Load event history for aggregates
// 3. Enforce optimistic concurrency on the sequence number
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, but current is {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Cannot append empty event list")]
    EmptyAppend,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Append-only event storage, generic over the event type
#[async_trait]
pub trait EventStore<E: DomainEvent + 'static>: Send + Sync {
    /// Append events written against `expected_version`.
    /// Returns the new version number after appending.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<i64, StoreError>;

    /// Load all events for an aggregate, oldest first
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>, StoreError>;

    /// Current version of an aggregate (0 when it does not exist)
    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, StoreError>;
}

/// Rebuild an aggregate from its stream. `None` when the stream is empty.
pub async fn load_aggregate<A, S>(store: &S, aggregate_id: Uuid) -> Result<Option<A>, StoreError>
where
    A: Aggregate,
    A::Event: DomainEvent + 'static,
    A::Error: std::fmt::Display,
    S: EventStore<A::Event> + ?Sized,
{
    let events = store.load_events(aggregate_id).await?;
    if events.is_empty() {
        return Ok(None);
    }
    Ok(Some(A::load_from_events(&events)?))
}

// ============================================================================
// ScyllaDB Event Store
// ============================================================================
//
// Events live in `event_store`, partitioned by aggregate id and clustered by
// sequence number. An append is one conditional batch on a single partition:
// every row is `INSERT ... IF NOT EXISTS`, so a writer holding a stale version
// collides with the rows the winner already wrote and nothing is applied.
//
// ============================================================================

const INSERT_EVENT: &str = "INSERT INTO event_store (
        aggregate_id, sequence_number, event_id, aggregate_type, event_type, event_version,
        event_data, causation_id, correlation_id, user_id, metadata, timestamp
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS";

type EventRow = (
    Uuid,
    i64,
    Uuid,
    String,
    String,
    i32,
    String,
    Option<Uuid>,
    Uuid,
    Option<Uuid>,
    String,
    DateTime<Utc>,
);

pub struct ScyllaEventStore<E: DomainEvent> {
    session: Arc<Session>,
    aggregate_type_name: String,
    _phantom: PhantomData<E>,
}

impl<E: DomainEvent> ScyllaEventStore<E> {
    pub fn new(session: Arc<Session>, aggregate_type_name: &str) -> Self {
        Self {
            session,
            aggregate_type_name: aggregate_type_name.to_string(),
            _phantom: PhantomData,
        }
    }

    async fn write_batch(&self, events: &[EventEnvelope<E>]) -> anyhow::Result<bool> {
        let mut batch = Batch::default();
        let mut values: Vec<EventRow> = Vec::with_capacity(events.len());

        for envelope in events {
            batch.append_statement(INSERT_EVENT);
            values.push((
                envelope.aggregate_id,
                envelope.sequence_number,
                envelope.event_id,
                self.aggregate_type_name.clone(),
                envelope.event_type.clone(),
                envelope.event_version,
                serialize_event(&envelope.event_data)?,
                envelope.causation_id,
                envelope.correlation_id,
                envelope.user_id,
                serde_json::to_string(&envelope.metadata)?,
                envelope.timestamp,
            ));
        }

        let result = self.session.batch(&batch, values).await?;
        lwt_applied(result)
    }

    async fn read_version(&self, aggregate_id: Uuid) -> anyhow::Result<i64> {
        let result = self.session
            .query_unpaged(
                "SELECT sequence_number FROM event_store
                 WHERE aggregate_id = ?
                 ORDER BY sequence_number DESC LIMIT 1",
                (aggregate_id,),
            )
            .await?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(0), // No rows = new aggregate
        };

        match rows_result.maybe_first_row::<(i64,)>()? {
            Some((version,)) => Ok(version),
            None => Ok(0),
        }
    }

    async fn read_events(&self, aggregate_id: Uuid) -> anyhow::Result<Vec<EventEnvelope<E>>> {
        let result = self.session
            .query_unpaged(
                "SELECT aggregate_id, sequence_number, event_id, aggregate_type, event_type, event_version,
                        event_data, causation_id, correlation_id, user_id, metadata, timestamp
                 FROM event_store
                 WHERE aggregate_id = ?
                 ORDER BY sequence_number ASC",
                (aggregate_id,),
            )
            .await?;

        let mut events = Vec::new();

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(events),
        };

        for row in rows_result.rows::<EventRow>()? {
            let (
                agg_id,
                sequence_number,
                event_id,
                _aggregate_type,
                event_type,
                event_version,
                event_data_json,
                causation_id,
                correlation_id,
                user_id,
                metadata_json,
                timestamp,
            ) = row?;

            tracing::trace!(aggregate_id = %agg_id, sequence_number, event_type = %event_type, "Loaded event");

            let metadata: HashMap<String, String> = serde_json::from_str(&metadata_json).unwrap_or_default();

            events.push(EventEnvelope {
                event_id,
                aggregate_id: agg_id,
                sequence_number,
                event_type,
                event_version,
                event_data: deserialize_event(&event_data_json)?,
                causation_id,
                correlation_id,
                user_id,
                timestamp,
                metadata,
            });
        }

        tracing::debug!(aggregate_id = %aggregate_id, count = events.len(), "Loaded event stream");
        Ok(events)
    }
}

#[async_trait]
impl<E: DomainEvent + 'static> EventStore<E> for ScyllaEventStore<E> {
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<i64, StoreError> {
        if events.is_empty() {
            return Err(StoreError::EmptyAppend);
        }

        let new_version = expected_version + events.len() as i64;

        if !self.write_batch(&events).await? {
            let actual = self.read_version(aggregate_id).await?;
            tracing::warn!(
                aggregate_id = %aggregate_id,
                expected_version,
                actual_version = actual,
                "Rejected stale append"
            );
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        tracing::info!(
            aggregate_id = %aggregate_id,
            aggregate_type = %self.aggregate_type_name,
            new_version,
            event_count = events.len(),
            "Appended events to event store"
        );

        Ok(new_version)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        Ok(self.read_events(aggregate_id).await?)
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, StoreError> {
        Ok(self.read_version(aggregate_id).await?)
    }
}

/// Read the `[applied]` column of a lightweight-transaction result
pub(crate) fn lwt_applied(result: QueryResult) -> anyhow::Result<bool> {
    let rows = result.into_rows_result()?;
    let row = rows.first_row::<Row>()?;
    match row.columns.first() {
        Some(Some(CqlValue::Boolean(applied))) => Ok(*applied),
        other => anyhow::bail!("Unexpected LWT result column: {:?}", other),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
