use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Events and their envelopes
// ============================================================================
//
// The store persists envelopes, not bare events. An envelope fixes the
// position of the event in its aggregate stream (`sequence_number`) and
// records who caused it. Events produced by the same command share a
// `correlation_id`; each event after the first names its predecessor as
// `causation_id`.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    /// Concrete event name, e.g. "LotAccepted"
    pub event_type: String,
    /// Payload schema version
    pub event_version: i32,
    pub event_data: E,

    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,
    pub user_id: Option<Uuid>,

    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_type: String,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            sequence_number,
            event_type,
            event_version: 1,
            event_data,
            causation_id: None,
            correlation_id,
            user_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_causation(mut self, causation_id: Option<Uuid>) -> Self {
        self.causation_id = causation_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Implemented by every event enum that goes through the store
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    /// Name of the whole event family, e.g. "OrderEvent"
    fn event_type() -> &'static str where Self: Sized;

    fn event_version() -> i32 where Self: Sized { 1 }

    /// Name of this variant, stored as the envelope's `event_type`
    fn event_name(&self) -> &'static str;
}

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String> {
    serde_json::to_string(event).context("Failed to serialize event payload")
}

pub fn deserialize_event<E: for<'de> Deserialize<'de>>(json: &str) -> Result<E> {
    serde_json::from_str(json).context("Failed to deserialize event payload")
}
