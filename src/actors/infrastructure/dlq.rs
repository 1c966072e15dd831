use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use kameo::Actor;
use scylla::client::session::Session;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Holds side effects that still failed after every retry: notifications that
// could not be delivered and carts that could not be cleared after an order
// was placed. Letters are kept in a bounded in-memory ring for inspection
// and, when a Scylla session is configured, persisted to `dead_letter_queue`.
//
// ============================================================================

/// What kind of side effect was dead-lettered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterKind {
    Notification,
    CartClear,
}

impl DeadLetterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterKind::Notification => "notification",
            DeadLetterKind::CartClear => "cart_clear",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub kind: DeadLetterKind,
    pub order_id: Uuid,
    pub payload: String,
    pub error_message: String,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
pub struct AddToDlq {
    pub kind: DeadLetterKind,
    pub order_id: Uuid,
    pub payload: String,
    pub error_message: String,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
}

/// Stats plus the `limit` most recent letters, newest first
pub struct GetDlqReport {
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DlqStats {
    pub total_messages: u64,
    pub by_kind: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqReport {
    pub stats: DlqStats,
    pub recent: Vec<DeadLetter>,
}

impl Reply for DlqReport {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct DlqActor {
    session: Option<Arc<Session>>,
    capacity: usize,
    letters: VecDeque<DeadLetter>,
    stats: DlqStats,
    metrics: Arc<Metrics>,
}

impl DlqActor {
    pub fn new(session: Option<Arc<Session>>, capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            session,
            capacity: capacity.max(1),
            letters: VecDeque::new(),
            stats: DlqStats::default(),
            metrics,
        }
    }

    async fn persist(&self, letter: &DeadLetter) {
        let Some(session) = self.session.clone() else {
            return;
        };

        let result = retry_with_backoff("persist_dead_letter", &RetryConfig::conservative(), || {
            let session = session.clone();
            async move {
                session
                    .query_unpaged(
                        "INSERT INTO dead_letter_queue (
                            id, kind, order_id, payload, error_message,
                            failure_count, first_failed_at, last_failed_at
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                        (
                            letter.id,
                            letter.kind.as_str(),
                            letter.order_id,
                            &letter.payload,
                            &letter.error_message,
                            letter.failure_count as i32,
                            letter.first_failed_at,
                            letter.last_failed_at,
                        ),
                    )
                    .await
                    .map(|_| ())
            }
        })
        .await;

        match result {
            RetryResult::Success(()) => {
                tracing::debug!(letter_id = %letter.id, "Dead letter persisted");
            }
            RetryResult::Failed { error: e, .. } => {
                tracing::error!(
                    letter_id = %letter.id,
                    error = %e,
                    "Failed to persist dead letter, kept in memory only"
                );
            }
        }
    }
}

impl Actor for DlqActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(
            capacity = state.capacity,
            persistent = state.session.is_some(),
            "DlqActor started - Dead Letter Queue ready"
        );
        Ok(state)
    }
}

// ============================================================================
// Handlers
// ============================================================================

impl Message<AddToDlq> for DlqActor {
    type Reply = ();

    async fn handle(&mut self, msg: AddToDlq, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let letter = DeadLetter {
            id: Uuid::now_v7(),
            kind: msg.kind,
            order_id: msg.order_id,
            payload: msg.payload,
            error_message: msg.error_message,
            failure_count: msg.failure_count,
            first_failed_at: msg.first_failed_at,
            last_failed_at: Utc::now(),
        };

        tracing::error!(
            letter_id = %letter.id,
            kind = letter.kind.as_str(),
            order_id = %letter.order_id,
            error = %letter.error_message,
            failure_count = letter.failure_count,
            "💀 Adding message to Dead Letter Queue"
        );

        self.metrics.record_dlq_message(letter.kind.as_str());
        self.stats.total_messages += 1;
        *self
            .stats
            .by_kind
            .entry(letter.kind.as_str().to_string())
            .or_insert(0) += 1;

        self.persist(&letter).await;

        if self.letters.len() == self.capacity {
            self.letters.pop_front();
        }
        self.letters.push_back(letter);
    }
}

impl Message<GetDlqReport> for DlqActor {
    type Reply = DlqReport;

    async fn handle(&mut self, msg: GetDlqReport, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        DlqReport {
            stats: self.stats.clone(),
            recent: self.letters.iter().rev().take(msg.limit).cloned().collect(),
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Where failed side effects end up
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, letter: AddToDlq);
}

#[async_trait]
impl DeadLetterSink for ActorRef<DlqActor> {
    async fn dead_letter(&self, letter: AddToDlq) {
        let order_id = letter.order_id;
        if self.tell(letter).send().await.is_err() {
            tracing::error!(order_id = %order_id, "DlqActor unavailable, dead letter dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kameo::prelude::*;

    fn letter(kind: DeadLetterKind, error: &str) -> AddToDlq {
        AddToDlq {
            kind,
            order_id: Uuid::now_v7(),
            payload: "{}".to_string(),
            error_message: error.to_string(),
            failure_count: 3,
            first_failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ring_is_bounded_but_stats_count_everything() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let dlq = DlqActor::spawn(DlqActor::new(None, 2, metrics.clone()));

        dlq.ask(letter(DeadLetterKind::Notification, "first")).await.unwrap();
        dlq.ask(letter(DeadLetterKind::Notification, "second")).await.unwrap();
        dlq.ask(letter(DeadLetterKind::CartClear, "third")).await.unwrap();

        let report = dlq.ask(GetDlqReport { limit: 10 }).await.unwrap();
        assert_eq!(report.stats.total_messages, 3);
        assert_eq!(report.stats.by_kind["notification"], 2);
        assert_eq!(report.stats.by_kind["cart_clear"], 1);
        assert_eq!(report.recent.len(), 2);
        assert_eq!(report.recent[0].error_message, "third");
        assert_eq!(report.recent[1].error_message, "second");
        assert_eq!(metrics.dlq_messages_total.get(), 3);
    }

    #[tokio::test]
    async fn test_sink_forwards_to_actor() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let dlq = DlqActor::spawn(DlqActor::new(None, 10, metrics));

        dlq.dead_letter(letter(DeadLetterKind::CartClear, "cart service down")).await;

        let report = dlq.ask(GetDlqReport { limit: 1 }).await.unwrap();
        assert_eq!(report.stats.total_messages, 1);
        assert_eq!(report.recent[0].kind, DeadLetterKind::CartClear);
    }
}
