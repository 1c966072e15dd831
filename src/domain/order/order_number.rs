use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use super::errors::OrderError;
use super::read_model::OrderReadModel;

/// `{prefix}-{YYYYMMDDHHMMSS}-{sequence:04}`
pub fn format_order_number(prefix: &str, at: DateTime<FixedOffset>, sequence: u64) -> String {
    format!("{}-{}-{:04}", prefix, at.format("%Y%m%d%H%M%S"), sequence)
}

/// Reserve a unique order number, bumping the sequence on every collision
pub async fn reserve_order_number(
    read_model: &dyn OrderReadModel,
    prefix: &str,
    at: DateTime<FixedOffset>,
    order_id: Uuid,
    max_attempts: u32,
) -> Result<String, OrderError> {
    let mut sequence = read_model.count().await? + 1;
    let mut last_tried = String::new();

    for attempt in 1..=max_attempts {
        let candidate = format_order_number(prefix, at, sequence);
        if read_model.reserve_order_number(&candidate, order_id).await? {
            return Ok(candidate);
        }

        tracing::warn!(
            order_number = %candidate,
            attempt,
            "Order number already taken, retrying"
        );
        last_tried = candidate;
        sequence += 1;
    }

    Err(OrderError::DuplicateOrderNumber(last_tried))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::read_model::InMemoryOrderReadModel;

    fn at() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-05-04T09:08:07+03:00").unwrap()
    }

    #[test]
    fn test_format() {
        assert_eq!(format_order_number("CMD", at(), 7), "CMD-20260504090807-0007");
        assert_eq!(format_order_number("CMD", at(), 12345), "CMD-20260504090807-12345");
    }

    #[tokio::test]
    async fn test_collision_bumps_sequence() {
        let model = InMemoryOrderReadModel::new();
        // Another writer grabbed the number this one would compute first
        model.reserve_order_number("CMD-20260504090807-0002", Uuid::new_v4()).await.unwrap();

        let number = reserve_order_number(&model, "CMD", at(), Uuid::new_v4(), 3).await.unwrap();
        assert_eq!(number, "CMD-20260504090807-0003");
    }

    #[tokio::test]
    async fn test_exhausted_attempts_is_conflict() {
        let model = InMemoryOrderReadModel::new();
        model.reserve_order_number("CMD-20260504090807-0002", Uuid::new_v4()).await.unwrap();

        let err = reserve_order_number(&model, "CMD", at(), Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, OrderError::DuplicateOrderNumber(_)));
    }
}
