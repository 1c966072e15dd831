use chrono::FixedOffset;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::order::{OrderSettings, SnapshotSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Process-local stores, lost on restart
    Memory,
    Scylla,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NotifierBackend {
    Log,
    Redpanda,
}

/// Order fulfillment service for the multi-vendor boutique
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "HTTP_BIND", default_value = "0.0.0.0:8080")]
    pub http_bind: String,

    #[arg(long, env = "STORAGE", value_enum, default_value_t = StorageBackend::Memory)]
    pub storage: StorageBackend,

    /// JSON fixture (vendors, fee rules, clients, staff, carts) for the memory backend
    #[arg(long, env = "SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Comma separated contact points
    #[arg(long, env = "SCYLLA_NODES", value_delimiter = ',', default_value = "127.0.0.1:9042")]
    pub scylla_nodes: Vec<String>,

    #[arg(long, env = "KEYSPACE", default_value = "boutique_orders")]
    pub keyspace: String,

    #[arg(long, env = "NOTIFIER", value_enum, default_value_t = NotifierBackend::Log)]
    pub notifier: NotifierBackend,

    #[arg(long, env = "REDPANDA_BROKERS", default_value = "127.0.0.1:9092")]
    pub redpanda_brokers: String,

    #[arg(long, env = "NOTIFICATION_TOPIC", default_value = "order-notifications")]
    pub notification_topic: String,

    #[arg(long, env = "ORDER_NUMBER_PREFIX", default_value = "CMD")]
    pub order_number_prefix: String,

    /// Fee charged when no vendor or global rule matches
    #[arg(long, env = "DEFAULT_DELIVERY_FEE", default_value = "2000")]
    pub default_delivery_fee: Decimal,

    /// Offset of the business calendar used for same-day checks and order numbers
    #[arg(long, env = "BUSINESS_UTC_OFFSET_MINUTES", default_value_t = 180, allow_negative_numbers = true)]
    pub business_utc_offset_minutes: i32,

    #[arg(long, env = "WAREHOUSE_PICKUP_LABEL", default_value = "Retrait entrepot")]
    pub warehouse_pickup_label: String,

    #[arg(long, env = "DLQ_CAPACITY", default_value_t = 1000)]
    pub dlq_capacity: usize,

    #[arg(long, env = "MAX_ORDER_NUMBER_ATTEMPTS", default_value_t = 20)]
    pub max_order_number_attempts: u32,

    #[arg(long, env = "HEALTH_CHECK_INTERVAL_SECS", default_value_t = 30)]
    pub health_check_interval_secs: u64,
}

impl Config {
    pub fn business_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.business_utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!("UTC offset of {} minutes is out of range", self.business_utc_offset_minutes)
        })
    }

    pub fn snapshot_settings(&self) -> anyhow::Result<SnapshotSettings> {
        Ok(SnapshotSettings {
            default_delivery_fee: self.default_delivery_fee,
            business_offset: self.business_offset()?,
            warehouse_pickup_label: self.warehouse_pickup_label.clone(),
        })
    }

    pub fn order_settings(&self) -> anyhow::Result<OrderSettings> {
        Ok(OrderSettings {
            order_number_prefix: self.order_number_prefix.clone(),
            business_offset: self.business_offset()?,
            max_order_number_attempts: self.max_order_number_attempts,
        })
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["boutique_orders"]);
        assert_eq!(config.http_bind, "0.0.0.0:8080");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.seed_file, None);
        assert_eq!(config.notifier, NotifierBackend::Log);
        assert_eq!(config.default_delivery_fee, Decimal::from(2000));
        assert_eq!(config.business_offset().unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(config.order_settings().unwrap().order_number_prefix, "CMD");
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::parse_from([
            "boutique_orders",
            "--storage",
            "scylla",
            "--scylla-nodes",
            "10.0.0.1:9042,10.0.0.2:9042",
            "--notifier",
            "redpanda",
            "--business-utc-offset-minutes",
            "-60",
            "--default-delivery-fee",
            "3500.50",
            "--seed-file",
            "fixtures/demo.json",
        ]);
        assert_eq!(config.storage, StorageBackend::Scylla);
        assert_eq!(config.scylla_nodes, vec!["10.0.0.1:9042", "10.0.0.2:9042"]);
        assert_eq!(config.notifier, NotifierBackend::Redpanda);
        assert_eq!(config.business_offset().unwrap().local_minus_utc(), -3600);
        assert_eq!(config.snapshot_settings().unwrap().default_delivery_fee, Decimal::new(350050, 2));
        assert_eq!(config.seed_file, Some(PathBuf::from("fixtures/demo.json")));
    }

    #[test]
    fn test_out_of_range_offset_is_rejected() {
        let config = Config::parse_from(["boutique_orders", "--business-utc-offset-minutes", "2000"]);
        assert!(config.business_offset().is_err());
    }
}
