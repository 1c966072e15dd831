use anyhow::Result;
use scylla::client::session::Session;

// ============================================================================
// Schema
// ============================================================================
//
// Every table is created with IF NOT EXISTS so the bootstrap can run on every
// start.
//
// ============================================================================

const TABLES: &[&str] = &[
    // Event sourcing
    "CREATE TABLE IF NOT EXISTS event_store (
        aggregate_id uuid,
        sequence_number bigint,
        event_id uuid,
        aggregate_type text,
        event_type text,
        event_version int,
        event_data text,
        causation_id uuid,
        correlation_id uuid,
        user_id uuid,
        metadata text,
        timestamp timestamp,
        PRIMARY KEY (aggregate_id, sequence_number)
    ) WITH CLUSTERING ORDER BY (sequence_number ASC)",
    // Read model
    "CREATE TABLE IF NOT EXISTS orders (
        order_id uuid PRIMARY KEY,
        client_id uuid,
        created_at timestamp,
        document text
    )",
    "CREATE TABLE IF NOT EXISTS orders_by_client (
        client_id uuid,
        created_at timestamp,
        order_id uuid,
        document text,
        PRIMARY KEY (client_id, created_at, order_id)
    ) WITH CLUSTERING ORDER BY (created_at DESC, order_id ASC)",
    "CREATE TABLE IF NOT EXISTS orders_by_vendor (
        vendor_id uuid,
        created_at timestamp,
        order_id uuid,
        document text,
        PRIMARY KEY (vendor_id, created_at, order_id)
    ) WITH CLUSTERING ORDER BY (created_at DESC, order_id ASC)",
    "CREATE TABLE IF NOT EXISTS order_numbers (
        order_number text PRIMARY KEY,
        order_id uuid
    )",
    // Collaborator data
    "CREATE TABLE IF NOT EXISTS carts (
        client_id uuid PRIMARY KEY,
        document text
    )",
    "CREATE TABLE IF NOT EXISTS vendors (
        vendor_id uuid PRIMARY KEY,
        document text
    )",
    "CREATE TABLE IF NOT EXISTS fee_rules (
        owner_id uuid,
        rule_id uuid,
        document text,
        PRIMARY KEY (owner_id, rule_id)
    )",
    "CREATE TABLE IF NOT EXISTS price_records (
        product_id uuid,
        variation_id uuid,
        record_id uuid,
        PRIMARY KEY ((product_id, variation_id))
    )",
    "CREATE TABLE IF NOT EXISTS client_contacts (
        client_id uuid PRIMARY KEY,
        document text
    )",
    "CREATE TABLE IF NOT EXISTS vendor_staff (
        vendor_id uuid,
        user_id uuid,
        PRIMARY KEY (vendor_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS admins (
        user_id uuid PRIMARY KEY
    )",
    // Dead letters
    "CREATE TABLE IF NOT EXISTS dead_letter_queue (
        id uuid PRIMARY KEY,
        kind text,
        order_id uuid,
        payload text,
        error_message text,
        failure_count int,
        first_failed_at timestamp,
        last_failed_at timestamp
    )",
];

pub async fn create_schema(session: &Session) -> Result<()> {
    for statement in TABLES {
        session.query_unpaged(*statement, &[]).await?;
    }
    tracing::info!(tables = TABLES.len(), "Schema ready");
    Ok(())
}
