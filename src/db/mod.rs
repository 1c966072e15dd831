use anyhow::Result;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;

// ============================================================================
// ScyllaDB Connection & Bootstrap
// ============================================================================

mod read_model;
mod schema;

pub use read_model::ScyllaOrderReadModel;
pub use schema::create_schema;

/// Connect, make sure the keyspace and tables exist, and switch to the keyspace
pub async fn connect(nodes: &[String], keyspace: &str) -> Result<Arc<Session>> {
    if keyspace.is_empty() || !keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        anyhow::bail!("Invalid keyspace name: {:?}", keyspace);
    }

    tracing::info!(nodes = ?nodes, keyspace, "Connecting to ScyllaDB...");
    let mut builder = SessionBuilder::new();
    for node in nodes {
        builder = builder.known_node(node);
    }
    let session: Session = builder.build().await?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                keyspace
            ),
            &[],
        )
        .await?;

    session.use_keyspace(keyspace, false).await?;
    create_schema(&session).await?;

    tracing::info!(keyspace, "ScyllaDB ready");
    Ok(Arc::new(session))
}
