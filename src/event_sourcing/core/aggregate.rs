use anyhow::Result;
use uuid::Uuid;

use super::event::EventEnvelope;

// ============================================================================
// Event-sourced aggregates
// ============================================================================
//
// An aggregate never stores its state directly. `handle_command` is pure: it
// validates a command against the current state and returns the events it
// would produce, and state only changes when those events are applied after
// the store accepted them. The version is the sequence number of the last
// applied event and doubles as the optimistic concurrency token.
//
// ============================================================================

pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Build the aggregate from the event that opens its stream
    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error>;

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Events the command produces; empty when it changes nothing
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    fn aggregate_id(&self) -> Uuid;

    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    /// Apply a stored event and advance the version to its sequence number
    fn apply_envelope(&mut self, envelope: &EventEnvelope<Self::Event>) -> Result<()>
    where
        Self::Error: std::fmt::Display,
    {
        if envelope.aggregate_id != self.aggregate_id() {
            anyhow::bail!(
                "Event {} belongs to aggregate {}, not {}",
                envelope.event_id,
                envelope.aggregate_id,
                self.aggregate_id()
            );
        }
        if envelope.sequence_number <= self.version() {
            anyhow::bail!(
                "Event {} has sequence {} but the aggregate is already at {}",
                envelope.event_id,
                envelope.sequence_number,
                self.version()
            );
        }

        self.apply_event(&envelope.event_data)
            .map_err(|e| anyhow::anyhow!("Failed to apply {}: {}", envelope.event_type, e))?;
        self.set_version(envelope.sequence_number);
        Ok(())
    }

    /// Rebuild the aggregate from its full stream, oldest event first
    fn load_from_events(events: &[EventEnvelope<Self::Event>]) -> Result<Self>
    where
        Self::Error: std::fmt::Display,
    {
        let Some((first, rest)) = events.split_first() else {
            anyhow::bail!("No events to load");
        };

        let mut aggregate = Self::apply_first_event(&first.event_data)
            .map_err(|e| anyhow::anyhow!("Failed to apply {}: {}", first.event_type, e))?;
        aggregate.set_version(first.sequence_number);

        for envelope in rest {
            aggregate.apply_envelope(envelope)?;
        }
        Ok(aggregate)
    }
}
