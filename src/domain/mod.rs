// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Domain-specific aggregates and business logic. The order aggregate lives in
// its own subdirectory with its value objects, events, commands, errors,
// aggregate implementation and command handler.
//
// This layer is completely separate from the event sourcing infrastructure.
//
// ============================================================================

pub mod order;
