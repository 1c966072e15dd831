// ============================================================================
// Core Actor Abstractions
// ============================================================================
//
// Generic types shared by the infrastructure actors.
//
// ============================================================================

pub mod health;

// Re-export core types
pub use health::*;
