//! Core business logic - framework-agnostic recurrence, catch-up, sweep and currency operations.

/// Catch-up generator: materializes due occurrences of one rule
pub mod catch_up;
/// Exchange-rate lookups behind a TTL cache
pub mod exchange;
/// Recurrence calculator: pure occurrence date arithmetic
pub mod recurrence;
/// Rule creation boundary and rule store queries
pub mod rule;
/// Daily sweep across all due rules
pub mod sweep;
