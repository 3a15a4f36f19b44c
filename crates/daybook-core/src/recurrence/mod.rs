//! Recurrence rules and deterministic occurrence expansion.
//!
//! A series is an item carrying a [`RecurrenceRule`]; expansion turns the
//! rule plus its anchor into concrete dated occurrences, with per-occurrence
//! exceptions applied on top. Expansion is pure: same inputs, same output,
//! callable concurrently for different series without synchronization.

pub mod expand;
pub mod occurrence;
pub mod rule;

pub use expand::{clamp_day_of_month, expand, expand_item};
pub use occurrence::{Exception, Occurrence, OccurrenceOverride, OccurrenceStatus};
pub use rule::{Frequency, RecurrenceRule, Termination};
