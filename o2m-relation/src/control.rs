//! Bookkeeping for asynchronous recomputation of derived state.
//!
//! The engine records which of its inputs changed; the scheduler turns those
//! changes into a deduplicated set of tasks, and generations make sure a
//! slow, superseded task cannot overwrite the result of a newer one.

pub mod generation;
pub mod scheduler;
