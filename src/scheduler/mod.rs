//! Coalescing of bursty edits and refresh signals before they reach the store.

pub mod debounce;
pub mod dispatch;
pub mod rebuild;
pub mod throttle;
pub mod validate;

pub use debounce::Debouncer;
pub use dispatch::dispatch_batched;
pub use rebuild::RebuildGate;
pub use throttle::{SignalOutcome, Throttler};
pub use validate::{SizeReport, check_file_sizes, partition_by_size};
