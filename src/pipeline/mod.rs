// Per-order state machine: ELIGIBLE through COMPLETE, driven one order at a time.
// Outcomes are values; only state-store trouble escapes as an error.

pub mod executor;
pub mod outcome;
pub mod step;


pub use executor::PipelineExecutor;
pub use outcome::{Failure, Hold, OrderOutcome, StepError, StepOutcome};
pub use step::{is_reconciling, Completion, HoldKind, Step, RECONCILIATION_STEPS};
