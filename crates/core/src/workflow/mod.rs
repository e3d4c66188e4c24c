//! Create / resume / start flows tying the components together.
//!
//! Every failure is reported as a [`WorkflowError`] naming the [`Step`] that
//! failed and the [`Recovery`] the operator should take.

mod error;
mod runner;
mod types;

pub use error::{Recovery, Step, StepError, StepResultExt, WorkflowError};
pub use runner::Workflow;
pub use types::{CreateOutcome, CreateRequest, DeleteReport, RepairReport, StatusReport};
