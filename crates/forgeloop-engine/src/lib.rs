//! Workflow engine for forgeloop
//!
//! [`WorkflowEngine`] drives an ordered list of [`Stage`](forgeloop_stage_api::Stage)s
//! over one [`WorkflowContext`](forgeloop_stage_api::WorkflowContext), consulting an
//! [`InterventionPolicy`] when a stage fails and fanning every event out to
//! the registered [`Reporter`]s. [`PipelineBuilder`] wires the default
//! five-stage pipeline from a [`Config`](forgeloop_config::Config).

mod engine;
mod pipeline;
mod policy;
mod report;
mod reporter;

pub use engine::WorkflowEngine;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use policy::{FixedPolicy, InterventionPolicy};
pub use report::{RunFailure, RunReport, RunStatus};
pub use reporter::{ConsoleReporter, Reporter, TracingReporter};
