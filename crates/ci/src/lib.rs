//! Pipeline compilation and execution for stepwise.
//!
//! A [`workflow::Workflow`] is compiled into one [`pipeline::Pipeline`] per
//! matrix combination, then run step by step by the
//! [`executor::PipelineExecutor`]. Built-in actions live in [`actions`], the
//! dependency cache in [`cache`], and run results in [`report`].

#![allow(missing_docs)]

pub mod actions;
pub mod cache;
pub mod context;
pub mod executor;
pub mod expr;
pub mod hashing;
pub mod pipeline;
pub mod presets;
pub mod provider;
pub mod report;
pub mod workflow;

pub use context::{CIContext, EventKind, TriggerEvent};
pub use executor::{ExecutorConfig, PipelineExecutor};
pub use pipeline::{CompileOptions, Pipeline, compile_workflow};
pub use report::{RunResult, RunStatus, StepStatus, WorkflowReport};
pub use workflow::Workflow;

use stepwise_core::Error;
pub type Result<T> = std::result::Result<T, Error>;
