// False positives for thiserror/miette derive macro fields
#![allow(unused_assignments)]

//! stepwise - run GitHub Actions style CI workflows locally
//!
//! The binary is a thin shell over this library: [`cli`] parses arguments and
//! maps errors to exit codes, [`commands`] implements `run`, `plan`, `init`
//! and `cache`, and [`tracing`] wires diagnostics and the pipeline event
//! stream.

// CLI output goes to stdout/stderr directly
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Tracing and event stream setup.
pub mod tracing;
