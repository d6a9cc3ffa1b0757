//! stepwise CLI Application
//!
//! Runs GitHub Actions style workflows on the local machine: steps in order,
//! the first fatal failure halting the run, pip dependencies cached between
//! runs.

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::time::Duration;
use stepwise::cli::{self, Cli, EXIT_OK, EXIT_OTHER, exit_code_for, render_error};
use stepwise::commands;
use stepwise::tracing::{LogLevel, TracingConfig, TracingFormat, init_tracing_with_events};
use stepwise_events::renderers::{CliRenderer, CliRendererConfig, JsonRenderer};
use tokio_util::sync::CancellationToken;

fn main() {
    // Tracing may be unusable while panicking, so write directly
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_OTHER);
        }
    };

    let exit_code = rt.block_on(run(cli));
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    let json = cli.json;
    let verbose = matches!(cli.level, LogLevel::Debug | LogLevel::Trace);
    let config = TracingConfig {
        format: if json {
            TracingFormat::Json
        } else {
            TracingFormat::Compact
        },
        level: cli.level.into(),
        filter: None,
    };
    let receiver = match init_tracing_with_events(&config) {
        Ok(receiver) => receiver,
        Err(e) => {
            eprintln!("{e:?}");
            return EXIT_OTHER;
        }
    };
    let renderer = if json {
        tokio::spawn(JsonRenderer::new().run(receiver))
    } else {
        let renderer = CliRenderer::with_config(CliRendererConfig {
            verbose,
            ..CliRendererConfig::default()
        });
        tokio::spawn(renderer.run(receiver))
    };

    // Ctrl-C cancels the run; the executor marks the remaining steps and
    // the report still gets written
    let cancel = CancellationToken::new();
    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling the run");
                cancel.cancel();
            }
        })
    };

    let result = commands::execute(cli.command, json, cancel).await;
    signal.abort();

    stepwise_events::emit_shutdown!();
    let _ = tokio::time::timeout(Duration::from_millis(100), renderer).await;

    match result {
        Ok(outcome) => {
            if let Some(text) = outcome.output {
                println!("{text}");
            }
            outcome.failure.map_or(EXIT_OK, |err| {
                let code = exit_code_for(&err);
                // JSON mode already carries the status in the report
                if !json {
                    render_error(err, false);
                }
                code
            })
        }
        Err(err) => {
            let code = exit_code_for(&err);
            render_error(err, json);
            code
        }
    }
}
