//! CLI entry point for the closed-loop CSP orchestrator.
//!
//! The four `csp:*` commands print exactly one line of strict JSON on
//! stdout, for success and failure alike, and exit 0/1. Anything else on
//! argv is forwarded to the host CLI untouched.

use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::{json, Value};
use std::ffi::OsString;
use std::process::exit;

mod aggregate;
mod canonical;
mod cli;
mod config;
mod persistence;
mod policy;
mod rng;
mod schema;
mod store;
mod tools;
mod workflow;

use cli::{Command, CommonArgs, ExportFormatArg, RootArgs};
use config::CliOverrides;
use tools::ToolClient;
use workflow::{ExportFormat, WorkflowContext};

fn main() {
    let argv: Vec<OsString> = std::env::args_os().skip(1).collect();
    if let Some(first) = argv.first().and_then(|arg| arg.to_str()) {
        if !first.starts_with("csp:") && !first.starts_with('-') {
            forward_to_host(&argv);
        }
    }

    let root = match RootArgs::try_parse() {
        Ok(root) => root,
        Err(err)
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp
                    | clap::error::ErrorKind::DisplayVersion
                    | clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            let _ = err.print();
            return;
        }
        Err(err) => {
            print_error(&err.to_string());
            exit(1);
        }
    };

    match dispatch(root.command) {
        Ok(value) => println!("{value}"),
        Err(err) => {
            print_error(&format!("{err:#}"));
            exit(1);
        }
    }
}

fn print_error(message: &str) {
    println!(
        "{}",
        json!({ "status": "error", "error": message.trim() })
    );
}

fn dispatch(command: Command) -> Result<Value> {
    match command {
        Command::Discover(args) => {
            let overrides = CliOverrides {
                workspace: args.common.workspace.clone(),
                solver: args.solver.clone(),
                max_iters: args.max_iters,
            };
            let mut ctx = build_context(&args.common, &overrides)?;
            let outcome =
                workflow::run_discover(&mut ctx, &args.objective, args.chem_system.as_deref())?;
            to_json(&outcome)
        }
        Command::Iterate(args) => {
            let overrides = CliOverrides {
                workspace: args.common.workspace.clone(),
                ..CliOverrides::default()
            };
            let mut ctx = build_context(&args.common, &overrides)?;
            let outcome = workflow::run_iterate(&mut ctx, &args.run_id)?;
            to_json(&outcome)
        }
        Command::Validate(args) => {
            let overrides = CliOverrides {
                workspace: args.common.workspace.clone(),
                ..CliOverrides::default()
            };
            let mut ctx = build_context(&args.common, &overrides)?;
            let outcome = workflow::run_validate(&mut ctx, &args.run_id, args.top_k)?;
            to_json(&outcome)
        }
        Command::Export(args) => {
            // Export performs no tool calls, so the inert stub client is fine.
            let common = CommonArgs {
                workspace: args.workspace.clone(),
                seed: 1,
                config: args.config.clone(),
                dry_run: true,
                verbose: args.verbose,
            };
            let overrides = CliOverrides {
                workspace: args.workspace.clone(),
                ..CliOverrides::default()
            };
            let ctx = build_context(&common, &overrides)?;
            let format = match args.format {
                ExportFormatArg::Cif => ExportFormat::Cif,
                ExportFormatArg::Poscar => ExportFormat::Poscar,
            };
            let outcome = workflow::run_export(&ctx, &args.run_id, format, args.top_k)?;
            to_json(&outcome)
        }
    }
}

fn build_context(common: &CommonArgs, overrides: &CliOverrides) -> Result<WorkflowContext> {
    let config = config::resolve(common.config.as_deref(), overrides)?;
    let workspace = config
        .workspace
        .clone()
        .ok_or_else(|| anyhow!("missing --workspace"))?;
    // --dry-run always wins over the configured transport.
    let client = if common.dry_run {
        ToolClient::stub(common.seed)
    } else {
        ToolClient::real(config.tools.bridge.clone())
    };
    Ok(WorkflowContext {
        config,
        workspace,
        seed: common.seed,
        verbose: common.verbose,
        client,
    })
}

fn to_json<T: serde::Serialize>(outcome: &T) -> Result<Value> {
    Ok(serde_json::to_value(outcome)?)
}

/// Non-CSP argv belongs to the host CLI; inherit stdio and propagate its
/// exit code.
fn forward_to_host(argv: &[OsString]) -> ! {
    let host = config::resolve(None, &CliOverrides::default())
        .map(|config| config.host_cli)
        .unwrap_or_else(|_| "claude-flow".to_string());
    match std::process::Command::new(&host).args(argv).status() {
        Ok(status) => exit(status.code().unwrap_or(1)),
        Err(err) => {
            print_error(&format!("forward to {host}: {err}"));
            exit(1);
        }
    }
}
