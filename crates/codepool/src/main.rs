// SPDX-FileCopyrightText: 2026 Codepool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Codepool - bucket code ingestion and expiration monitoring.
//!
//! This is the binary entry point: long-running `serve` plus one-shot
//! operator commands against the same database and blob store.

mod app;
mod serve;
mod shutdown;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use codepool_config::model::CodepoolConfig;
use codepool_core::{CodepoolError, DiscountCodeType};
use codepool_storage::NewDiscount;

use crate::app::App;

/// Codepool - bucket code ingestion and expiration monitoring.
#[derive(Parser, Debug)]
#[command(name = "codepool", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingestion worker, stale-load recovery and expiration monitor.
    Serve,
    /// Manage discounts.
    #[command(subcommand)]
    Discount(DiscountCommand),
    /// Upload a CSV of codes for a bucket discount and ingest it.
    Upload {
        discount_id: i64,
        file: PathBuf,
        /// Only register the load; `serve` ingests it later.
        #[arg(long)]
        no_wait: bool,
    },
    /// Show the current load and code counters of a discount.
    Status {
        discount_id: i64,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Evaluate expiration thresholds for one discount, or all of them.
    Evaluate { discount_id: Option<i64> },
    /// Hand out the next unused code of a discount.
    Redeem { discount_id: i64 },
    /// Delete every code of a discount and re-arm its notifications.
    Reset { discount_id: i64 },
    /// Recompute a discount's counters from its codes.
    Reconcile { discount_id: i64 },
}

#[derive(Subcommand, Debug)]
enum DiscountCommand {
    /// Create a DRAFT discount.
    Create {
        #[arg(long)]
        agreement: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "BUCKET", value_parser = parse_code_type)]
        code_type: DiscountCodeType,
    },
    /// Publish a discount.
    Publish { discount_id: i64 },
    /// Change how a discount hands out codes.
    SetType {
        discount_id: i64,
        #[arg(value_parser = parse_code_type)]
        code_type: DiscountCodeType,
    },
}

fn parse_code_type(value: &str) -> Result<DiscountCodeType, String> {
    value
        .to_ascii_uppercase()
        .replace('-', "_")
        .parse()
        .map_err(|_| format!("unknown code type `{value}` (static, landing-page, api, bucket)"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => codepool_config::load_and_validate_path(path),
        None => codepool_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            codepool_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.service.log_level);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("codepool: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: CodepoolConfig) -> Result<(), CodepoolError> {
    if let Commands::Serve = command {
        return serve::run_serve(config).await;
    }

    let app = App::open(config).await?;
    let result = run_command(&app, command).await;
    app.close().await?;
    result
}

async fn run_command(app: &App, command: Commands) -> Result<(), CodepoolError> {
    match command {
        Commands::Serve => {
            return Err(CodepoolError::Internal(
                "serve cannot run as a one-shot command".into(),
            ));
        }
        Commands::Discount(DiscountCommand::Create {
            agreement,
            name,
            code_type,
        }) => {
            let discount = app
                .service
                .create_discount(NewDiscount {
                    agreement_id: agreement,
                    name,
                    code_type,
                })
                .await?;
            println!("created discount {} ({})", discount.id, discount.code_type);
        }
        Commands::Discount(DiscountCommand::Publish { discount_id }) => {
            let discount = app.service.publish_discount(discount_id).await?;
            println!("discount {} is {}", discount.id, discount.state);
        }
        Commands::Discount(DiscountCommand::SetType {
            discount_id,
            code_type,
        }) => {
            let discount = app.service.change_code_type(discount_id, code_type).await?;
            println!("discount {} now uses {} codes", discount.id, discount.code_type);
        }
        Commands::Upload {
            discount_id,
            file,
            no_wait,
        } => {
            let load = app.upload(discount_id, &file, !no_wait).await?;
            println!("load {} ({}) is {}", load.id, load.uid, load.status);
            if let Some(n) = load.number_of_codes {
                println!("{n} codes ingested");
            }
        }
        Commands::Status { discount_id, json } => {
            let report = status::StatusReport::collect(app, discount_id).await?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                print!("{report}");
            }
        }
        Commands::Evaluate { discount_id } => {
            let evaluations: Vec<_> = match discount_id {
                Some(id) => vec![app.monitor.evaluate_discount(id).await?],
                None => app.monitor.evaluate_all().await?,
            };
            for e in evaluations {
                println!(
                    "discount {}: {}% left, sent {:?}, already sent {:?}, failed {:?}",
                    e.discount_id, e.remaining_percent, e.sent, e.already_sent, e.failed
                );
            }
        }
        Commands::Redeem { discount_id } => match app.service.redeem_code(discount_id).await? {
            Some(code) => println!("{}", code.code),
            None => {
                return Err(CodepoolError::Conflict(format!(
                    "discount {discount_id} has no codes left"
                )));
            }
        },
        Commands::Reset { discount_id } => {
            let reset = app.service.delete_bucket_codes(discount_id).await?;
            println!(
                "deleted {} codes, cleared {} notifications",
                reset.codes_deleted, reset.ledger_entries_cleared
            );
        }
        Commands::Reconcile { discount_id } => {
            let summary = app.service.reconcile_summary(discount_id).await?;
            println!(
                "available {}, used {}",
                summary.available_codes, summary.used_codes
            );
        }
    }
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` overrides the configured level. Output goes to stderr so
/// command results on stdout stay scriptable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("codepool={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
