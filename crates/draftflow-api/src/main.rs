//! Draftflow CLI and REST API entry point.
//!
//! Binary name: `dflow`
//!
//! Parses CLI arguments, initializes the database and engine, then
//! dispatches to the appropriate command handler or starts the REST API
//! server.

mod http;
mod state;

use clap::{Parser, Subcommand};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use draftflow_core::engine::StartRequest;
use draftflow_types::session::{DecisionPayload, EngineStatus, SessionStatus};

use state::AppState;

#[derive(Parser)]
#[command(name = "dflow", version, about = "Checkpointed content-generation workflows")]
struct Cli {
    /// Emit machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "127.0.0.1", env = "DRAFTFLOW_HOST")]
        host: String,
        #[arg(long, default_value_t = 8340, env = "DRAFTFLOW_PORT")]
        port: u16,
        /// Export spans via OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },
    /// Start a new session and run until it parks.
    Start {
        #[arg(long, default_value = "editorial")]
        theme: String,
        /// The content brief.
        brief: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        style: Option<String>,
    },
    /// List all sessions.
    List,
    /// Show a session's full record.
    Show { id: Uuid },
    /// Approve the pending checkpoint.
    Approve {
        id: Uuid,
        /// Replacement artifact as a JSON string.
        #[arg(long)]
        edits: Option<String>,
    },
    /// Reject the pending checkpoint with feedback.
    Reject { id: Uuid, feedback: String },
    /// Rewind a parked session to an earlier checkpoint.
    Rollback {
        id: Uuid,
        /// Checkpoint to rewind to ("outline" or "article").
        target: String,
    },
    /// Resume a session from its persisted record.
    Resume { id: Uuid },
    /// Cancel a session at the next phase boundary.
    Cancel { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Serve { host, port, otel } = &cli.command {
        draftflow_observe::tracing_setup::init_tracing(*otel)
            .map_err(|e| anyhow::anyhow!("tracing init: {e}"))?;
        let result = serve(host, *port).await;
        draftflow_observe::tracing_setup::shutdown_tracing();
        return result;
    }

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info,draftflow=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve { .. } => unreachable!(),

        Commands::Start {
            theme,
            brief,
            notes,
            style,
        } => {
            let status = state
                .engine
                .start(StartRequest {
                    theme,
                    brief,
                    source_notes: notes,
                    style_guide: style,
                })
                .await?;
            print_status(&status, cli.json)?;
        }

        Commands::List => {
            let listings = state.engine.list().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listings)?);
            } else {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL_CONDENSED);
                table.set_header(["ID", "Theme", "Status", "Phase", "Updated"]);
                for listing in &listings {
                    table.add_row([
                        listing.id.to_string(),
                        listing.theme.clone(),
                        format!("{:?}", listing.status).to_lowercase(),
                        listing.current_phase.clone(),
                        listing.updated_at.to_rfc3339(),
                    ]);
                }
                println!("{table}");
            }
        }

        Commands::Show { id } => {
            let session = state.engine.get_state(id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }

        Commands::Approve { id, edits } => {
            let edits = edits
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| anyhow::anyhow!("--edits is not valid JSON: {e}"))?;
            let status = state
                .engine
                .decide(
                    id,
                    DecisionPayload {
                        approved: true,
                        edits,
                        feedback: None,
                    },
                )
                .await?;
            print_status(&status, cli.json)?;
        }

        Commands::Reject { id, feedback } => {
            let status = state
                .engine
                .decide(
                    id,
                    DecisionPayload {
                        approved: false,
                        edits: None,
                        feedback: Some(feedback),
                    },
                )
                .await?;
            print_status(&status, cli.json)?;
        }

        Commands::Rollback { id, target } => {
            let status = state.engine.rollback(id, &target, None).await?;
            print_status(&status, cli.json)?;
        }

        Commands::Resume { id } => {
            let status = state.engine.resume(id).await?;
            print_status(&status, cli.json)?;
        }

        Commands::Cancel { id } => {
            let status = state.engine.cancel(id).await?;
            print_status(&status, cli.json)?;
        }
    }

    Ok(())
}

async fn serve(host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    let recovered = state.engine.recover_interrupted().await?;
    if recovered > 0 {
        tracing::info!(count = recovered, "recovery sweep resumed interrupted sessions");
    }

    let router = http::router::build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "draftflow API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn print_status(status: &EngineStatus, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!(status))?);
        return Ok(());
    }

    let badge = match status.status {
        SessionStatus::Waiting => console::style("waiting").yellow(),
        SessionStatus::Complete => console::style("complete").green(),
        SessionStatus::Error => console::style("error").red(),
        SessionStatus::Cancelled => console::style("cancelled").dim(),
        SessionStatus::Processing => console::style("processing").cyan(),
    };
    println!();
    println!(
        "  {} session {}  [{badge}]  phase: {}",
        console::style("●").bold(),
        console::style(status.session_id).cyan(),
        status.phase
    );
    if let Some(checkpoint) = &status.checkpoint {
        let flag = if checkpoint.escalated {
            format!("  {}", console::style("(escalated)").red())
        } else {
            String::new()
        };
        println!(
            "  awaiting review of {}{flag}",
            console::style(checkpoint.artifact).bold()
        );
        println!("{}", serde_json::to_string_pretty(&checkpoint.payload)?);
    }
    if let Some(error) = &status.error {
        println!("  {} {error}", console::style("✗").red());
    }
    Ok(())
}
