//! `funnel` CLI entry-point.
//!
//! Available sub-commands:
//! - `worker`   start a worker that resumes due continuations.
//! - `migrate`  run pending database migrations.
//! - `validate` validate an action tree JSON file.
//! - `run`      execute one action tree against a JSON fixture.

mod fixture;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use activities::{ActionCatalog, ActionId, ActionNode, ContactId, ExecutionContext, SystemClock};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use engine::{validate_tree, ActivityRegistry, ContinuationJob, EngineConfig, TreeExecutor};
use queue::{HandlerRegistry, InMemoryScheduler, Worker, WorkerConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::fixture::{wire, Fixture};

#[derive(Parser)]
#[command(name = "funnel", about = "Marketing funnel action-tree engine", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Maximum tree depth the executor will descend to.
    #[arg(long, global = true, default_value_t = 64)]
    max_depth: usize,

    /// Lifetime of issued auth tickets, in days (1 to 36500).
    #[arg(long, global = true, default_value_t = 30,
          value_parser = clap::value_parser!(i64).range(1..=36_500))]
    ticket_days: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the continuation queue and resume due subtrees.
    Worker {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        /// Catalog, rules and templates the continuations run against.
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,
        #[arg(long, default_value_t = 2)]
        max_attempts: u32,
        #[arg(long, default_value_t = 16)]
        batch_size: usize,
        /// Seconds a claimed job stays exclusive before another worker may
        /// take it over.
        #[arg(long, default_value_t = 300)]
        lease_secs: u64,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate an action tree JSON file.
    Validate {
        /// Path to the tree JSON file.
        path: PathBuf,
    },
    /// Execute one tree from a fixture and print the root result.
    Run {
        /// Fixture with projects, actions, contacts, templates and rules.
        catalog: PathBuf,
        #[arg(long)]
        action: ActionId,
        /// Contact from the fixture to run for.
        #[arg(long)]
        contact: Option<ContactId>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let engine_config = EngineConfig {
        ticket_lifetime: chrono::Duration::days(cli.ticket_days),
        max_depth: cli.max_depth,
    };

    match cli.command {
        Command::Worker { database_url, catalog, poll_interval_ms, max_attempts, batch_size, lease_secs } => {
            let config = WorkerConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_attempts,
                batch_size,
                ..WorkerConfig::default()
            };
            let pool = db::create_pool(&database_url, 5).await.context("failed to connect to database")?;
            let store = Arc::new(
                db::PgJobStore::new(pool, config.max_attempts)
                    .with_lease(Duration::from_secs(lease_secs)),
            );
            let wiring = wire(Fixture::load(&catalog)?, store.clone(), engine_config.ticket_lifetime);

            let executor = Arc::new(TreeExecutor::new(
                ActivityRegistry::builtin(&wiring.services),
                engine_config,
            ));
            let handlers = HandlerRegistry::new()
                .register(Arc::new(ContinuationJob::new(wiring.catalog.clone(), executor)));
            let worker = Worker::new(store, handlers, Arc::new(SystemClock), config);

            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown requested");
                    shutdown.cancel();
                }
            });
            worker.run(cancel).await;
        }
        Command::Migrate { database_url } => {
            let pool = db::create_pool(&database_url, 2).await.context("failed to connect to database")?;
            db::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let root: ActionNode = serde_json::from_str(&content).context("invalid tree JSON")?;
            let count = validate_tree(&root, engine_config.max_depth)
                .with_context(|| format!("tree {} is invalid", root.id))?;
            println!("tree {} is valid ({count} actions)", root.id);
        }
        Command::Run { catalog, action, contact } => {
            let scheduler = Arc::new(InMemoryScheduler::new(WorkerConfig::default().max_attempts));
            let wiring = wire(Fixture::load(&catalog)?, scheduler.clone(), engine_config.ticket_lifetime);
            let catalog = wiring.services.catalog.clone();

            let Some(root) = catalog.get_action(action).await? else {
                bail!("action {action} not found in fixture");
            };
            validate_tree(&root, engine_config.max_depth)?;
            let Some(project) = catalog.get_project(root.project_id).await? else {
                bail!("project {} not found in fixture", root.project_id);
            };

            let mut ctx = ExecutionContext::new(project, root.id);
            if let Some(id) = contact {
                let Some(record) = wiring.catalog.contact(id) else {
                    bail!("contact {id} not found in fixture");
                };
                ctx = ctx.with_contact(record);
            }

            let executor = TreeExecutor::new(ActivityRegistry::builtin(&wiring.services), engine_config);
            let result = executor.run_tree(&root, &mut ctx, &CancellationToken::new()).await?;

            let report = json!({
                "result": result,
                "contactState": ctx.contact_state,
                "events": wiring.events.all(),
                "scheduledJobs": scheduler.pending_count().await,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_days_must_be_in_range() {
        for bad in ["0", "-5", "99999999999999"] {
            let parsed = Cli::try_parse_from(["funnel", "--ticket-days", bad, "validate", "tree.json"]);
            assert!(parsed.is_err(), "accepted --ticket-days {bad}");
        }
        let cli = Cli::try_parse_from(["funnel", "--ticket-days", "36500", "validate", "tree.json"]).unwrap();
        assert_eq!(cli.ticket_days, 36_500);
    }
}
