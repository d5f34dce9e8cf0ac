use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tether_cache::{RegistryConfig, Resource, ScopeDirectory, Session, ThreadIdentity};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Tether: thread-affine resource holder tooling
#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Drive and inspect thread-bound resource registries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run request threads against per-scope registries and print snapshots
    Simulate {
        /// Registry limits as JSON; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value_t = 4)]
        threads: usize,
        #[arg(short, long, default_value_t = 100)]
        requests: usize,
        #[arg(short, long, default_value_t = 1)]
        scopes: usize,
        #[arg(long)]
        max_uses: Option<u64>,
        #[arg(long)]
        max_age_ms: Option<u64>,
        #[arg(long)]
        grace_period_ms: Option<u64>,
        /// Pause between requests of one thread
        #[arg(long, default_value_t = 0)]
        pause_ms: u64,
    },
    /// Validate a registry config file
    CheckConfig { path: PathBuf },
}

static NEXT_EVALUATOR: AtomicU64 = AtomicU64::new(1);

/// Stand-in for an expensive policy evaluator
struct SimulatedEvaluator {
    id: u64,
    scope: String,
}

impl Resource for SimulatedEvaluator {
    fn close(&self) -> Result<()> {
        debug!("Closing evaluator #{} ({})", self.id, self.scope);
        Ok(())
    }
}

struct SimulatedSession {
    evaluator: u64,
}

impl Session for SimulatedSession {
    fn logout(&mut self) -> Result<()> {
        debug!("Logging out session of evaluator #{}", self.evaluator);
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            threads,
            requests,
            scopes,
            max_uses,
            max_age_ms,
            grace_period_ms,
            pause_ms,
        } => {
            let mut template = match config {
                Some(path) => RegistryConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => RegistryConfig::default(),
            };
            if let Some(max_uses) = max_uses {
                template.max_uses = max_uses;
            }
            if let Some(max_age_ms) = max_age_ms {
                template.max_age_ms = max_age_ms;
            }
            if let Some(grace_period_ms) = grace_period_ms {
                template.grace_period_ms = grace_period_ms;
            }

            simulate(template, threads, requests, scopes.max(1), pause_ms)
        }
        Commands::CheckConfig { path } => {
            let config = RegistryConfig::load(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            info!("✅ {} is valid", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn simulate(
    template: RegistryConfig,
    threads: usize,
    requests: usize,
    scopes: usize,
    pause_ms: u64,
) -> Result<()> {
    let directory =
        ScopeDirectory::<SimulatedEvaluator, SimulatedSession>::new(template.clone())?;

    info!(
        "🚀 Simulating {} threads x {} requests over {} scopes (max_age={:?}, grace={:?})",
        threads,
        requests,
        scopes,
        template.max_age(),
        template.grace_period()
    );

    thread::scope(|s| -> Result<()> {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                let directory = &directory;
                s.spawn(move || -> Result<()> {
                    let me = ThreadIdentity::current();
                    for request in 0..requests {
                        let scope = format!("workspace-{}", request % scopes);
                        let registry = directory.registry(&scope)?;
                        let factory = |_: &ThreadIdentity| -> Result<_> {
                            let id = NEXT_EVALUATOR.fetch_add(1, Ordering::SeqCst);
                            Ok((
                                SimulatedEvaluator {
                                    id,
                                    scope: scope.clone(),
                                },
                                SimulatedSession { evaluator: id },
                            ))
                        };
                        let evaluator = registry.get_or_create(&me, &factory)?;
                        debug!("{} served by evaluator #{}", me, evaluator.id);

                        if pause_ms > 0 {
                            thread::sleep(Duration::from_millis(pause_ms));
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("simulation thread panicked"))??;
        }
        Ok(())
    })?;

    let snapshots = directory.snapshots();
    for snapshot in &snapshots {
        info!(
            "📊 {}: hit rate {:.1}%, {} created, {} still tracked",
            snapshot.scope_name,
            snapshot.hit_rate(),
            snapshot.created,
            snapshot.tracked()
        );
    }
    println!("{}", serde_json::to_string_pretty(&snapshots)?);
    directory.close_all();
    Ok(())
}
