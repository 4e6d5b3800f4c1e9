//! `workflow-runtime` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: check the definitions in a JSON file.
//! - `migrate`:  run pending database migrations.
//! - `list`:     show the versions the registry resolves for an id.
//! - `run`:      resolve a definition, run it and persist the instance.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::source::file::parse_definitions;
use engine::source::{FileSource, StoreSource};
use engine::store::{MemoryDefinitionStore, MemoryInstanceStore};
use engine::{
    DefinitionRegistry, DefinitionSource, DefinitionStore, InstanceStore, InvokerConfig,
    RegistryConfig, Signal, VersionQuery, WorkflowInvoker, WorkflowRuntime,
};

#[derive(Parser)]
#[command(
    name = "workflow-runtime",
    about = "Versioned workflow definition registry and runner",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a definition JSON file (one object or an array).
    Validate {
        /// Path to the definition JSON file.
        path: PathBuf,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// List the versions of a definition matching a version query.
    List {
        definition_id: String,
        /// draft | latest | published | latest-or-published | all | <n>
        #[arg(long = "version", default_value = "all")]
        query: VersionQuery,
        #[command(flatten)]
        registry: RegistryArgs,
    },
    /// Resolve a definition, run it and persist the resulting instance.
    Run {
        definition_id: String,
        /// draft | latest | published | latest-or-published | all | <n>
        #[arg(long = "version", default_value = "latest-or-published")]
        query: VersionQuery,
        /// JSON input handed to the first node.
        #[arg(long, default_value = "{}")]
        input: String,
        #[command(flatten)]
        registry: RegistryArgs,
    },
}

/// Where definitions come from, where runs go, and how long the
/// aggregate is cached.
#[derive(Args)]
struct RegistryArgs {
    /// Directory of definition JSON files.
    #[arg(long, env = "WORKFLOW_DEFINITIONS_DIR")]
    definitions_dir: Option<PathBuf>,

    /// Postgres URL. Without it definitions and instances live in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "WORKFLOW_CACHE_SLIDING_SECS", default_value_t = 3600)]
    cache_sliding_secs: u64,

    #[arg(long, env = "WORKFLOW_CACHE_ABSOLUTE_SECS", default_value_t = 14400)]
    cache_absolute_secs: u64,
}

impl RegistryArgs {
    fn config(&self) -> RegistryConfig {
        RegistryConfig {
            sliding_expiration: Duration::from_secs(self.cache_sliding_secs),
            absolute_expiration: Duration::from_secs(self.cache_absolute_secs),
        }
    }

    async fn build(&self) -> Result<WorkflowRuntime> {
        let (definitions, instances): (Arc<dyn DefinitionStore>, Arc<dyn InstanceStore>) =
            match &self.database_url {
                Some(url) => {
                    let pool = db::create_pool(url, 5)
                        .await
                        .context("failed to connect to database")?;
                    let store = Arc::new(db::PgStore::new(pool));
                    let definitions: Arc<dyn DefinitionStore> = store.clone();
                    let instances: Arc<dyn InstanceStore> = store;
                    (definitions, instances)
                }
                None => {
                    warn!("no database configured, runs will not outlive this process");
                    let definitions: Arc<dyn DefinitionStore> = Arc::new(MemoryDefinitionStore::new());
                    let instances: Arc<dyn InstanceStore> = Arc::new(MemoryInstanceStore::new());
                    (definitions, instances)
                }
            };

        let mut sources: Vec<Arc<dyn DefinitionSource>> = Vec::new();
        if let Some(dir) = &self.definitions_dir {
            sources.push(Arc::new(FileSource::new(dir)));
        }
        sources.push(Arc::new(StoreSource::new(Arc::clone(&definitions))));

        let registry = Arc::new(DefinitionRegistry::new(sources, Signal::new(), &self.config()));
        let invoker = Arc::new(WorkflowInvoker::new(
            nodes::builtin_nodes(),
            InvokerConfig::default(),
        ));
        Ok(WorkflowRuntime::new(registry, definitions, instances, invoker))
    }
}

/// A token cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let definitions = parse_definitions(&content).context("invalid definition JSON")?;

            let mut failed = false;
            for definition in &definitions {
                let (id, version) = definition.key();
                if version == 0 {
                    eprintln!("❌ {id}: version must be at least 1");
                    failed = true;
                    continue;
                }
                match engine::validate_dag(definition) {
                    Ok(order) => println!("✅ {id}@{version} is valid. Execution order: {order:?}"),
                    Err(e) => {
                        eprintln!("❌ {id}@{version}: {e}");
                        failed = true;
                    }
                }
            }
            if failed {
                std::process::exit(1);
            }
        }
        Command::Migrate { database_url } => {
            info!("running migrations");
            let pool = db::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied successfully");
        }
        Command::List { definition_id, query, registry } => {
            let runtime = registry.build().await?;
            let found = runtime
                .registry()
                .list_definitions(&definition_id, query, &shutdown_token())
                .await?;
            if found.is_empty() {
                bail!("no version of '{definition_id}' matches {query}");
            }
            for definition in found {
                println!(
                    "{}@{}\tlatest={}\tpublished={}\t{}",
                    definition.definition_id,
                    definition.version,
                    definition.is_latest,
                    definition.is_published,
                    definition.name
                );
            }
        }
        Command::Run { definition_id, query, input, registry } => {
            let input: serde_json::Value =
                serde_json::from_str(&input).context("--input is not valid JSON")?;
            let runtime = registry.build().await?;

            let Some(instance) = runtime
                .run(&definition_id, query, input, &shutdown_token())
                .await?
            else {
                bail!("no version of '{definition_id}' matches {query}");
            };

            info!(instance_id = %instance.id, "run finished");
            println!("{}", serde_json::to_string_pretty(&instance)?);
        }
    }

    Ok(())
}
