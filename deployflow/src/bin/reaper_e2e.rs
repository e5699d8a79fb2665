//! Deploys Reaper with a Cassandra backend and checks it can reach the cluster.
//!
//! Exits 0 on success, 1 if a stage failed and 2 if every stage succeeded but
//! registering the cluster with Reaper did not.

use anyhow::Context;
use clap::Parser;
use deployflow::cancellation::CancellationToken;
use deployflow::config::HarnessConfig;
use deployflow::context::RunContext;
use deployflow::events::{EventSink, LoggingEventSink};
use deployflow::observability::{init_logging, LogFormat};
use deployflow::scenario::ReaperScenario;
use deployflow::store::{ClusterStore, KustomizeApplier, ObjectStore};
use deployflow::verify::ReaperApiClient;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "reaper-e2e", about = "Deploy Reaper with a Cassandra backend and verify it")]
struct Cli {
    /// JSON config file. Defaults apply to anything it leaves out.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Namespace to deploy into.
    #[arg(long)]
    namespace: Option<String>,
    /// Directory holding the kustomize manifest sets.
    #[arg(long)]
    manifests_dir: Option<PathBuf>,
    /// Reaper REST API base URL. Verification is skipped without one.
    #[arg(long)]
    reaper_url: Option<String>,
    /// Cap on the whole run, in seconds.
    #[arg(long)]
    deadline_seconds: Option<u64>,
    /// `text` or `json`.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(namespace) = &self.namespace {
            config.namespace.clone_from(namespace);
        }
        if let Some(dir) = &self.manifests_dir {
            config.manifests_dir.clone_from(dir);
        }
        if let Some(url) = &self.reaper_url {
            config.reaper_url = Some(url.clone());
        }
        if let Some(deadline) = self.deadline_seconds {
            config.deadline_seconds = Some(deadline);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let mut config = HarnessConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let mut kustomize = KustomizeApplier::new(config.manifests_dir.clone()).with_binary(config.kubectl.clone());
    if let Some(context) = &config.kube_context {
        kustomize = kustomize.with_context(context.clone());
    }
    let store = ClusterStore::connect(config.kube_context.as_deref(), kustomize)
        .await
        .context("failed to connect to the cluster")?;
    let store: Arc<dyn ObjectStore> = Arc::new(store);

    let token = Arc::new(CancellationToken::new());
    let mut ctx = RunContext::new(config.namespace.clone())
        .with_naming(config.naming.clone())
        .with_cancellation(token.clone());
    if let Some(deadline) = config.deadline() {
        ctx = ctx.with_deadline(deadline);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            token.cancel("interrupted by user");
        }
    });

    info!(run_id = %ctx.run_id(), namespace = %ctx.namespace(), "Deploying Reaper");

    let scenario = ReaperScenario::from_config(store, &config);
    let sink: Arc<dyn EventSink> = Arc::new(LoggingEventSink::debug());
    let outcome = match &config.reaper_url {
        Some(url) => {
            let client = ReaperApiClient::new(url).context("failed to build Reaper API client")?;
            scenario.run_and_verify(&ctx, sink, &client).await?
        }
        None => {
            warn!("No Reaper URL configured, skipping verification");
            scenario.run(&ctx, sink).await?
        }
    };

    println!("{}", outcome.report.summary());
    if let Some(Err(error)) = &outcome.verification {
        eprintln!("verification failed: {error}");
    }

    Ok(ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1)))
}
