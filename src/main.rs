// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use appconfig_operator::{
    cluster::KubeCluster,
    constants::{
        CLEANUP_MAX_RETRY_DELAY_MILLIS, DEFAULT_INITIAL_RETRY_DELAY_MILLIS, DEFAULT_MAX_RETRIES,
        DEFAULT_MAX_RETRY_DELAY_MILLIS, DEFAULT_METRICS_PORT, ERROR_POLICY_REQUEUE_SECS,
        KIND_APP_CONFIG, TOKIO_WORKER_THREADS,
    },
    context::{Context, OperatorSettings},
    crd::AppConfig,
    errors::ReconcileError as AppConfigError,
    injection::{run_pod_watcher, InjectionRegistry},
    metrics,
    reconcilers::{apply_outcome, reconcile_appconfig, record_error_condition, retry::RetryPolicy},
    server::{start_server, ServerState},
    source::GitSourceFetcher,
};
use clap::Parser;
use futures::StreamExt;
use kube::{
    runtime::{
        controller::Action,
        predicates, reflector,
        watcher::{self, watcher},
        Controller, WatchStreamExt,
    },
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// AppConfig bootstrap operator
#[derive(Parser, Debug)]
#[command(name = "appconfig-operator", version, about)]
struct Cli {
    /// Port for the /metrics, /healthz and /readyz endpoints
    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Retries after the first attempt for API calls and deletes
    #[arg(long, env = "APPCONFIG_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[arg(
        long,
        env = "APPCONFIG_INITIAL_RETRY_DELAY_MS",
        default_value_t = DEFAULT_INITIAL_RETRY_DELAY_MILLIS
    )]
    initial_retry_delay_ms: u64,

    /// Upper bound of a single retry delay during reconciliation, in milliseconds
    #[arg(
        long,
        env = "APPCONFIG_MAX_RETRY_DELAY_MS",
        default_value_t = DEFAULT_MAX_RETRY_DELAY_MILLIS
    )]
    max_retry_delay_ms: u64,

    /// Upper bound of a single retry delay during finalization, in milliseconds
    #[arg(
        long,
        env = "APPCONFIG_CLEANUP_MAX_RETRY_DELAY_MS",
        default_value_t = CLEANUP_MAX_RETRY_DELAY_MILLIS
    )]
    cleanup_max_retry_delay_ms: u64,

    /// Do not watch pods or inject sidecars
    #[arg(long, env = "APPCONFIG_DISABLE_INJECTION")]
    disable_injection: bool,
}

impl Cli {
    fn settings(&self) -> OperatorSettings {
        let initial = Duration::from_millis(self.initial_retry_delay_ms);
        OperatorSettings {
            api_retry: RetryPolicy::new(
                self.max_retries,
                initial,
                Duration::from_millis(self.max_retry_delay_ms),
            ),
            cleanup_retry: RetryPolicy::new(
                self.max_retries,
                initial,
                Duration::from_millis(self.cleanup_max_retry_delay_ms),
            ),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("appconfig-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_logging() {
    // Respects RUST_LOG, defaulting to INFO.
    // RUST_LOG_FORMAT=json switches to JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();

    info!("Starting AppConfig operator");
    debug!(?cli, "Parsed command line");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let cluster = KubeCluster::new(client);
    let ctx = Arc::new(Context::new(
        cluster.clone(),
        GitSourceFetcher::new(),
        cli.settings(),
    ));
    let registry = ctx.registry.clone();
    let server_state = Arc::new(ServerState::new());

    info!(
        metrics_port = cli.metrics_port,
        injection = !cli.disable_injection,
        "Starting controller"
    );
    server_state.mark_ready();

    // The controller stops on SIGINT/SIGTERM; the other tasks only end on failure.
    tokio::select! {
        result = run_appconfig_controller(ctx) => {
            result?;
            info!("AppConfig controller shut down");
            Ok(())
        }
        result = start_server(cli.metrics_port, server_state) => {
            error!("CRITICAL: HTTP server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("HTTP server exited unexpectedly without error")
        }
        () = run_injection(cluster, registry, cli.disable_injection) => {
            anyhow::bail!("Pod watcher exited unexpectedly")
        }
    }
}

async fn run_injection(cluster: KubeCluster, registry: InjectionRegistry, disabled: bool) {
    if disabled {
        info!("Sidecar injection disabled");
        std::future::pending::<()>().await;
    }
    run_pod_watcher(cluster, registry).await;
}

/// Run the `AppConfig` controller
///
/// Only spec changes (generation bumps) trigger a reconcile from the watch stream,
/// so the status written by every pass does not feed back into the loop. Requeues
/// still read the latest object from the reflector store.
async fn run_appconfig_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting AppConfig controller");

    let api = Api::<AppConfig>::all(ctx.cluster.client().clone());
    let (reader, writer) = reflector::store();
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(predicates::generation, Default::default());

    Controller::for_stream(stream, reader)
        .shutdown_on_signal()
        .run(reconcile_appconfig_wrapper, error_policy, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!(error = %e, "Controller event");
            }
            futures::future::ready(())
        })
        .await;

    Ok(())
}

/// Reconcile wrapper for `AppConfig`
async fn reconcile_appconfig_wrapper(
    app: Arc<AppConfig>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    debug!(
        name = %app.name_any(),
        namespace = ?app.namespace(),
        "Reconcile wrapper called for AppConfig"
    );

    let outcome = reconcile_appconfig(&ctx, (*app).clone()).await;
    let label = outcome.label();

    match apply_outcome(&ctx, outcome).await {
        Ok(action) => {
            info!(
                "Successfully reconciled AppConfig: {} ({label})",
                app.registry_key()
            );
            metrics::record_reconciliation_success(KIND_APP_CONFIG, start.elapsed());
            Ok(action)
        }
        Err(e) => {
            error!("Failed to persist AppConfig {}: {}", app.registry_key(), e);
            metrics::record_reconciliation_error(KIND_APP_CONFIG, start.elapsed());
            Err(anyhow::Error::from(AppConfigError::from(e)).into())
        }
    }
}

/// Error policy for the `AppConfig` controller
///
/// Records the failure as a condition in the background and retries later.
fn error_policy(app: Arc<AppConfig>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    let message = err.to_string();
    tokio::spawn(async move {
        if let Err(e) = record_error_condition(&ctx, &app, &message).await {
            warn!(
                resource = %app.registry_key(),
                error = %e,
                "Failed to record error condition"
            );
        }
    });
    metrics::record_reconciliation_requeue(KIND_APP_CONFIG, "error");
    Action::requeue(Duration::from_secs(ERROR_POLICY_REQUEUE_SECS))
}
