//! Community subscription coordinator daemon

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use daosub::database::OrderMemoryDatabase;
use daosub::{CompletionReporter, CoordinatorBuilder};
use daosub_common::database::{DynDirectory, DynDirectoryWriter, DynOrderDatabase};
use daosub_common::notify::DynUserNotifier;
use daosub_common::payment::DynPaymentInitiator;
#[cfg(feature = "fake-processor")]
use daosub_fake_processor::{AutoSettle, FakePaymentProcessor};
#[cfg(feature = "fake-processor")]
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::cli::CLIArgs;
use crate::config::{DatabaseEngine, LoggingConfig, LoggingOutput, PaymentBackend, Settings};
use crate::router::{create_router, RouterState};

pub mod cli;
pub mod config;
pub mod env_vars;
pub mod gateway;
pub mod point;
pub mod router;
pub mod router_handlers;

/// Default work directory under the home directory
const DEFAULT_WORK_DIR: &str = ".daosubd";

fn expand_path(path: &Path) -> Option<PathBuf> {
    match path.strip_prefix("~") {
        Ok(remainder) => home::home_dir().map(|home_dir| home_dir.join(remainder)),
        Err(_) => Some(path.to_path_buf()),
    }
}

/// Resolve and create the work directory
pub fn get_work_directory(args: &CLIArgs) -> Result<PathBuf> {
    let work_dir = match &args.work_dir {
        Some(work_dir) => {
            expand_path(work_dir).ok_or(anyhow!("Could not expand work directory"))?
        }
        None => home::home_dir()
            .ok_or(anyhow!("Unknown home dir"))?
            .join(DEFAULT_WORK_DIR),
    };

    std::fs::create_dir_all(&work_dir)?;

    Ok(work_dir)
}

/// Load the config file and apply environment overrides
pub fn load_settings(work_dir: &Path, config_path: Option<PathBuf>) -> Result<Settings> {
    let config_path = match config_path {
        Some(path) => expand_path(&path).ok_or(anyhow!("Could not expand config path"))?,
        None => work_dir.join("config.toml"),
    };

    let settings = Settings::new(Some(config_path)).from_env()?;

    settings.validate().map_err(|err| anyhow!(err))?;

    Ok(settings)
}

fn env_filter(level: &str) -> EnvFilter {
    let hyper_filter = "hyper=warn,h2=warn";
    let http_filter = "tower_http=info,reqwest=warn";

    EnvFilter::new(format!("{level},{hyper_filter},{http_filter}"))
}

/// Install the tracing subscriber
///
/// The returned guard flushes the log file and must be kept alive for as long as the
/// daemon runs.
pub fn setup_tracing(work_dir: &Path, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console_layer = matches!(logging.output, LoggingOutput::Stderr | LoggingOutput::Both)
        .then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter(&logging.console_level))
        });

    let (file_layer, guard) = match logging.output {
        LoggingOutput::File | LoggingOutput::Both => {
            let appender = tracing_appender::rolling::daily(work_dir.join("logs"), "daosubd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter(&logging.file_level));
            (Some(layer), Some(guard))
        }
        LoggingOutput::Stderr => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn setup_store(
    work_dir: &Path,
    settings: &Settings,
) -> Result<(DynOrderDatabase, DynDirectory, DynDirectoryWriter)> {
    match settings.database.engine {
        DatabaseEngine::Memory => {
            tracing::warn!("Using the memory store, orders are lost on restart");
            let store = Arc::new(OrderMemoryDatabase::default());
            let localstore: DynOrderDatabase = store.clone();
            let directory: DynDirectory = store.clone();
            let writer: DynDirectoryWriter = store;
            Ok((localstore, directory, writer))
        }
        #[cfg(feature = "redb")]
        DatabaseEngine::Redb => {
            let path = work_dir.join("daosub.redb");
            let store = Arc::new(daosub_redb::OrderRedbDatabase::new(&path)?);
            let localstore: DynOrderDatabase = store.clone();
            let directory: DynDirectory = store.clone();
            let writer: DynDirectoryWriter = store;
            Ok((localstore, directory, writer))
        }
        #[cfg(not(feature = "redb"))]
        DatabaseEngine::Redb => {
            let _ = work_dir;
            Err(anyhow!("daosubd was built without the redb feature"))
        }
    }
}

/// Payment backend plus the fake processor when it is the one in use
struct PaymentSetup {
    initiator: DynPaymentInitiator,
    #[cfg(feature = "fake-processor")]
    fake: Option<Arc<FakePaymentProcessor>>,
}

fn setup_payment(settings: &Settings) -> Result<PaymentSetup> {
    match settings.payment.backend {
        PaymentBackend::Point => {
            let point_config = settings
                .payment
                .point
                .clone()
                .ok_or(anyhow!("Point backend requires a valid config"))?;
            let client = point::PointClient::new(&point_config.api_url, point_config.app_key)?;

            Ok(PaymentSetup {
                initiator: Arc::new(client),
                #[cfg(feature = "fake-processor")]
                fake: None,
            })
        }
        #[cfg(feature = "fake-processor")]
        PaymentBackend::Fake => {
            let fake_config = settings.payment.fake_processor.clone().unwrap_or_default();
            let auto_settle = fake_config.settle_status.map(|status| AutoSettle {
                delay: std::time::Duration::from_secs(fake_config.settle_delay),
                status,
            });
            let processor = Arc::new(FakePaymentProcessor::new(
                std::time::Duration::ZERO,
                auto_settle,
            ));

            Ok(PaymentSetup {
                initiator: processor.clone(),
                fake: Some(processor),
            })
        }
        #[cfg(not(feature = "fake-processor"))]
        PaymentBackend::Fake => Err(anyhow!(
            "daosubd was built without the fake-processor feature"
        )),
    }
}

fn setup_notifier(settings: &Settings) -> Result<DynUserNotifier> {
    let notifier: DynUserNotifier = match &settings.notify.gateway_url {
        Some(gateway_url) => Arc::new(gateway::GatewayNotifier::new(gateway_url)?),
        None => {
            tracing::info!("No push gateway configured, notifications are only logged");
            Arc::new(gateway::LogNotifier)
        }
    };

    Ok(notifier)
}

/// Feed fake settlements into the reporter, standing in for the processor callback
#[cfg(feature = "fake-processor")]
async fn drain_settlements(
    processor: Arc<FakePaymentProcessor>,
    reporter: CompletionReporter,
    shutdown: CancellationToken,
) {
    let mut settlements = match processor.wait_settlements().await {
        Ok(settlements) => settlements,
        Err(err) => {
            tracing::error!("Could not take fake settlement stream: {}", err);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                processor.cancel_settlements();
                break;
            }
            settlement = settlements.next() => {
                let Some(settlement) = settlement else {
                    break;
                };

                if let Err(err) = reporter
                    .report_completion(&settlement.order_id, &settlement.tx_id, settlement.status)
                    .await
                {
                    tracing::error!(
                        "Could not report fake settlement of {}: {}",
                        settlement.order_id,
                        err
                    );
                }
            }
        }
    }

    tracing::debug!("Fake settlement stream stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Could not listen for shutdown signal: {}", err);
    }
    tracing::info!("Shutdown signal received");
}

/// Run the daemon until it receives a shutdown signal
pub async fn run_daosubd(work_dir: &Path, settings: &Settings) -> Result<()> {
    let (localstore, directory, writer) = setup_store(work_dir, settings)?;
    let payment = setup_payment(settings)?;
    let notifier = setup_notifier(settings)?;

    let coordinator = CoordinatorBuilder::new()
        .with_localstore(localstore)
        .with_directory(directory)
        .with_payment_initiator(payment.initiator)
        .with_notifier(notifier)
        .with_settings(settings.coordinator_settings())
        .build()?;

    coordinator.check_pending_orders().await?;

    let shutdown = CancellationToken::new();
    let reporter = coordinator.completion_reporter();
    let tasks = TaskTracker::new();

    #[cfg(feature = "fake-processor")]
    if let Some(fake) = payment.fake {
        tasks.spawn(drain_settlements(fake, reporter.clone(), shutdown.clone()));
    }

    let router = create_router(RouterState {
        coordinator: coordinator.clone(),
        reporter,
        directory: writer,
        subscribe_timeout: settings.subscribe_timeout(),
        shutdown: shutdown.clone(),
    });

    let addr = format!("{}:{}", settings.info.listen_host, settings.info.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("daosubd listening on {}", addr);

    let signal_token = shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Releases subscribe requests still waiting on a completion
            signal_token.cancel();
        })
        .await;

    shutdown.cancel();
    tasks.close();
    tasks.wait().await;
    coordinator.shutdown().await;

    served?;

    Ok(())
}
