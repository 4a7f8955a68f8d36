mod logging;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dbconsole_adapters::{
    spawn_log_delivery, DeliveryLimits, FileResultExporter, HttpConnectorClient,
};
use dbconsole_core::bootstrap::ApplicationContext;
use dbconsole_core::config::{default_config_dir, AppConfig};
use dbconsole_core::log_store::{LogForwarder, LogStoreMode};
use dbconsole_core::query_runner::ResultExporter;
use dbconsole_tui::TuiError;
use tracing::{info, warn};

const LOG_DELIVERY_GRACE: Duration = Duration::from_secs(2);

fn run_app(
    run_tui: impl FnOnce() -> Result<(), TuiError>,
    shutdown: impl FnOnce(),
) -> Result<(), Box<dyn Error>> {
    let result = run_tui();
    shutdown();
    result?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load_default()?;
    let config_dir = default_config_dir()?;
    let _log_guard = match logging::init_logging(
        &logging::log_dir(&config_dir),
        config.logging.filter.as_deref(),
    ) {
        Ok(guard) => Some(guard),
        Err(error) => {
            eprintln!("warning: file logging disabled: {error}");
            None
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let api = Arc::new(HttpConnectorClient::new(&config.api)?);

    let (forwarder, delivery) = if config.logging.mode == LogStoreMode::Forwarding {
        let (forwarder, delivery) = spawn_log_delivery(
            api.clone(),
            DeliveryLimits::new(config.logging.failed_queue_capacity),
            runtime.handle(),
        );
        (
            Some(Arc::new(forwarder) as Arc<dyn LogForwarder>),
            Some(delivery),
        )
    } else {
        (None, None)
    };

    let export_dir = config
        .ui
        .export_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("exports"));
    let exporter: Arc<dyn ResultExporter> = Arc::new(FileResultExporter::new(export_dir));

    info!(base_url = api.base_url(), "starting dbconsole");
    let context = ApplicationContext::initialize(config, api, forwarder, Some(exporter));
    let starter = context.clone();
    runtime.spawn(async move {
        if let Err(error) = starter.start().await {
            warn!(%error, "startup skipped");
        }
    });

    let handle = runtime.handle().clone();
    run_app(
        || dbconsole_tui::run(context, handle),
        || {
            if let Some(delivery) = delivery {
                match runtime.block_on(delivery.close(LOG_DELIVERY_GRACE)) {
                    Some(0) => {}
                    Some(still_failed) => {
                        warn!(still_failed, "log entries could not be delivered");
                    }
                    None => warn!("log delivery still pending at exit; remaining entries dropped"),
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;

    use super::run_app;

    #[test]
    fn run_app_returns_ok_when_tui_runner_succeeds() {
        let result = run_app(|| Ok(()), || {});
        assert!(result.is_ok());
    }

    #[test]
    fn shutdown_runs_even_when_the_tui_fails() {
        let flushed = Cell::new(false);
        let result = run_app(
            || Err(dbconsole_tui::TuiError::Io(io::Error::other("boom"))),
            || flushed.set(true),
        );
        assert!(result.is_err());
        assert!(flushed.get());
    }
}
