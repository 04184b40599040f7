use queue_daemon::coordinator::{Coordinator, CoordinatorSettings};
use queue_daemon::notifier::ChangeNotifier;
use queue_daemon::printer::{ReceiptPrinter, SpoolPrinter};
use queue_daemon::store::MemoryStore;
use queue_daemon::{http, logging, socket};
use queue_proto::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How often closed tickets of earlier days are moved to the archive.
const ARCHIVE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Notifier first so logging can forward warnings to viewers.
    let notifier = ChangeNotifier::default();

    let log_path = logging::init(&queue_proto::platform::data_dir(), notifier.sender())?;
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let store = MemoryStore::open(&config.daemon.snapshot_file)?;
    info!("Ticket snapshot: {:?}", config.daemon.snapshot_file);

    let printer: Option<Arc<dyn ReceiptPrinter>> = if config.printer.enabled {
        info!("Receipts spool to {:?}", config.printer.spool_dir);
        Some(Arc::new(SpoolPrinter::new(
            config.printer.spool_dir.clone(),
            config.printer.header.clone(),
        )))
    } else {
        None
    };

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(store),
        notifier,
        printer,
        CoordinatorSettings::from_config(&config),
    ));

    // First tick fires immediately, so a restart after midnight starts lean.
    let archiver = coordinator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ARCHIVE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match archiver.archive_closed_days().await {
                Ok(0) => {}
                Ok(n) => info!("Moved {} closed tickets to the archive", n),
                Err(e) => warn!("Archiving failed: {}", e),
            }
        }
    });

    let _socket_handle = socket::start_server(
        config.socket.bind_address.clone(),
        config.socket.port,
        coordinator.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            coordinator.clone(),
        );
    } else {
        warn!("HTTP API disabled; kiosk and status pages will not be reachable");
    }

    info!("Daemon initialised");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
