mod app;
mod connection;
mod intent;
mod screens;
mod session;
mod theme;
mod ui;
mod widgets;

use clap::{Parser, Subcommand};
use queue_proto::config::Config;
use queue_proto::ticket::{ServiceType, TicketId};
use tokio::sync::mpsc;

use crate::app::{App, Screen};
use crate::connection::DaemonLink;
use crate::screens::{KioskScreen, StatusScreen, TvScreen};
use crate::session::{CounterSession, ServiceBinding};

#[derive(Parser, Debug)]
#[command(name = "queue-tui", about = "Terminal front ends for the queue daemon")]
struct Cli {
    /// Daemon address (host:port).  Defaults to the configured socket.
    #[arg(long, global = true)]
    address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operator panel for one counter.
    Counter {
        number: u32,
        /// Serve this service instead of the counter's configured one.
        #[arg(long)]
        service: Option<ServiceType>,
    },
    /// Waiting-room board with call announcements.
    Tv,
    /// Self-service ticket kiosk.
    Kiosk,
    /// Follow one ticket.
    Status { ticket_id: TicketId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = queue_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("tui.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,queue_tui=debug".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // The terminal is about to be taken over; say where the log goes.
    eprintln!("queue-tui log: {}", log_path.display());

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Using default config: {}", e);
        Config::default()
    });
    let address = cli.address.unwrap_or_else(|| config.socket_address());

    let screen = match cli.command {
        Commands::Counter { number, service } => {
            let default_service = match config.service_for(number) {
                Some(s) => s,
                None => service.ok_or_else(|| {
                    anyhow::anyhow!("counter {} is not configured; pass --service", number)
                })?,
            };
            let binding = match service {
                Some(s) => ServiceBinding::Manual(s),
                None => ServiceBinding::Auto(default_service),
            };
            Screen::Counter {
                session: CounterSession::new(number, binding, config.queue.waiting_list_len),
                default_service,
            }
        }
        Commands::Tv => Screen::Tv(TvScreen::new(
            config.counters.clone(),
            config.display.history_len,
            config.display.cycle(),
            config.display.announcement_template.clone(),
        )),
        Commands::Kiosk => Screen::Kiosk(KioskScreen::new(config.printer.public_base_url.clone())),
        Commands::Status { ticket_id } => Screen::Status(StatusScreen::new(ticket_id)),
    };

    tracing::info!("queue-tui starting, daemon at {}", address);
    let (link_tx, link_rx) = mpsc::channel(256);
    let (link, _link_task) = DaemonLink::spawn(address, screen.initial_filter(), link_tx);

    App::new(screen, link).run(link_rx).await
}
