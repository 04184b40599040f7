use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;
use crate::display::DEFAULT_ANNOUNCEMENT_TEMPLATE;
use crate::ticket::ServiceType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default = "default_counters")]
    pub counters: Vec<CounterConfig>,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub printer: PrinterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// JSON snapshot of the ticket store, rewritten after every mutation.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_socket_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on any single storage call.
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,
    /// How many times `call_next` re-reads after losing a claim race.
    #[serde(default = "default_call_next_attempts")]
    pub call_next_attempts: u32,
    /// Length of the waiting list a counter panel shows.
    #[serde(default = "default_waiting_list_len")]
    pub waiting_list_len: usize,
}

/// Default service of one physical counter.  A counter panel may override it
/// in manual mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    pub number: u32,
    pub service: ServiceType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Seconds between grid and split layouts on the TV board.
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// `{code}`, `{number}` and `{counter}` are substituted.
    #[serde(default = "default_announcement_template")]
    pub announcement_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    #[serde(default = "default_printer_enabled")]
    pub enabled: bool,
    /// First line of every receipt.
    #[serde(default = "default_receipt_header")]
    pub header: String,
    /// Directory the receipt printer picks print jobs up from.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    /// Base of the live-status URL encoded in the receipt QR code.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl QueueConfig {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

impl DisplayConfig {
    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_socket_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: default_storage_timeout_ms(),
            call_next_attempts: default_call_next_attempts(),
            waiting_list_len: default_waiting_list_len(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cycle_secs: default_cycle_secs(),
            history_len: default_history_len(),
            announcement_template: default_announcement_template(),
        }
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            enabled: default_printer_enabled(),
            header: default_receipt_header(),
            spool_dir: default_spool_dir(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_snapshot_file() -> PathBuf {
    platform::data_dir().join("tickets.json")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_socket_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_port() -> u16 {
    8989
}

fn default_storage_timeout_ms() -> u64 {
    3000
}

fn default_call_next_attempts() -> u32 {
    5
}

fn default_waiting_list_len() -> usize {
    10
}

fn default_counters() -> Vec<CounterConfig> {
    vec![
        CounterConfig { number: 1, service: ServiceType::Tka },
        CounterConfig { number: 2, service: ServiceType::Ak1 },
        CounterConfig { number: 3, service: ServiceType::Jkp },
        CounterConfig { number: 4, service: ServiceType::Mediasi },
    ]
}

fn default_cycle_secs() -> u64 {
    43
}

fn default_history_len() -> usize {
    5
}

fn default_announcement_template() -> String {
    DEFAULT_ANNOUNCEMENT_TEMPLATE.to_string()
}

fn default_printer_enabled() -> bool {
    true
}

fn default_receipt_header() -> String {
    "DISNAKER KOTA BANDUNG".to_string()
}

fn default_spool_dir() -> PathBuf {
    platform::data_dir().join("print-spool")
}

fn default_public_base_url() -> String {
    format!("http://{}:{}", default_bind_address(), default_http_port())
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for c in &self.counters {
            if c.number == 0 {
                anyhow::bail!("counter numbers start at 1");
            }
            if !seen.insert(c.number) {
                anyhow::bail!("counter {} configured twice", c.number);
            }
        }
        Ok(())
    }

    /// Default service of `counter`, if it is configured.
    pub fn service_for(&self, counter: u32) -> Option<ServiceType> {
        self.counters
            .iter()
            .find(|c| c.number == counter)
            .map(|c| c.service)
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.socket.bind_address, self.socket.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            socket: SocketConfig::default(),
            http: HttpConfig::default(),
            queue: QueueConfig::default(),
            counters: default_counters(),
            display: DisplayConfig::default(),
            printer: PrinterConfig::default(),
        }
    }
}
