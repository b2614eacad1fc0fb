//! owmqtt - 1-Wire to MQTT bridge
//!
//! Usage:
//!   owmqtt [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   --owfs <ADDR>          owserver address (default: localhost:4304)
//!   --host <HOST>          Broker host (default: localhost)
//!   -p, --port <PORT>      Broker port (default: 1883)
//!   --prefix <PREFIX>      Topic prefix (default: /1wire)
//!   -i, --interval <SECS>  Polling interval in seconds (default: 10)
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use owmqtt::config::Config;
use owmqtt::filter::IgnoreList;
use owmqtt::namespace::owserver::OwserverClient;
use owmqtt::publish::Publisher;
use owmqtt::scan::Scanner;
use owmqtt::session::{qos_from_level, Session};
use owmqtt::topic::TopicMapper;
use owmqtt::{Bridge, ShutdownFlag};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// owmqtt - 1-Wire to MQTT bridge
#[derive(Parser, Debug)]
#[command(name = "owmqtt")]
#[command(author = "owmqtt Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Republishes owserver namespace values to an MQTT broker")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// owserver address (host:port)
    #[arg(long)]
    owfs: Option<String>,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(short, long)]
    port: Option<u16>,

    /// Topic prefix prepended to every namespace path
    #[arg(long)]
    prefix: Option<String>,

    /// Polling interval in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// QoS level for published values (0, 1, or 2)
    #[arg(long)]
    qos: Option<u8>,

    /// Publish with the retain flag set
    #[arg(long)]
    retain: Option<bool>,

    /// Client ID presented to the broker
    #[arg(long)]
    client_id: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise use defaults
    let mut cfg = if let Some(config_path) = &args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error loading config file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::from_env() {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error reading configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Setup logging - CLI overrides config, config overrides default (info)
    let log_level = args.log_level.unwrap_or_else(|| {
        match cfg.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    // CLI args override file config
    if let Some(owfs) = args.owfs {
        cfg.owfs.address = owfs;
    }
    if let Some(host) = args.host {
        cfg.mqtt.host = host;
    }
    if let Some(port) = args.port {
        cfg.mqtt.port = port;
    }
    if let Some(prefix) = args.prefix {
        cfg.mqtt.topic_prefix = prefix;
    }
    if let Some(interval) = args.interval {
        cfg.scan.interval = interval;
    }
    if let Some(qos) = args.qos {
        cfg.mqtt.qos = qos;
    }
    if let Some(retain) = args.retain {
        cfg.mqtt.retain = retain;
    }
    if let Some(client_id) = args.client_id {
        cfg.mqtt.client_id = client_id;
    }

    if let Err(e) = cfg.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let qos = match qos_from_level(cfg.mqtt.qos) {
        Some(qos) => qos,
        None => {
            eprintln!("Invalid qos value: {}. Must be 0, 1, or 2.", cfg.mqtt.qos);
            std::process::exit(1);
        }
    };

    let filter = match IgnoreList::compile(&cfg.scan.ignore) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Invalid ignore list: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting owmqtt 1-Wire to MQTT bridge");
    info!("  owserver: {}", cfg.owfs.address);
    info!("  Broker: {}:{}", cfg.mqtt.host, cfg.mqtt.port);
    info!("  Client ID: {}", cfg.mqtt.client_id);
    info!("  Topic prefix: {}", cfg.mqtt.topic_prefix);
    info!("  QoS: {:?}, retain: {}", qos, cfg.mqtt.retain);
    info!("  Scan root: {}", cfg.scan.root);
    info!("  Scan interval: {}s", cfg.scan.interval);
    info!("  Ignore patterns: {}", filter.len());

    let namespace = OwserverClient::new(&cfg.owfs);
    let (session, sink) = Session::open(&cfg.mqtt);
    let mapper = TopicMapper::new(&cfg.mqtt.topic_prefix);
    let publisher = Publisher::new(sink, mapper, qos, cfg.mqtt.retain);
    let scanner = Scanner::new(namespace, filter, publisher);
    let mut bridge = Bridge::new(session, scanner, &cfg.scan, &cfg.mqtt);

    let shutdown = ShutdownFlag::install()?;

    match bridge.run(&shutdown).await {
        Ok(0) => Ok(()),
        Ok(faults) => {
            error!("Exiting with {} fault(s)", faults);
            std::process::exit(faults.min(255) as i32);
        }
        Err(e) => {
            error!("Failed to establish broker session: {}", e);
            std::process::exit(1);
        }
    }
}
