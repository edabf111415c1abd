//! Hana Early Warning CLI
//!
//! Runs wearable sample streams through the early-warning pipeline.

use clap::{Parser, Subcommand};
use hana_early_warning::{
    config::Config,
    core::decode_frame,
    device::{DeviceLink, FrameSender, SessionId, DEFAULT_LINK_CAPACITY},
    hub::SessionHub,
    journal::{create_shared_journal_with_persistence, FanoutSink, Journal, NdjsonSink},
    EventSink, WarningEngine, WarningEvent, WarningLevel, VERSION,
};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "hana-warn")]
#[command(author = "Hana")]
#[command(version = VERSION)]
#[command(about = "Early-warning classification of wearable biometric streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run NDJSON device frames through the pipeline
    Run {
        /// Input file of frames, one JSON object per line (stdin if omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Session for lines that carry a bare sample
        #[arg(long)]
        session: Option<String>,

        /// Write every warning event as NDJSON to this file
        #[arg(long)]
        events: Option<PathBuf>,

        /// Per-session queue capacity (overrides config)
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Forward events to the configured gateway (requires gateway feature)
        #[arg(long)]
        gateway: bool,
    },

    /// Validate the configuration
    Check,

    /// List the registered detection rules
    Rules,

    /// Show cumulative journal statistics
    Status,

    /// Show configuration
    Config,

    /// Serve the HTTP ingest API (requires server feature)
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind to (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            session,
            events,
            queue_capacity,
            gateway,
        } => {
            cmd_run(input, session, events, queue_capacity, gateway);
        }
        Commands::Check => {
            cmd_check();
        }
        Commands::Rules => {
            cmd_rules();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
    }
}

/// Load the configuration, exiting if it is unreadable or invalid.
fn load_valid_config() -> Config {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Config file: {:?}", Config::config_path());
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        eprintln!("Refusing to start with an invalid threshold table.");
        std::process::exit(1);
    }
    config
}

fn cmd_run(
    input: Option<PathBuf>,
    session: Option<String>,
    events_path: Option<PathBuf>,
    queue_capacity: Option<usize>,
    enable_gateway: bool,
) {
    println!("Hana Early Warning v{VERSION}");
    println!();

    let config = load_valid_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let engine = match WarningEngine::new(config.engine.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let fallback_session = session
        .or_else(|| config.default_session.clone())
        .map(SessionId::new)
        .unwrap_or_else(default_session_id);

    println!("Starting pipeline...");
    println!(
        "  Input: {}",
        input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string())
    );
    println!("  Default session: {fallback_session}");
    println!(
        "  Window: {}s / {} samples",
        config.engine.window.retention_secs, config.engine.window.max_samples
    );
    println!("  Rules: {}", engine.detector().rules().count());

    // Set up sinks
    let journal = create_shared_journal_with_persistence(config.journal_path());
    let mut sink = FanoutSink::new()
        .with(journal.clone())
        .with(Arc::new(ConsoleSink));

    if let Some(path) = events_path {
        match std::fs::File::create(&path) {
            Ok(file) => {
                println!("  Events: {}", path.display());
                sink.push(Arc::new(NdjsonSink::new(file)));
            }
            Err(e) => {
                eprintln!("Error: Could not create events file {path:?}: {e}");
                std::process::exit(1);
            }
        }
    }

    #[cfg(feature = "gateway")]
    let gateway_handle = if enable_gateway {
        match config.gateway.clone() {
            Some(gateway_config) => {
                match hana_early_warning::GatewaySink::spawn(gateway_config.clone()) {
                    Ok((gateway_sink, handle)) => {
                        println!("  Gateway: {}", gateway_config.events_url());
                        sink.push(Arc::new(gateway_sink));
                        Some(handle)
                    }
                    Err(e) => {
                        eprintln!("Warning: Gateway initialization failed: {e}");
                        eprintln!("Continuing without gateway forwarding.");
                        None
                    }
                }
            }
            None => {
                eprintln!("Warning: --gateway given but no gateway is configured");
                None
            }
        }
    } else {
        println!("  Gateway: disabled");
        None
    };

    #[cfg(not(feature = "gateway"))]
    if enable_gateway {
        eprintln!("Warning: --gateway flag ignored (gateway feature not enabled at compile time)");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    // Device link and reader
    let link = DeviceLink::new(DEFAULT_LINK_CAPACITY);
    if let Err(e) = link.connect() {
        eprintln!("Error connecting device link: {e}");
        std::process::exit(1);
    }

    let reader: Box<dyn Read + Send> = match input {
        Some(path) => match std::fs::File::open(&path) {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("Error: Could not open {path:?}: {e}");
                std::process::exit(1);
            }
        },
        None => Box::new(std::io::stdin()),
    };
    spawn_reader(reader, link.sender(), fallback_session, running.clone());

    let mut hub = SessionHub::new(
        engine,
        Arc::new(sink),
        queue_capacity.unwrap_or(config.queue_capacity),
    );

    // Main loop
    let receiver = link.receiver().clone();
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                if let Err(e) = hub.submit(frame) {
                    eprintln!("Warning: {e}");
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if link.is_exhausted() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Device link disconnected unexpectedly");
                break;
            }
        }
    }

    println!();
    println!("Stopping pipeline...");
    link.disconnect();

    let summaries = hub.shutdown();
    for summary in &summaries {
        println!(
            "  {}: {} accepted, {} rejected, final level {}",
            summary.session_id,
            summary.samples_accepted,
            summary.samples_rejected,
            summary.final_level
        );
    }

    // Dropping the hub released every sink handle, so the forwarder flushes and exits.
    #[cfg(feature = "gateway")]
    if let Some(handle) = gateway_handle {
        if handle.join().is_err() {
            eprintln!("Warning: Gateway forwarder stopped abnormally");
        }
    }

    if let Err(e) = journal.save() {
        eprintln!("Warning: Could not save journal: {e}");
    }

    // Final stats
    println!();
    println!("{}", journal.summary());
}

/// Read NDJSON lines on a background thread and deliver them as frames.
fn spawn_reader(
    reader: Box<dyn Read + Send>,
    sender: FrameSender,
    fallback_session: SessionId,
    running: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let reader = BufReader::new(reader);
        for (index, line) in reader.lines().enumerate() {
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read input");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match decode_frame(&line, Some(&fallback_session)) {
                Ok(frame) => {
                    if let Err(e) = sender.deliver_blocking(frame) {
                        tracing::warn!(error = %e, "device link closed");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "skipping malformed input line");
                }
            }
        }
        sender.disconnect();
    });
}

/// Prints level transitions and rejected samples as they happen.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn record(&self, event: &WarningEvent) {
        match event {
            WarningEvent::LevelChanged {
                session_id,
                at,
                from,
                to,
                severity_score,
            } => {
                let marker = if *to == WarningLevel::Alert { "!" } else { " " };
                println!(
                    "[{}]{marker} {session_id}: {from} -> {to} (score {severity_score:.2})",
                    at.format("%H:%M:%S")
                );
            }
            WarningEvent::SampleRejected {
                session_id,
                at,
                code,
                ..
            } => {
                println!(
                    "[{}]  {session_id}: sample rejected ({code})",
                    at.format("%H:%M:%S")
                );
            }
            _ => {}
        }
    }
}

fn cmd_check() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("Config file: {:?}", Config::config_path());
    match config.validate() {
        Ok(()) => println!("Configuration is valid."),
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_rules() {
    let config = load_valid_config();
    let engine = match WarningEngine::new(config.engine) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let weights = &engine.resolver().config().weights;
    println!("Registered rules");
    println!("================");
    println!();
    for rule in engine.detector().rules() {
        println!(
            "  {:<24} {:<14} weight {:.2}",
            rule.id(),
            rule.category(),
            weights.weight(rule.category())
        );
    }
    println!();

    let thresholds = &engine.resolver().config().thresholds;
    println!(
        "Levels: notice >= {:.2}, watch >= {:.2}, alert >= {:.2}",
        thresholds.notice, thresholds.watch, thresholds.alert
    );
    println!(
        "Confidence floor: {:.2}",
        engine.detector().config().confidence_floor
    );
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Hana Early Warning Status");
    println!("=========================");
    println!();

    println!("Configuration:");
    println!("  Window retention: {}s", config.engine.window.retention_secs);
    println!("  Window samples: {}", config.engine.window.max_samples);
    println!(
        "  Quiet hours: {:02}:00-{:02}:00 {}",
        config.engine.detector.quiet_hours.start_hour,
        config.engine.detector.quiet_hours.end_hour,
        config.engine.detector.quiet_hours.timezone
    );
    println!(
        "  Gateway: {}",
        config
            .gateway
            .as_ref()
            .map(|g| g.endpoint.as_str())
            .unwrap_or("not configured")
    );
    println!();

    let journal_path = config.journal_path();
    if journal_path.exists() {
        let stats = Journal::with_persistence(journal_path).stats();
        println!("Cumulative Statistics:");
        println!("  Sessions started: {}", stats.sessions_started);
        println!("  Sessions ended: {}", stats.sessions_ended);
        println!("  Samples accepted: {}", stats.samples_accepted);
        println!("  Samples rejected: {}", stats.samples_rejected);
        println!("  Level changes: {}", stats.level_changes);
        println!("  Alerts raised: {}", stats.alerts_raised);
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

#[cfg(feature = "server")]
fn cmd_serve(port: Option<u16>) {
    use hana_early_warning::server::{run, ServerConfig};

    let config = load_valid_config();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let mut server_config = ServerConfig::new(port.unwrap_or(config.server_port), config.engine.clone())
        .with_journal(config.journal_path())
        .with_idle_timeout(config.session_idle_timeout());
    if let Some(gateway) = config.gateway.clone() {
        server_config = server_config.with_gateway(gateway);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let (addr, shutdown_tx) = match run(server_config).await {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };

        println!("Hana Early Warning v{VERSION}");
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Error waiting for Ctrl+C: {e}");
        }
        let _ = shutdown_tx.send(());
        // Give in-flight requests and session teardown a moment.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });
}

/// Default session id: hostname plus a random suffix.
fn default_session_id() -> SessionId {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "wearer".to_string());
    SessionId::generate(&hostname)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
