use anyhow::Result;
use clap::Parser;
use epiguard::{EpiguardApp, EpiguardConfig};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "epiguard")]
#[command(about = "Multi-camera PPE compliance monitoring with live detection streaming")]
#[command(version)]
#[command(long_about = "Runs one detection worker per active camera, aggregates PPE \
violations per frame and serves annotated MJPEG streams, alert snapshots and worker \
status over HTTP. Cameras are seeded from the configuration file.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "epiguard.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build components but don't start them
    #[arg(long, help = "Perform dry run - initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rotated log files")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting epiguard v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match EpiguardConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid ({} cameras)", config.cameras.len());
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let mut app = EpiguardApp::new(config).map_err(|e| {
        error!("Failed to build application: {}", e);
        e
    })?;

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    app.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    let exit_code = app.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Epiguard exited with code: {}", exit_code);

    // Flush buffered log lines before exiting
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("epiguard={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match args.log_dir.as_deref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "epiguard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Epiguard Configuration File");
    println!("# Default configuration with all available options.");
    println!("# Cameras are added as [[cameras]] tables:");
    println!("#");
    println!("# [[cameras]]");
    println!("# name = \"Loading dock\"");
    println!("# source_url = \"rtsp://10.0.0.5/stream\"  # or \"0\", a file path, fake://demo");
    println!("# target_fps = 5");
    println!("# active = true");
    println!();

    let rendered = toml::to_string_pretty(&EpiguardConfig::default())?;
    println!("{}", rendered);
    Ok(())
}
