//! `lattest [--config PATH] [--run N|infinite]`
//!
//! Without `--run`, reads control commands from stdin until `quit` or Ctrl-C.
//! With `--run N`, performs one finite run, prints the statistics and exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use lattest::control::channel::parse_control;
use lattest::control::Attribute;
use lattest::models::{ControlCommand, MAX_PERIOD_MS};
use lattest::sampler::tuner;
use lattest::sampler::SamplerService;
use lattest::{AppError, ControlChannel, ControlSurface, LogCollector, Settings, SettingsManager};

#[derive(Parser, Debug)]
#[command(name = "lattest")]
#[command(about = "Periodic timer jitter sampler")]
#[command(version)]
struct CliArgs {
    /// Settings file (default: settings.json in the user config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Perform one run, print status and statistics, then exit
    #[arg(short, long, value_name = "N|infinite", value_parser = parse_run)]
    run: Option<ControlCommand>,
}

/// A positive firing count or `infinite`
fn parse_run(value: &str) -> Result<ControlCommand, String> {
    match parse_control(value).map_err(|e| e.to_string())? {
        ControlCommand::Stop | ControlCommand::Finite(0) => Err(format!(
            "expected a positive run count or 'infinite', got '{}'",
            value
        )),
        command => Ok(command),
    }
}

fn load_settings(args: &CliArgs) -> Result<Settings, AppError> {
    let settings = match &args.config {
        Some(path) => SettingsManager::load_from(path)?,
        None => SettingsManager::load()?,
    };
    Ok(settings)
}

fn help_text() -> String {
    let mut text = String::from("Commands:\n  read <attribute>\n  write <attribute> <value>\n  help\n  quit\nAttributes:\n");
    for attribute in Attribute::ALL {
        text.push_str(&format!("  {:<11} ({})\n", attribute.name(), attribute.mode()));
    }
    text.push_str(&format!("Period range: 1..={} ms\n", MAX_PERIOD_MS));
    text
}

/// Execute one interactive command line. Returns false on `quit`.
fn handle_command(channel: &ControlChannel, line: &str) -> bool {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match verb {
        "" => {}
        "quit" | "exit" => return false,
        "help" => print!("{}", help_text()),
        "read" => match channel.read(rest.trim()) {
            Ok(text) => print!("{}", text),
            Err(e) => println!("error: {}", e),
        },
        "write" => {
            let rest = rest.trim();
            let (attribute, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match channel.write(attribute, value) {
                Ok(consumed) => {
                    log::debug!("[Main] write {} consumed {} bytes", attribute, consumed);
                    println!("ok");
                }
                Err(e) => println!("error: {}", e),
            }
        }
        other => println!("error: unknown command '{}' (try 'help')", other),
    }
    true
}

async fn interactive(channel: ControlChannel) -> Result<(), AppError> {
    println!("LatTest {} - type 'help' for commands", lattest::VERSION);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_command(&channel, &line) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("[Main] Ctrl-C received");
                break;
            }
        }
    }
    Ok(())
}

async fn one_shot(channel: ControlChannel, command: ControlCommand) -> Result<(), AppError> {
    let surface = channel.surface().clone();
    surface
        .control(command)
        .map_err(|e| AppError::ModuleInit(e.to_string()))?;

    let service = Arc::clone(surface.service());
    let wait = tokio::task::spawn_blocking(move || {
        while !service.wait_until_idle(Duration::from_secs(60)) {}
    });
    tokio::select! {
        joined = wait => joined.map_err(|e| AppError::ModuleInit(e.to_string()))?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("[Main] Ctrl-C received, stopping run");
            let _ = surface.control(ControlCommand::Stop);
        }
    }

    print!("{}", channel.read("status").map_err(|e| AppError::ModuleInit(e.to_string()))?);
    print!("{}", channel.read("statistics").map_err(|e| AppError::ModuleInit(e.to_string()))?);
    Ok(())
}

#[tokio::main]
async fn main() -> lattest::Result<()> {
    let args = CliArgs::parse();

    // =========================================================================
    // SETTINGS AND LOGGING - MUST BE FIRST
    // =========================================================================
    let settings = load_settings(&args)?;
    let level = settings.level_filter().unwrap_or(log::LevelFilter::Info);
    let log_collector = LogCollector::new(&PathBuf::from(&settings.log_dir), level, settings.echo_logs)
        .map_err(AppError::ModuleInit)?;
    if let Err(e) = log_collector.install() {
        eprintln!("[Main] WARNING: Failed to set LogCollector as global logger: {}", e);
    }
    log::info!(
        "LatTest {} logging to {}",
        lattest::VERSION,
        log_collector.log_path().display()
    );

    if settings.realtime.lock_memory {
        match tuner::lock_memory() {
            Ok(()) => log::info!("[Main] Memory locked (MCL_CURRENT | MCL_FUTURE)"),
            Err(e) => log::warn!("[Main] {}. Continuing without locked memory.", e),
        }
    }

    // =========================================================================
    // SAMPLER SERVICE AND CONTROL SURFACE
    // =========================================================================
    let service = SamplerService::with_components(
        settings.period(),
        settings.histogram_config(),
        settings.realtime.clone(),
        Arc::new(lattest::sampler::MonotonicClock::new()),
        Arc::new(lattest::sampler::NullToggler),
    )
    .map_err(|e| AppError::ModuleInit(e.to_string()))?;
    let service = Arc::new(service);
    let channel = ControlChannel::new(ControlSurface::new(Arc::clone(&service)));

    let outcome = match args.run {
        Some(command) => one_shot(channel, command).await,
        None => interactive(channel).await,
    };

    // =========================================================================
    // TEARDOWN
    // =========================================================================
    let teardown = Arc::clone(&service);
    if let Err(e) = tokio::task::spawn_blocking(move || teardown.shutdown()).await {
        eprintln!("[Main] WARNING: Sampler shutdown task failed: {}", e);
    }
    log::info!("LatTest exiting");
    if let Err(e) = log_collector.wait_for_empty().await {
        eprintln!("[Main] WARNING: Failed to flush logs: {}", e);
    }

    // The stdin reader may still occupy a blocking thread, so leave explicitly
    match outcome {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
