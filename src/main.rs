use anyhow::Context;
use clap::Parser;
use scroll_wheel_host::domain::models::MessageSeverity;
use scroll_wheel_host::domain::settings::SettingsService;
use scroll_wheel_host::infrastructure::input_simulator::platform_sink;
use scroll_wheel_host::infrastructure::logging::init_logger;
use scroll_wheel_host::infrastructure::operator_input::{LineSource, StdinLines};
use scroll_wheel_host::infrastructure::platform_central;
use scroll_wheel_host::presentation::console;
use scroll_wheel_host::session::{
    EventSender, FinderConfig, PeripheralFinder, SessionConfig, SessionController,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "scroll-wheel-host", version, about = "Host driver for the BLE scroll wheel")]
struct Cli {
    /// Settings file (default: <config dir>/ScrollWheelHost/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Advertised name substring to look for
    #[arg(long)]
    name: Option<String>,

    /// Discovery attempts before listing all devices
    #[arg(long)]
    attempts: Option<u32>,

    /// Log wheel motion instead of injecting it
    #[arg(long)]
    dry_run: bool,

    /// Log filter, e.g. "debug" or "scroll_wheel_host=trace"
    #[arg(long)]
    log_level: Option<String>,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings_service = match &cli.config {
        Some(path) => SettingsService::with_path(path.clone()),
        None => SettingsService::new()?,
    };
    {
        let settings = settings_service.get_mut();
        if let Some(name) = &cli.name {
            settings.device_name_filter = name.clone();
        }
        if let Some(attempts) = cli.attempts {
            settings.scan_attempts = attempts.max(1);
        }
    }

    if cli.save_config {
        settings_service.save()?;
        println!("Settings written to {}", settings_service.path().display());
        return Ok(ExitCode::SUCCESS);
    }

    let settings = settings_service.get().clone();
    let _logging_guard = init_logger(&settings.log_settings, cli.log_level.as_deref())?;
    info!("Settings loaded from {}", settings_service.path().display());

    let mut input = StdinLines::spawn();
    for line in console::banner() {
        input.show(&line);
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let printer = console::spawn_printer(event_rx);
    let events = EventSender::new(event_tx);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted by user");
            let _ = shutdown_tx.send(true);
        }
    });

    let central = platform_central()
        .await
        .context("Initialize Bluetooth")?;
    let sink = platform_sink(cli.dry_run).context("Initialize input sink")?;

    let finder = PeripheralFinder::new(
        central.as_ref(),
        FinderConfig::from(&settings),
        events.clone(),
    );
    let found = tokio::select! {
        found = finder.find(&mut input, settings.scan_timeout(), settings.scan_attempts.max(1)) => found,
        Ok(()) = shutdown_rx.changed() => None,
    };

    let exit = match found {
        // Not found was reported by the finder, an interrupt by the signal task
        None => ExitCode::SUCCESS,
        Some(peripheral) => {
            let mut controller =
                SessionController::new(SessionConfig::from(&settings), sink, events.clone());
            let report = controller
                .run(central.as_ref(), &peripheral, Box::new(input), shutdown_rx)
                .await;

            for warning in &report.warnings {
                warn!("Session ran degraded: {}", warning);
            }
            if report.failed() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    };

    events.log("Exiting.", MessageSeverity::Info);
    drop(events);
    drop(finder);
    let _ = printer.await;
    Ok(exit)
}
