//! Command-line front end running scans on simulated hardware.
//!
//! ```bash
//! spectral-mapper scan --width 10 --height 10 --zigzag
//! spectral-mapper background
//! ```
//!
//! Ctrl-C during a scan publishes an "Interrupt acquisition" request; the scan stops
//! after the pixel in progress.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn};

use spectral_mapper::config::{MapperConfig, DEFAULT_CONFIG_PATH};
use spectral_mapper::hardware::mock::{MockSpectrometer, MockStage};
use spectral_mapper::hardware::{TravelLimits, TrimmedSpectrometer};
use spectral_mapper::scan::ScanDirection;
use spectral_mapper::{logging, BeginOutcome, EventBus, ScanController, ScanEvent};

#[derive(Parser, Debug)]
#[command(name = "spectral-mapper", version, about = "Raster-scan spectral mapping")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Acquire a full map
    Scan {
        /// Override grid width
        #[arg(long)]
        width: Option<u32>,
        /// Override grid height
        #[arg(long)]
        height: Option<u32>,
        /// Alternate row direction
        #[arg(long)]
        zigzag: bool,
        /// Print the acquired points as JSON
        #[arg(long)]
        json: bool,
    },
    /// Acquire and store a background spectrum
    Background,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = MapperConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Command::Scan {
        width,
        height,
        zigzag,
        ..
    } = &cli.command
    {
        if let Some(width) = width {
            config.grid.width = *width;
        }
        if let Some(height) = height {
            config.grid.height = *height;
        }
        if *zigzag {
            config.grid.direction = ScanDirection::Zigzag;
        }
        config.validate()?;
    }

    logging::init_from_config(&config)?;
    info!(name = %config.application.name, "Starting");

    let bus = EventBus::default();
    let controller = Arc::new(ScanController::new(
        Arc::new(bus.clone()),
        config.scan_options(),
    )?);
    let _interrupts = controller.listen_for_interrupts(&bus);

    let sim = &config.simulation;
    let stage = MockStage::new(TravelLimits {
        x_max: sim.x_max,
        y_max: sim.y_max,
    })
    .with_move_delay(Duration::from_millis(sim.move_delay_ms));
    let mut spectrometer = MockSpectrometer::new(sim.pixels).with_noise(sim.noise);
    if sim.realtime {
        spectrometer = spectrometer.realtime();
    }
    controller.connect_stage(Arc::new(stage)).await?;
    controller
        .connect_detector(Arc::new(TrimmedSpectrometer::new(spectrometer)))
        .await?;

    match cli.command {
        Command::Scan { json, .. } => run_scan(controller, bus, json).await,
        Command::Background => {
            let background = controller.acquire_background().await?;
            println!(
                "{}: {} pixels, peak {:.1}",
                background.title,
                background.spectrum.len(),
                background.spectrum.iter().copied().fold(f64::MIN, f64::max)
            );
            Ok(())
        }
    }
}

async fn run_scan(controller: Arc<ScanController>, bus: EventBus, json: bool) -> Result<()> {
    let mut progress = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(envelope) = progress.recv().await {
            if let ScanEvent::PointAcquired { point, result } = &envelope.event {
                info!(x = point.x, y = point.y, acquired = result.len(), "Pixel done");
            }
        }
    });

    let ctrl_c_bus = bus.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, interrupting scan");
            ctrl_c_bus.request_interrupt("cli");
        }
    });

    let outcome = controller.spawn_scan().await??;
    let result = controller.scan_result().await;
    match outcome {
        BeginOutcome::Finished(termination) => {
            info!(points = result.len(), ?termination, "Scan finished");
        }
        BeginOutcome::Busy => warn!("A scan is already running"),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result.into_points())?);
    } else {
        println!("Acquired {} points", result.len());
    }
    Ok(())
}
