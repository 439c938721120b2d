//! RideProbe - BLE indoor bike compatibility diagnostics
//!
//! Main entry point for the command line tool.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rideprobe::config::{get_config_path, load_config, load_config_from, save_config_to, ProbeConfig};
use rideprobe::diagnosis::{run_session, CompatibilityReport, DeviceProbe, ProbePath};
use rideprobe::sensors::{DiscoveredDevice, SensorManager};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List nearby devices that speak a recognized protocol
    Scan {
        /// Scan duration in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run the compatibility test against one device
    Test {
        /// Pick the first device whose name contains this text
        #[arg(long, conflicts_with = "address")]
        name: Option<String>,
        /// Pick the device with this address
        #[arg(long)]
        address: Option<String>,
        /// Where to write the JSON report
        #[arg(long)]
        report: Option<PathBuf>,
        /// Length of the pedaling window in seconds
        #[arg(long)]
        pedal_secs: Option<u64>,
        /// Start the pedaling window without waiting for Enter
        #[arg(long)]
        no_prompt: bool,
    },
    /// Write the effective configuration to the config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RideProbe v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan { timeout } => {
            if let Some(secs) = timeout {
                config.scan.discovery_timeout_secs = secs;
            }
            scan(&config).await
        }
        Commands::Test {
            name,
            address,
            report,
            pedal_secs,
            no_prompt,
        } => {
            if let Some(secs) = pedal_secs {
                config.test.pedaling_secs = secs;
            }
            let target = DeviceSelector { name, address };
            test(&config, &target, report, !no_prompt).await
        }
        Commands::InitConfig { force } => {
            let path = cli.config.unwrap_or_else(get_config_path);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            save_config_to(&config, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Configuration written to {}", path.display());
            Ok(())
        }
    }
}

async fn scan(config: &ProbeConfig) -> Result<()> {
    let mut manager = SensorManager::new(config.scan.clone());
    manager
        .initialize()
        .await
        .context("Bluetooth adapter initialisation failed")?;

    let devices = manager.scan().await.context("Scan failed")?;
    manager.shutdown().await;

    if devices.is_empty() {
        println!("No compatible devices found (make sure the trainer is awake).");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    for (index, device) in devices.iter().enumerate() {
        println!(
            "{:>3}. {} [{}] {} rssi={}",
            index + 1,
            device.name,
            device.address,
            device.protocols_label(),
            device
                .signal_strength
                .map(|rssi| rssi.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
    }

    Ok(())
}

async fn test(
    config: &ProbeConfig,
    target: &DeviceSelector,
    report_path: Option<PathBuf>,
    prompt: bool,
) -> Result<()> {
    let mut manager = SensorManager::new(config.scan.clone());
    manager
        .initialize()
        .await
        .context("Bluetooth adapter initialisation failed")?;

    let devices = manager.scan().await.context("Scan failed")?;
    let device = target.select(&devices)?.clone();
    tracing::info!(name = %device.name, address = %device.address, "Testing device");

    let events = manager.event_receiver();
    let session = std::thread::spawn(move || run_session(events));

    if let Ok(identity) = manager.connect(&device.device_id).await {
        let mut probe = DeviceProbe::new(&mut manager, config.test.clone());
        if probe.run_control_tests(&identity).await == ProbePath::Ftms {
            if prompt {
                wait_for_enter("Start pedaling, then press Enter...").await?;
            }
            probe.collect_pedaling().await;
        }
    }

    // Closing the channel lets the session flush and classify.
    manager.shutdown().await;
    drop(manager);

    let record = session
        .join()
        .map_err(|_| anyhow::anyhow!("Session thread panicked"))?;

    let report = CompatibilityReport::from_record(&record);
    for line in report.summary_lines() {
        println!("{line}");
    }

    let path = report_path
        .unwrap_or_else(|| config.report.output_dir.join(report.default_file_name()));
    report
        .write_json(&path)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    println!("Report written to {}", path.display());

    Ok(())
}

async fn wait_for_enter(message: &str) -> Result<()> {
    println!("{message}");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await
    .context("Input task failed")?
    .context("Failed to read from stdin")
}

/// How the device under test is chosen from the scan results.
struct DeviceSelector {
    name: Option<String>,
    address: Option<String>,
}

impl DeviceSelector {
    /// Scan results come FTMS first, so without a filter the best candidate
    /// is the first one.
    fn select<'a>(&self, devices: &'a [DiscoveredDevice]) -> Result<&'a DiscoveredDevice> {
        let found = match (&self.name, &self.address) {
            (_, Some(address)) => devices.iter().find(|d| d.address_matches(address)),
            (Some(name), None) => devices.iter().find(|d| d.name_matches(name)),
            (None, None) => devices.first(),
        };

        match found {
            Some(device) => Ok(device),
            None if devices.is_empty() => {
                bail!("No compatible device found (make sure the trainer is awake)")
            }
            None => bail!("No scanned device matches the given name or address"),
        }
    }
}
