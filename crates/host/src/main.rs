//! usb-sync host
//!
//! Watches for an attached USB device, mediates the access-grant flow, and
//! runs a one-shot bulk sync transfer on request. Interactive by default
//! (TUI); headless service mode logs status transitions instead.

mod config;
mod permissions;
mod service;
mod tui;
mod usb;
mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use common::{Detection, UsbBridge, UsbCommand, UsbEvent, create_usb_bridge, setup_logging};
use config::{AutoGrant, HostConfig};
use tokio::signal;
use tracing::{error, info, warn};
use usb::spawn_usb_worker;
use watcher::{DeviceWatcher, WatcherAction};

#[derive(Parser, Debug)]
#[command(name = "usb-sync-host")]
#[command(
    author,
    version,
    about = "USB sync host - detect an attached USB device and run a one-shot sync transfer"
)]
#[command(long_about = "
Watches for USB attach/detach events, mediates per-device access grants,
and performs a single bounded bulk transfer against the first enumerated
device on request.

EXAMPLES:
    # Run the interactive TUI with default config
    usb-sync-host

    # Run with custom config
    usb-sync-host --config /path/to/host.toml

    # List USB devices without starting the UI
    usb-sync-host --list-devices

    # Run headless (log-only, auto-answered permission prompts)
    usb-sync-host --headless

    # Run with debug logging
    usb-sync-host --log-level debug

CONFIGURATION:
    The host looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-sync/host.toml
    3. /etc/usb-sync/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run without the TUI (log-only service mode)
    #[arg(long)]
    headless: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        HostConfig::load_from_arg(path).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args.log_level.as_deref().unwrap_or(&config.host.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-sync host v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if !rusb::has_hotplug() {
        warn!("Hot-plug support unavailable; attach/detach notifications will not be delivered");
    }

    // Initialize USB subsystem: sync USB ops run in a dedicated thread
    let (usb_bridge, worker) = create_usb_bridge();
    let usb_worker_handle = spawn_usb_worker(
        worker,
        config.usb.clone(),
        config.permissions.clone(),
    );

    if args.list_devices {
        let result = list_devices_mode(usb_bridge.clone()).await;
        shutdown_usb(usb_bridge, usb_worker_handle).await;
        return result;
    }

    let headless = args.headless || config.host.headless;

    let result = if headless {
        info!("Running in headless mode");
        run_service(config, usb_bridge.clone()).await
    } else {
        info!("Running in TUI mode (interactive)");
        tui::run(usb_bridge.clone()).await
    };

    shutdown_usb(usb_bridge, usb_worker_handle).await;

    result
}

/// List USB devices and exit
async fn list_devices_mode(usb_bridge: UsbBridge) -> Result<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    usb_bridge
        .send_command(UsbCommand::ListDevices { response: tx })
        .await
        .context("Failed to send ListDevices command")?;

    let devices = rx.await.context("Failed to receive device list")?;

    if devices.is_empty() {
        println!("No USB devices found");
    } else {
        println!("Found {} USB device(s):", devices.len());
        for device in devices {
            println!(
                "  {}  {:04x}:{:04x}  {}",
                device.device_node(),
                device.vendor_id,
                device.product_id,
                device.label()
            );
        }
    }

    Ok(())
}

/// Run headless: log status transitions, auto-answer permission prompts
async fn run_service(config: HostConfig, usb_bridge: UsbBridge) -> Result<()> {
    if service::is_systemd() {
        info!("Running under systemd (Type=notify)");
    }
    service::notify_ready()?;

    let mut watcher = DeviceWatcher::new();

    // Startup detection pass, so an already-plugged device shows up
    // without waiting for an attach notification.
    let detection = run_detection(&usb_bridge).await?;
    apply_detection(&mut watcher, &usb_bridge, detection).await?;
    report_status(&watcher)?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            event = usb_bridge.recv_event() => {
                match event {
                    Ok(event) => {
                        handle_service_event(&mut watcher, &config, &usb_bridge, event).await?;
                        report_status(&watcher)?;
                    }
                    Err(e) => {
                        error!("USB event channel closed: {}", e);
                        break;
                    }
                }
            }
        }
    }

    service::notify_stopping()?;
    Ok(())
}

/// Apply one USB event in headless mode
async fn handle_service_event(
    watcher: &mut DeviceWatcher,
    config: &HostConfig,
    usb_bridge: &UsbBridge,
    event: UsbEvent,
) -> Result<()> {
    match event {
        UsbEvent::DeviceAttached { device } => {
            info!("Device attached: {}", device.device_node());
            let detection = run_detection(usb_bridge).await?;
            apply_detection(watcher, usb_bridge, detection).await?;
        }
        UsbEvent::DeviceDetached { device } => {
            info!("Device detached: {:?}", device);
            watcher.on_detached();
        }
        UsbEvent::PermissionPrompt { device } => {
            let granted = match config.permissions.auto_grant {
                AutoGrant::All => true,
                AutoGrant::None => false,
                AutoGrant::PreApproved => config::matches_any(
                    &config.permissions.pre_approved,
                    device.vendor_id,
                    device.product_id,
                ),
            };

            info!(
                "Auto-answering access request for {}: {}",
                device.device_node(),
                if granted { "grant" } else { "deny" }
            );

            usb_bridge
                .send_command(UsbCommand::ResolvePermission {
                    device: device.id,
                    granted,
                })
                .await
                .context("Failed to send ResolvePermission command")?;
        }
        UsbEvent::PermissionResult { granted, device } => {
            watcher.on_permission_result(granted, device);
        }
    }

    Ok(())
}

/// Run a detection pass over the channel bridge
async fn run_detection(usb_bridge: &UsbBridge) -> Result<Detection> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    usb_bridge
        .send_command(UsbCommand::Detect { response: tx })
        .await
        .context("Failed to send Detect command")?;

    rx.await.context("Failed to receive detection result")
}

/// Apply a detection outcome, issuing the permission request if needed
async fn apply_detection(
    watcher: &mut DeviceWatcher,
    usb_bridge: &UsbBridge,
    detection: Detection,
) -> Result<()> {
    if let Some(WatcherAction::RequestPermission(device)) = watcher.on_detection(detection) {
        usb_bridge
            .send_command(UsbCommand::RequestPermission { device })
            .await
            .context("Failed to send RequestPermission command")?;
    }

    Ok(())
}

/// Log the current status and forward it to systemd
fn report_status(watcher: &DeviceWatcher) -> Result<()> {
    let status = watcher.status().to_string();
    info!("Status: {}", status);
    service::notify_status(&status)?;
    Ok(())
}

/// Shut down the USB worker thread and wait for it to exit
async fn shutdown_usb(
    usb_bridge: UsbBridge,
    handle: std::thread::JoinHandle<std::result::Result<(), rusb::Error>>,
) {
    info!("Shutting down USB subsystem...");
    if let Err(e) = usb_bridge.send_command(UsbCommand::Shutdown).await {
        error!("Error shutting down USB worker: {:#}", e);
    }

    match handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB worker exited with error: {}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }
}
