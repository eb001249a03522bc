//! DPF Control Tool
//!
//! CLI for AX206 USB photo frames: query the panel, set the backlight and
//! show images or a slideshow.

mod config;
mod images;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dpf_hw::{parse_hex_color, DpfDevice, Framebuffer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "dpfctl")]
#[command(about = "Control tool for AX206 USB photo frames")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show panel dimensions
    Info,
    /// Set the backlight level
    Brightness {
        /// Level 0-7, out-of-range values are clamped
        #[arg(allow_negative_numbers = true)]
        level: i32,
    },
    /// Clear the display to a solid color
    Clear {
        /// Color in hex format (e.g., #FF0000 for red)
        #[arg(long, default_value = "#000000")]
        color: String,
    },
    /// Show an image file
    Show {
        /// Image to display
        image: PathBuf,
    },
    /// Cycle through images until interrupted
    Slideshow {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Interval between images in milliseconds (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Render an image as the panel would show it, without a device
    Preview {
        /// Input image
        input: PathBuf,

        /// Output PNG path
        #[arg(default_value = "preview.png")]
        output: PathBuf,

        /// Panel width
        #[arg(long, default_value = "320")]
        width: u32,

        /// Panel height
        #[arg(long, default_value = "240")]
        height: u32,
    },
    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        #[arg(default_value = "dpfctl.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => handle_info(&config),
        Commands::Brightness { level } => handle_brightness(&config, level),
        Commands::Clear { color } => handle_clear(&config, &color),
        Commands::Show { image } => handle_show(&config, &image),
        Commands::Slideshow { paths, interval } => {
            handle_slideshow(config, paths, interval).await
        }
        Commands::Preview {
            input,
            output,
            width,
            height,
        } => handle_preview(&input, &output, width, height),
        Commands::InitConfig { path } => {
            Config::default().save(&path)?;
            println!("Configuration written to: {}", path.display());
            Ok(())
        }
    }
}

fn open_device(config: &Config) -> Result<DpfDevice> {
    DpfDevice::open_with_ids(config.device.vid, config.device.pid).context("Failed to open DPF")
}

fn handle_info(config: &Config) -> Result<()> {
    let device = open_device(config)?;
    let (width, height) = device.get_dimensions().context("Failed to query panel dimensions")?;
    println!("DPF Status:");
    println!(
        "  Device: {:04x}:{:04x}",
        config.device.vid, config.device.pid
    );
    println!("  Dimensions: {}x{}", width, height);
    Ok(())
}

fn handle_brightness(config: &Config, level: i32) -> Result<()> {
    let device = open_device(config)?;
    device.set_brightness(level)?;
    println!(
        "Brightness set to: {}",
        level.clamp(0, dpf_hw::lcd::MAX_BRIGHTNESS as i32)
    );
    Ok(())
}

fn handle_clear(config: &Config, color: &str) -> Result<()> {
    let rgb = parse_hex_color(color)?;
    let device = open_device(config)?;
    device.clear(rgb)?;
    println!("Display cleared to: {}", color);
    Ok(())
}

fn handle_show(config: &Config, path: &Path) -> Result<()> {
    let device = open_device(config)?;
    let (width, height) = device.get_dimensions().context("Failed to query panel dimensions")?;
    let img = images::load_fitted(path, width as u32, height as u32)?;
    let tiles = device.show(&img, config.tile_size, &AtomicBool::new(true))?;
    debug!("Sent {} tiles", tiles);
    println!("Displayed: {}", path.display());
    Ok(())
}

fn handle_preview(input: &Path, output: &Path, width: u32, height: u32) -> Result<()> {
    let img = images::load_fitted(input, width, height)?;
    let fb = Framebuffer::convert_from(&img);
    fb.to_rgba_image()
        .save(output)
        .context("Failed to write preview file")?;
    println!("Preview saved to: {}", output.display());
    Ok(())
}

async fn handle_slideshow(config: Config, paths: Vec<PathBuf>, interval: Option<u64>) -> Result<()> {
    let files = images::collect_images(&paths)?;
    if files.is_empty() {
        anyhow::bail!("No images found");
    }

    // Setup failures abort before the loop starts.
    let device = open_device(&config)?;
    let (width, height) = device.get_dimensions().context("Failed to query panel dimensions")?;
    info!("Got LCD dimensions: {}x{}", width, height);
    device.set_brightness(config.brightness as i32)?;

    let running = Arc::new(AtomicBool::new(true));
    let interval = Duration::from_millis(interval.unwrap_or(config.interval));
    let tile = config.tile_size;

    let loop_running = running.clone();
    let mut worker = tokio::task::spawn_blocking(move || {
        slideshow_loop(&device, &files, (width as u32, height as u32), tile, interval, &loop_running);
        device.close();
        info!("USB closed");
    });

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        result = &mut worker => {
            result?;
            return Ok(());
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    // The current tile finishes before the loop notices.
    running.store(false, Ordering::Relaxed);
    worker.await?;
    info!("Done");
    Ok(())
}

fn slideshow_loop(
    device: &DpfDevice,
    files: &[PathBuf],
    (width, height): (u32, u32),
    tile: u32,
    interval: Duration,
    running: &AtomicBool,
) {
    let mut consecutive_errors: u32 = 0;
    let mut last_error_log = Instant::now();

    'outer: while running.load(Ordering::Relaxed) {
        for path in files {
            if !running.load(Ordering::Relaxed) {
                break 'outer;
            }

            info!("Put image to DPF: {}", path.display());
            let result = images::load_fitted(path, width, height)
                .and_then(|img| Ok(device.show(&img, tile, running)?));

            if let Err(e) = result {
                consecutive_errors += 1;
                // Only log errors once per minute or on first error
                let elapsed = last_error_log.elapsed();
                if consecutive_errors == 1 || elapsed >= Duration::from_secs(60) {
                    if consecutive_errors > 1 {
                        warn!(
                            "Display error (repeated {} times in {:?}): {:#}",
                            consecutive_errors, elapsed, e
                        );
                    } else {
                        warn!("Display error: {:#}", e);
                    }
                    last_error_log = Instant::now();
                    consecutive_errors = 0;
                }
            } else {
                consecutive_errors = 0;
            }

            sleep_while_running(interval, running);
        }
    }
}

/// Sleeps for `total`, waking early once `running` is cleared.
fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let step = Duration::from_millis(100);
    let deadline = Instant::now() + total;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}
