use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eframe::egui;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

mod camera;
mod config;
mod controller;
mod errors;
mod feedback;
mod headless;
mod intake;
mod surface;
mod texture;
mod ui;
mod upload;

#[cfg(test)]
mod testing;

use crate::camera::rpicam::RpicamDevices;
use crate::camera::FacingMode;
use crate::config::{Config, ConfigBuilder};
use crate::controller::ImageTransformer;
use crate::surface::SharedSurface;
use crate::ui::TransformerApp;
use crate::upload::HttpEndpoint;

#[derive(Parser)]
#[command(name = "image-transformer", about = "Send a photo to the transformation service and show the result")]
struct Cli {
    /// Configuration file (defaults to ./image_transformer.toml, created if missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera the "Start camera" button opens: user or environment
    #[arg(long)]
    facing: Option<FacingMode>,

    /// Override the transformation service base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Show a plain busy indicator instead of phased progress
    #[arg(long)]
    simple_progress: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload one image without opening a window
    Upload {
        path: PathBuf,
        /// Where to save the returned image
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!("🎨 Starting image transformer");

    let loaded = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    let mut builder = ConfigBuilder::from_config(loaded);
    if let Some(endpoint) = &cli.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(facing) = cli.facing {
        builder = builder.default_facing(facing);
    }
    if cli.simple_progress {
        builder = builder.phased_progress(false);
    }
    let config = builder.build()?;
    info!("Transformation endpoint: {}", config.transform_url());

    // Kept outside the GUI thread so window teardown can block on cleanup
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let surface = SharedSurface::new();
    let devices = Arc::new(RpicamDevices::probe(&config.camera));
    let endpoint = Arc::new(HttpEndpoint::new(&config).context("Failed to build HTTP client")?);
    let controller = Arc::new(ImageTransformer::new(
        &config,
        Arc::new(surface.clone()),
        devices,
        endpoint,
    ));

    match cli.command {
        Some(Command::Upload { path, output }) => {
            let saved = runtime.block_on(headless::upload_file(&controller, &surface, &path, output))?;
            println!("Saved result to {}", saved.display());
            Ok(())
        }
        None => {
            let facing = config.camera.default_facing;
            run_gui(&config, controller, surface, runtime.handle().clone(), facing)
        }
    }
}

fn run_gui(
    config: &Config,
    controller: Arc<ImageTransformer>,
    surface: SharedSurface,
    runtime: tokio::runtime::Handle,
    facing: FacingMode,
) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.display.width as f32, config.display.height as f32])
            .with_min_inner_size([480.0, 360.0]),
        ..Default::default()
    };

    info!("Launching GUI application...");

    eframe::run_native(
        "Image Transformation",
        options,
        Box::new(move |cc| Box::new(TransformerApp::new(cc, controller, surface, runtime, facing))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}
