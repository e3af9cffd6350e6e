// Lightbar - RGB LED bar controller for the Fire Cube
// Plays timed animation files, sets static colors, or runs as a settings-driven service
use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::Ordering;

mod cli;
mod color;
mod config;
mod player;
mod script;
mod service;
mod sink;
mod types;

use config::{Args, Invocation, Settings};
use service::{HostNotifier, Service};
use types::PlayPolicy;

fn run_animation(file: &Path, expand_loops: bool, policy: PlayPolicy, brightness: u8, led_root: &Path) -> Result<()> {
    let player = cli::load_animation(file, expand_loops, policy, brightness)?;

    // Ctrl+C cancels playback; the player turns the LEDs off on its way out
    let cancel = player.cancel_flag();
    ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed))
        .context("Failed to install interrupt handler")?;

    cli::play(&player, led_root)?;
    Ok(())
}

fn run_service(cfg: Option<&str>) -> Result<()> {
    let settings_path = Settings::config_path(cfg)?;

    // Make sure the file (and its directory) exist before watching it
    Settings::load_or_create(&settings_path)?;
    log::info!("Using settings file: {}", settings_path.display());

    let mut notifier = HostNotifier::install(&settings_path)?;
    Service::new(settings_path).run(&mut notifier)
}

fn run(args: &Args) -> Result<()> {
    match args.invocation()? {
        Invocation::Solid { color, brightness } => cli::run_solid(&color, brightness, &args.led_root),
        Invocation::Animate { file, expand_loops, policy, brightness } => {
            run_animation(&file, expand_loops, policy, brightness, &args.led_root)
        }
        Invocation::Service { cfg } => run_service(cfg.as_deref()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("\n❌ {:#}", e);
        std::process::exit(1);
    }
}
