// CLI Module - One-shot static color and foreground animation playback
use anyhow::{Context, Result};
use std::path::Path;

use crate::color;
use crate::player::{PlaybackReport, Player};
use crate::script;
use crate::sink::LedSink;
use crate::types::PlayPolicy;

/// Set every position to `color` and exit, leaving the LEDs on
pub fn run_solid(color: &str, brightness: u8, led_root: &Path) -> Result<()> {
    let rgb = color::parse_user_color(color, brightness)
        .with_context(|| format!("Invalid color value: {}", color))?;

    let mut sink = LedSink::open_root(led_root)?;
    sink.apply_solid(rgb)?;
    log::debug!("Static color {:?} applied", rgb);
    Ok(())
}

/// Load an animation file into a player ready to run
pub fn load_animation(file: &Path, expand_loops: bool, policy: PlayPolicy, brightness: u8) -> Result<Player> {
    let sequence = script::load_file(file, expand_loops)?;
    if sequence.is_empty() {
        log::warn!("{} contains no frames", file.display());
    }
    Ok(Player::new(sequence, policy, brightness))
}

/// Play in the foreground; the LEDs are off when this returns
pub fn play(player: &Player, led_root: &Path) -> Result<PlaybackReport> {
    let sink = LedSink::open_root(led_root)?;
    let report = player.play(sink)?;
    log::debug!("Player {:?}: {:?}", player.state(), report);
    Ok(report)
}
