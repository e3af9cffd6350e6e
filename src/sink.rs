// Sink Module - Open brightness channel handles for the 5-position RGB bar
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::color;
use crate::script::Frame;
use crate::types::{LightbarError, Rgb};

pub const DEFAULT_LED_ROOT: &str = "/sys/class/leds";

// Physical LED numbers in channel order: positions 1-5 left to right, each R, G, B
pub const CHANNEL_LEDS: [u8; 15] = [
    13, 14, 15,
    10, 11, 12,
    7, 8, 9,
    4, 5, 6,
    1, 2, 3,
];

/// Brightness file for every channel under `led_root`, in channel order
pub fn channel_paths(led_root: &Path) -> Vec<PathBuf> {
    CHANNEL_LEDS
        .iter()
        .map(|led| led_root.join(format!("led{}", led)).join("brightness"))
        .collect()
}

struct Channel<W> {
    label: String,
    handle: W,
}

/// Exclusive owner of the channel handles. Values are written as "<n>\n",
/// each in a single write call so sysfs sees one complete value per write.
pub struct LedSink<W: Write = File> {
    channels: Vec<Channel<W>>,
}

impl LedSink<File> {
    /// Open every channel for writing; on failure the handles opened so far are closed
    pub fn open(paths: &[PathBuf]) -> Result<Self, LightbarError> {
        let mut channels = Vec::with_capacity(paths.len());
        for path in paths {
            let handle = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(path)
                .map_err(|source| LightbarError::ChannelUnavailable {
                    channel: path.display().to_string(),
                    source,
                })?;
            channels.push(Channel { label: path.display().to_string(), handle });
        }
        log::debug!("Opened {} LED channels", channels.len());
        Ok(LedSink { channels })
    }

    pub fn open_root(led_root: &Path) -> Result<Self, LightbarError> {
        Self::open(&channel_paths(led_root))
    }
}

impl<W: Write> LedSink<W> {
    #[cfg(test)]
    pub fn from_writers(writers: Vec<(String, W)>) -> Self {
        let channels = writers
            .into_iter()
            .map(|(label, handle)| Channel { label, handle })
            .collect();
        LedSink { channels }
    }

    pub fn group_count(&self) -> usize {
        self.channels.len() / 3
    }

    /// Write one frame and flush every channel. Tokens that fail to decode
    /// leave their group untouched. Returns the number of groups written.
    pub fn apply(&mut self, frame: &Frame, max_brightness: u8) -> Result<usize, LightbarError> {
        let mut written = 0;
        for (group, token) in frame.colors.iter().take(self.group_count()).enumerate() {
            let rgb = match color::decode(token, max_brightness) {
                Ok(rgb) => rgb,
                Err(e) => {
                    log::trace!("Skipping group {}: {}", group, e);
                    continue;
                }
            };
            self.write_group(group, rgb)?;
            written += 1;
        }
        self.flush_all()?;
        Ok(written)
    }

    /// Write the same (already scaled) color to every group
    pub fn apply_solid(&mut self, rgb: Rgb) -> Result<(), LightbarError> {
        for group in 0..self.group_count() {
            self.write_group(group, rgb)?;
        }
        self.flush_all()
    }

    /// Zero every channel and release the handles. Every channel is attempted;
    /// the first failure is returned after the rest have been released.
    pub fn reset(mut self) -> Result<(), LightbarError> {
        let mut first_error = None;
        for channel in self.channels.iter_mut() {
            if let Err(e) = write_value(&mut *channel, 0).and_then(|_| flush(&mut *channel)) {
                log::error!("Error turning off LEDs: {}", e);
                first_error.get_or_insert(e);
            }
        }
        drop(self.channels);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_group(&mut self, group: usize, rgb: Rgb) -> Result<(), LightbarError> {
        for (offset, value) in rgb.channels().into_iter().enumerate() {
            write_value(&mut self.channels[group * 3 + offset], value)?;
        }
        Ok(())
    }

    fn flush_all(&mut self) -> Result<(), LightbarError> {
        for channel in self.channels.iter_mut() {
            flush(channel)?;
        }
        Ok(())
    }
}

fn write_value<W: Write>(channel: &mut Channel<W>, value: u8) -> Result<(), LightbarError> {
    channel
        .handle
        .write_all(format!("{}\n", value).as_bytes())
        .map_err(|source| LightbarError::ChannelUnavailable { channel: channel.label.clone(), source })
}

fn flush<W: Write>(channel: &mut Channel<W>) -> Result<(), LightbarError> {
    channel
        .handle
        .flush()
        .map_err(|source| LightbarError::ChannelUnavailable { channel: channel.label.clone(), source })
}
