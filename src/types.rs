// Shared types module - Common types used across multiple modules

use std::io;
use std::path::PathBuf;
use std::time::Duration;

// Why a playback run ended - lets callers tell a stop request from a finished policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Completed,  // Policy exhausted (once, N passes, duration elapsed)
    Cancelled,  // Cancel flag observed
}

// Outcome of waiting on a notification source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    None,             // Poll interval elapsed with nothing to report
    Abort,            // Host is shutting down
    SettingsChanged,  // Settings must be re-read and the player restarted
}

// How many times (or how long) a frame sequence is replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayPolicy {
    Once,
    Repeat(u32),
    For(Duration),
    Forever,
}

impl PlayPolicy {
    /// Whether another full pass may begin after `passes` completed passes.
    /// Duration limits are enforced per frame by the player, not here.
    pub fn allows_pass(&self, passes: u64) -> bool {
        match *self {
            PlayPolicy::Once => passes < 1,
            PlayPolicy::Repeat(n) => passes < n as u64,
            PlayPolicy::For(_) | PlayPolicy::Forever => true,
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        match *self {
            PlayPolicy::For(d) => Some(d),
            _ => None,
        }
    }
}

// RGB color representation, already scaled to the output brightness
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LightbarError {
    #[error("LED channel {channel} unavailable: {source}")]
    ChannelUnavailable {
        channel: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid hex value length: {0:?}")]
    InvalidTokenLength(String),

    #[error("Invalid hex digit in color value: {0:?}")]
    InvalidHexDigit(String),

    #[error("Malformed frame line: {0:?}")]
    MalformedFrameLine(String),

    #[error("File path {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_pass_limits() {
        assert!(PlayPolicy::Once.allows_pass(0));
        assert!(!PlayPolicy::Once.allows_pass(1));
        assert!(PlayPolicy::Repeat(3).allows_pass(2));
        assert!(!PlayPolicy::Repeat(3).allows_pass(3));
        assert!(!PlayPolicy::Repeat(0).allows_pass(0));
        assert!(PlayPolicy::Forever.allows_pass(u64::MAX));
        assert!(PlayPolicy::For(Duration::from_secs(1)).allows_pass(1000));
    }

    #[test]
    fn test_policy_deadline() {
        assert_eq!(PlayPolicy::For(Duration::from_secs(2)).deadline(), Some(Duration::from_secs(2)));
        assert_eq!(PlayPolicy::Forever.deadline(), None);
    }
}
