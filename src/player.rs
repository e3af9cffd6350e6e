// Player Module - Frame-timed playback of a sequence onto the LED sink
//
// State machine: Idle -> Running -> Stopping -> Stopped.
// Every exit path (cancel, duration elapsed, pass count exhausted, write error)
// goes through Stopping, where the sink is reset exactly once.
use anyhow::{anyhow, Result};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::script::FrameSequence;
use crate::sink::LedSink;
use crate::types::{ExitReason, LightbarError, PlayPolicy};

// Cancel flag poll interval while waiting out a frame delay
pub const CANCEL_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub exit: ExitReason,
    pub passes: u64,          // Full passes over the sequence
    pub frames_applied: u64,
    pub frames_skipped: u64,  // Malformed lines
}

impl PlaybackReport {
    fn new() -> Self {
        PlaybackReport { exit: ExitReason::Completed, passes: 0, frames_applied: 0, frames_skipped: 0 }
    }
}

/// Sleep for `delay`, returning early (false) once `cancel` is set
pub fn sleep_cancellable(delay: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}

pub struct Player {
    sequence: Arc<FrameSequence>,
    policy: PlayPolicy,
    brightness: u8,
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<PlayerState>>,
}

impl Player {
    /// Brightness is fixed for the lifetime of the player
    pub fn new(sequence: FrameSequence, policy: PlayPolicy, brightness: u8) -> Self {
        Player {
            sequence: Arc::new(sequence),
            policy,
            brightness,
            cancel: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(PlayerState::Idle)),
        }
    }

    /// Shared cancel flag; setting it asks a running player to stop
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> PlayerState {
        read_state(&self.state)
    }

    /// Play on the current thread until the policy is exhausted or the
    /// cancel flag is set, then reset the sink.
    pub fn play<W: Write>(&self, mut sink: LedSink<W>) -> Result<PlaybackReport, LightbarError> {
        self.set_state(PlayerState::Running);
        log::info!("Animation started ({} frames, {:?}, brightness {})", self.sequence.len(), self.policy, self.brightness);

        let outcome = self.drive(&mut sink);

        self.set_state(PlayerState::Stopping);
        let reset = sink.reset();
        self.set_state(PlayerState::Stopped);

        let report = outcome?;
        reset?;
        log::info!(
            "Animation stopped ({:?}) after {} passes, {} frames",
            report.exit, report.passes, report.frames_applied
        );
        Ok(report)
    }

    /// Run `play` on a dedicated worker thread
    pub fn spawn<W: Write + Send + 'static>(self, sink: LedSink<W>) -> Result<PlayerHandle> {
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        let thread = thread::Builder::new()
            .name("lightbar-player".to_string())
            .spawn(move || self.play(sink))?;
        Ok(PlayerHandle { cancel, state, thread })
    }

    fn drive<W: Write>(&self, sink: &mut LedSink<W>) -> Result<PlaybackReport, LightbarError> {
        let started = Instant::now();
        let deadline = self.policy.deadline();
        let mut report = PlaybackReport::new();

        while self.policy.allows_pass(report.passes) {
            let mut applied_this_pass = 0;

            for frame in self.sequence.frames() {
                if self.cancel.load(Ordering::Relaxed) {
                    report.exit = ExitReason::Cancelled;
                    return Ok(report);
                }
                if deadline.is_some_and(|d| started.elapsed() >= d) {
                    return Ok(report);
                }

                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::debug!("{}", e);
                        report.frames_skipped += 1;
                        continue;
                    }
                };

                sink.apply(&frame, self.brightness)?;
                report.frames_applied += 1;
                applied_this_pass += 1;

                if !sleep_cancellable(frame.delay(), &self.cancel) {
                    report.exit = ExitReason::Cancelled;
                    return Ok(report);
                }
            }

            report.passes += 1;

            // Nothing playable: an unbounded policy would spin forever
            if applied_this_pass == 0 && matches!(self.policy, PlayPolicy::For(_) | PlayPolicy::Forever) {
                log::warn!("Animation has no playable frames, stopping");
                return Ok(report);
            }
        }

        Ok(report)
    }

    fn set_state(&self, next: PlayerState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

fn read_state(state: &Mutex<PlayerState>) -> PlayerState {
    match state.lock() {
        Ok(state) => *state,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// A player running on its own thread
pub struct PlayerHandle {
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<PlayerState>>,
    thread: JoinHandle<Result<PlaybackReport, LightbarError>>,
}

impl PlayerHandle {
    pub fn request_stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn state(&self) -> PlayerState {
        read_state(&self.state)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker to reach Stopped
    pub fn join(self) -> Result<PlaybackReport> {
        let result = self
            .thread
            .join()
            .map_err(|_| anyhow!("Animation thread panicked"))?;
        Ok(result?)
    }

    /// Request a stop and wait for the LEDs to be reset
    pub fn stop(self) -> Result<PlaybackReport> {
        self.request_stop();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script;
    use crate::sink::testing::{fake_led_root, read_channels, recording_sink, RecordingChannel};

    #[test]
    fn test_sleep_cancellable_runs_full_delay() {
        let cancel = AtomicBool::new(false);
        let start = Instant::now();
        assert!(sleep_cancellable(Duration::from_millis(30), &cancel));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleep_cancellable_returns_when_cancelled() {
        let cancel = AtomicBool::new(true);
        let start = Instant::now();
        assert!(!sleep_cancellable(Duration::from_secs(10), &cancel));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_once_then_reset_leaves_channels_off() {
        let root = fake_led_root();
        let sequence = script::parse("5:ff0000,00ff00,0000ff,fff,f0f\n5:123,456,789,abc,def\n", false);
        let player = Player::new(sequence, PlayPolicy::Once, 255);

        let sink = LedSink::open_root(root.path()).unwrap();
        let report = player.play(sink).unwrap();

        assert_eq!(report.exit, ExitReason::Completed);
        assert_eq!(report.passes, 1);
        assert_eq!(report.frames_applied, 2);
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(read_channels(root.path()).iter().all(|v| v == "0"));
    }

    #[test]
    fn test_repeat_plays_every_pass() {
        let (sink, probes) = recording_sink();
        let sequence = script::parse("0:fff\n0:000\n", false);
        let report = Player::new(sequence, PlayPolicy::Repeat(3), 255).play(sink).unwrap();

        assert_eq!(report.passes, 3);
        assert_eq!(report.frames_applied, 6);
        // six frames plus the final reset
        assert_eq!(probes[0].write_count(), 7);
        assert_eq!(probes[0].last().as_deref(), Some("0"));
    }

    #[test]
    fn test_malformed_frame_is_skipped_without_delay() {
        let (sink, probes) = recording_sink();
        let sequence = script::parse("0:ff0000\nabc:ff0000,00ff00\n0:00ff00\n", false);
        let start = Instant::now();
        let report = Player::new(sequence, PlayPolicy::Once, 255).play(sink).unwrap();

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(report.frames_applied, 2);
        assert_eq!(report.frames_skipped, 1);
        // two valid frames and the reset; nothing for the bad line
        assert_eq!(probes[0].write_count(), 3);
        assert_eq!(probes[3].write_count(), 1);
    }

    #[test]
    fn test_duration_policy_stops_at_frame_boundary() {
        let (sink, _probes) = recording_sink();
        // 500ms per pass
        let sequence = script::parse("100:f00\n200:0f0\n200:00f\n", false);
        let player = Player::new(sequence, PlayPolicy::For(Duration::from_secs(2)), 255);

        let start = Instant::now();
        let report = player.play(sink).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(report.exit, ExitReason::Completed);
        assert!(report.passes >= 4, "only {} passes", report.passes);
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2000 + 200 + 150), "overran: {:?}", elapsed);
    }

    #[test]
    fn test_cancel_mid_sleep_stops_promptly() {
        let root = fake_led_root();
        let sequence = script::parse("5000:fff,fff,fff,fff,fff\n", false);
        let player = Player::new(sequence, PlayPolicy::Forever, 200);
        let sink = LedSink::open_root(root.path()).unwrap();
        let handle = player.spawn(sink).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(handle.state(), PlayerState::Running);
        assert!(read_channels(root.path()).iter().all(|v| v == "200"));

        let start = Instant::now();
        let report = handle.stop().unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(report.exit, ExitReason::Cancelled);
        assert!(read_channels(root.path()).iter().all(|v| v == "0"));
    }

    #[test]
    fn test_forever_with_no_playable_frames_ends() {
        let (sink, _) = recording_sink();
        let sequence = script::parse("bad line\nx:fff\n", false);
        let report = Player::new(sequence, PlayPolicy::Forever, 255).play(sink).unwrap();
        assert_eq!(report.passes, 1);
        assert_eq!(report.frames_skipped, 2);
    }

    #[test]
    fn test_write_failure_still_resets() {
        let good = RecordingChannel::default();
        let sink = LedSink::from_writers(vec![
            ("r".to_string(), good.clone()),
            ("g".to_string(), RecordingChannel::failing()),
            ("b".to_string(), RecordingChannel::default()),
        ]);
        let player = Player::new(script::parse("0:fff\n", false), PlayPolicy::Once, 255);
        let result = player.play(sink);

        assert!(matches!(result, Err(LightbarError::ChannelUnavailable { .. })));
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(good.last().as_deref(), Some("0"));
    }
}
