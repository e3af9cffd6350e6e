// Service Module - Long-running LED service driven by the settings file
//
// A monitor loop waits for host notifications. On settings change the running
// player is stopped and joined before the next one is built, so at most one
// player ever owns the LED channels.
use anyhow::{Context, Result};
use notify::{Config, Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::color;
use crate::config::Settings;
use crate::player::{Player, PlayerHandle};
use crate::script;
use crate::sink::LedSink;
use crate::types::{PlayPolicy, Rgb, Signal};

// Upper bound on one wait of the monitor loop
pub const MONITOR_POLL: Duration = Duration::from_secs(1);

// Editors emit several events per save; collapse those arriving within this window
const SETTINGS_DEBOUNCE: Duration = Duration::from_millis(200);

/// Source of host lifecycle notifications
pub trait NotificationSource {
    fn wait_for_signal(&mut self, timeout: Duration) -> Signal;
}

/// Notifications delivered over a channel: Ctrl+C / SIGTERM and settings file changes
pub struct HostNotifier {
    rx: Receiver<Signal>,
    _watcher: Option<RecommendedWatcher>,
}

impl HostNotifier {
    pub fn from_channel(rx: Receiver<Signal>) -> Self {
        HostNotifier { rx, _watcher: None }
    }

    /// Hook process termination and watch `settings_path` for modifications
    pub fn install(settings_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let abort_tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = abort_tx.send(Signal::Abort);
        })
        .context("Failed to install shutdown handler")?;

        let mut notifier = HostNotifier::from_channel(rx);
        match watch_settings(settings_path, tx) {
            Ok(watcher) => notifier._watcher = Some(watcher),
            Err(e) => log::warn!("Could not watch settings file for changes: {:#}", e),
        }
        Ok(notifier)
    }
}

impl NotificationSource for HostNotifier {
    fn wait_for_signal(&mut self, timeout: Duration) -> Signal {
        match self.rx.recv_timeout(timeout) {
            Ok(Signal::SettingsChanged) => {
                // Drain the rest of the burst; an abort inside it wins
                while let Ok(next) = self.rx.recv_timeout(SETTINGS_DEBOUNCE) {
                    if next == Signal::Abort {
                        return Signal::Abort;
                    }
                }
                Signal::SettingsChanged
            }
            Ok(signal) => signal,
            Err(RecvTimeoutError::Timeout) => Signal::None,
            // Nobody left to notify us
            Err(RecvTimeoutError::Disconnected) => Signal::Abort,
        }
    }
}

/// Watch the settings file's directory so replaced files are still noticed
pub fn watch_settings(settings_path: &Path, tx: Sender<Signal>) -> Result<RecommendedWatcher> {
    let dir = settings_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let file_name = settings_path.file_name().map(|name| name.to_os_string());

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<NotifyEvent>| {
            let Ok(event) = res else { return };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let ours = event
                .paths
                .iter()
                .any(|path| path.file_name().map(|name| name.to_os_string()) == file_name);
            if ours {
                let _ = tx.send(Signal::SettingsChanged);
            }
        },
        Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// What the settings ask the LED bar to do
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceAction {
    Off,
    Solid(Rgb),
    Animate {
        file: PathBuf,
        expand_loops: bool,
        brightness: u8,
    },
}

pub fn plan(settings: &Settings) -> ServiceAction {
    if !settings.enabled {
        return ServiceAction::Off;
    }

    let brightness = settings.brightness_scale();
    if settings.animation_enabled && !settings.animation_file.is_empty() {
        return ServiceAction::Animate {
            file: PathBuf::from(&settings.animation_file),
            expand_loops: settings.animation_loops,
            brightness,
        };
    }

    let rgb = color::resolve_setting_color(&settings.color_name, &settings.color);
    ServiceAction::Solid(Rgb::new(
        color::scale(rgb.r, brightness),
        color::scale(rgb.g, brightness),
        color::scale(rgb.b, brightness),
    ))
}

pub struct Service {
    settings_path: PathBuf,
    active: Option<PlayerHandle>,
}

impl Service {
    pub fn new(settings_path: PathBuf) -> Self {
        Service { settings_path, active: None }
    }

    pub fn is_animating(&self) -> bool {
        self.active.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop and join the running player, if any
    pub fn stop_active(&mut self) {
        if let Some(handle) = self.active.take() {
            log::debug!("Stopping animation ({:?})", handle.state());
            match handle.stop() {
                Ok(report) => log::info!("Animation stopped after {} frames", report.frames_applied),
                Err(e) => log::error!("Animation ended with error: {:#}", e),
            }
        }
    }

    // A player that ended by itself (write failure) is joined so its error gets logged
    fn reap_finished(&mut self) {
        if self.active.is_some() && !self.is_animating() {
            if let Some(handle) = self.active.take() {
                if let Err(e) = handle.join() {
                    log::error!("Animation ended with error: {:#}", e);
                }
            }
        }
    }

    /// Re-read the settings and bring the LED bar in line with them
    pub fn apply_settings(&mut self) -> Result<()> {
        self.stop_active();

        let settings = Settings::load_or_create(&self.settings_path)?;
        let led_root = PathBuf::from(&settings.led_root);

        match plan(&settings) {
            ServiceAction::Off => {
                log::info!("LED controller disabled, turning LEDs off");
                LedSink::open_root(&led_root)?.reset()?;
            }
            ServiceAction::Solid(rgb) => {
                log::info!("Setting static color {:?}", rgb);
                let mut sink = LedSink::open_root(&led_root)?;
                sink.apply_solid(rgb)?;
                // Handles close here; the color stays on
            }
            ServiceAction::Animate { file, expand_loops, brightness } => {
                let sequence = script::load_file(&file, expand_loops)?;
                let sink = LedSink::open_root(&led_root)?;
                let player = Player::new(sequence, PlayPolicy::Forever, brightness);
                self.active = Some(player.spawn(sink)?);
                log::info!("Playing {}", file.display());
            }
        }
        Ok(())
    }

    /// Monitor loop: runs until the source reports an abort
    pub fn run<N: NotificationSource>(&mut self, source: &mut N) -> Result<()> {
        if let Err(e) = self.apply_settings() {
            log::error!("Failed to start LED service: {:#}", e);
        }

        loop {
            match source.wait_for_signal(MONITOR_POLL) {
                Signal::None => self.reap_finished(),
                Signal::SettingsChanged => {
                    log::info!("Settings changed, restarting");
                    if let Err(e) = self.apply_settings() {
                        log::error!("Failed to apply settings: {:#}", e);
                    }
                }
                Signal::Abort => {
                    log::info!("Shutdown requested");
                    self.stop_active();
                    return Ok(());
                }
            }
        }
    }
}
