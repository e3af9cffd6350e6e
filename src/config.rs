// Config Module - Command-line argument parsing and service settings management
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::color;
use crate::sink::DEFAULT_LED_ROOT;
use crate::types::PlayPolicy;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fire Cube LED bar controller",
    long_about = "Drives the 5-position RGB LED bar through its sysfs brightness channels.\n\
                  Plays timed animation files, sets a static color, or runs as a background\n\
                  service that follows a settings file and restarts when it changes."
)]
pub struct Args {
    /// Maximum brightness (0-255)
    #[arg(short, long, default_value_t = 128)]
    pub brightness: u8,

    /// Path to file with frame data
    #[arg(short, long, conflicts_with_all = ["color", "service"])]
    pub file: Option<PathBuf>,

    /// Set a solid color for all LEDs (3 or 6 digit hex)
    #[arg(short, long, conflicts_with = "service")]
    pub color: Option<String>,

    /// Loop time in seconds
    #[arg(short, long, conflicts_with_all = ["number", "infinity"])]
    pub time: Option<u64>,

    /// Number of times to loop the animation
    #[arg(short, long, conflicts_with = "infinity")]
    pub number: Option<u32>,

    /// Loop the animation indefinitely
    #[arg(short, long)]
    pub infinity: bool,

    /// Use in-file loop instructions
    #[arg(short, long)]
    pub animate: bool,

    /// Run as a background service driven by the settings file
    #[arg(long)]
    pub service: bool,

    /// Settings file path or name (e.g., --cfg /full/path or --cfg bar for ~/.config/lightbar/bar.conf)
    #[arg(long)]
    pub cfg: Option<String>,

    /// Directory containing the ledN/brightness channel files
    #[arg(long, default_value = DEFAULT_LED_ROOT)]
    pub led_root: PathBuf,
}

/// What the command line asked for, after validation
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Solid {
        color: String,
        brightness: u8,
    },
    Animate {
        file: PathBuf,
        expand_loops: bool,
        policy: PlayPolicy,
        brightness: u8,
    },
    Service {
        cfg: Option<String>,
    },
}

impl Args {
    pub fn invocation(&self) -> Result<Invocation> {
        if self.service {
            return Ok(Invocation::Service { cfg: self.cfg.clone() });
        }

        if let Some(ref color) = self.color {
            if self.timing_flags() > 0 {
                log::warn!("Timing options have no effect with --color");
            }
            return Ok(Invocation::Solid { color: color.clone(), brightness: self.brightness });
        }

        let Some(ref file) = self.file else {
            bail!("one of --file, --color or --service is required");
        };

        let policy = match (self.time, self.number, self.infinity) {
            (Some(seconds), None, false) => PlayPolicy::For(Duration::from_secs(seconds)),
            (None, Some(1), false) => PlayPolicy::Once,
            (None, Some(count), false) => PlayPolicy::Repeat(count),
            (None, None, true) => PlayPolicy::Forever,
            (None, None, false) => bail!("--file requires one of --time, --number or --infinity"),
            _ => bail!("only one of --time, --number or --infinity may be given"),
        };

        Ok(Invocation::Animate {
            file: file.clone(),
            expand_loops: self.animate,
            policy,
            brightness: self.brightness,
        })
    }

    fn timing_flags(&self) -> usize {
        [self.time.is_some(), self.number.is_some(), self.infinity]
            .iter()
            .filter(|set| **set)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    pub config_path: Option<PathBuf>,  // Where the settings were loaded from (not serialized)

    pub enabled: bool,             // false turns the bar off and starts nothing
    pub color_name: String,        // Preset name, or "hex color code" to use `color`
    pub color: String,             // Hex color used with "hex color code"
    pub brightness: u32,           // Percent 0-100
    pub animation_enabled: bool,
    pub animation_file: String,
    pub animation_loops: bool,     // Honor "loop N" blocks in the animation file
    pub led_root: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            config_path: None,
            enabled: true,
            color_name: "white".to_string(),
            color: "FFFFFF".to_string(),
            brightness: 50,
            animation_enabled: false,
            animation_file: "".to_string(),
            animation_loops: false,
            led_root: DEFAULT_LED_ROOT.to_string(),
        }
    }
}

impl Settings {
    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            let path = PathBuf::from(cfg);
            if path.is_absolute() || cfg.contains('/') || cfg.contains('\\') {
                return Ok(path);
            }

            // Otherwise treat as a settings name in the config directory
            let filename = if cfg.ends_with(".conf") {
                cfg.to_string()
            } else {
                format!("{}.conf", cfg)
            };
            Ok(Self::config_dir()?.join(filename))
        } else {
            Ok(Self::config_dir()?.join("settings.conf"))
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(".config").join("lightbar"))
    }

    pub fn load_with_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let mut parsed: Self = toml::from_str(&contents)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        parsed.config_path = Some(path.to_path_buf());
        parsed.sanitize();
        Ok(parsed)
    }

    /// Load the settings file, writing a default one first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Creating default settings file {}", path.display());
            let mut settings = Settings::default();
            settings.config_path = Some(path.to_path_buf());
            settings.save()?;
            return Ok(settings);
        }
        Self::load_with_path(path)
    }

    /// Trim strings and clamp numbers to their valid ranges
    pub fn sanitize(&mut self) {
        self.color_name = self.color_name.trim().to_lowercase();
        self.color = self.color.trim().trim_start_matches('#').to_uppercase();
        self.animation_file = self.animation_file.trim().to_string();
        self.led_root = self.led_root.trim().to_string();
        if self.led_root.is_empty() {
            self.led_root = DEFAULT_LED_ROOT.to_string();
        }
        self.brightness = self.brightness.min(100);
    }

    /// Output scale (0-255) for the brightness percentage
    pub fn brightness_scale(&self) -> u8 {
        color::percent_to_brightness(self.brightness.min(100) as u8)
    }

    pub fn save(&self) -> Result<()> {
        let path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::config_path(None)?,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut sanitized = self.clone();
        sanitized.sanitize();

        // Build TOML with comments manually for better documentation
        let contents = format!(
            r#"# Lightbar Settings File
# The service restarts its animation automatically whenever this file changes

# Turn the LED bar controller on or off (off = all LEDs dark)
enabled = {}

# Preset color name or "hex color code" to use the `color` value below
# Presets: {}
color_name = {}

# Hex color (RRGGBB or RGB) used when color_name = "hex color code"
color = {}

# Brightness in percent (0-100)
brightness = {}

# Play an animation file instead of a static color
animation_enabled = {}

# Path to the animation file
animation_file = {}

# Honor "loop N" blocks inside the animation file
animation_loops = {}

# Directory containing the ledN/brightness channel files
led_root = {}
"#,
            sanitized.enabled,
            color::named_colors().iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", "),
            quote(&sanitized.color_name),
            quote(&sanitized.color),
            sanitized.brightness,
            sanitized.animation_enabled,
            quote(&sanitized.animation_file),
            sanitized.animation_loops,
            quote(&sanitized.led_root),
        );

        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

// TOML string literal with escaping
fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation> {
        let mut argv = vec!["lightbar"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv)?.invocation()
    }

    #[test]
    fn test_solid_color_invocation() {
        let inv = parse(&["-c", "ff0000", "-b", "50"]).unwrap();
        assert_eq!(inv, Invocation::Solid { color: "ff0000".to_string(), brightness: 50 });
    }

    #[test]
    fn test_default_brightness() {
        let inv = parse(&["--color", "fff"]).unwrap();
        assert_eq!(inv, Invocation::Solid { color: "fff".to_string(), brightness: 128 });
    }

    #[test]
    fn test_animation_policies() {
        let policy = |args: &[&str]| match parse(args).unwrap() {
            Invocation::Animate { policy, .. } => policy,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(policy(&["-f", "a.animation", "-t", "2"]), PlayPolicy::For(Duration::from_secs(2)));
        assert_eq!(policy(&["-f", "a.animation", "-n", "1"]), PlayPolicy::Once);
        assert_eq!(policy(&["-f", "a.animation", "-n", "4"]), PlayPolicy::Repeat(4));
        assert_eq!(policy(&["-f", "a.animation", "-i"]), PlayPolicy::Forever);
    }

    #[test]
    fn test_animate_flag_enables_loops() {
        match parse(&["-a", "-n", "1", "-b", "100", "-f", "start.animation"]).unwrap() {
            Invocation::Animate { expand_loops, brightness, file, .. } => {
                assert!(expand_loops);
                assert_eq!(brightness, 100);
                assert_eq!(file, PathBuf::from("start.animation"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_invalid_combinations() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["-f", "a", "-c", "fff"]).is_err());
        assert!(parse(&["-f", "a", "-t", "1", "-n", "2"]).is_err());
        assert!(parse(&["-f", "a", "-n", "2", "-i"]).is_err());
        assert!(parse(&["-f", "a"]).is_err());
        assert!(parse(&["-b", "300", "-c", "fff"]).is_err());
        assert!(parse(&["--service", "-c", "fff"]).is_err());
    }

    #[test]
    fn test_service_invocation() {
        let inv = parse(&["--service", "--cfg", "bar"]).unwrap();
        assert_eq!(inv, Invocation::Service { cfg: Some("bar".to_string()) });
    }

    #[test]
    fn test_config_path_resolution() {
        assert_eq!(Settings::config_path(Some("/tmp/x.conf")).unwrap(), PathBuf::from("/tmp/x.conf"));
        assert_eq!(Settings::config_path(Some("dir/x.conf")).unwrap(), PathBuf::from("dir/x.conf"));
        let named = Settings::config_path(Some("bar")).unwrap();
        assert!(named.ends_with(".config/lightbar/bar.conf"));
    }

    #[test]
    fn test_partial_settings_use_defaults_and_sanitize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.conf");
        std::fs::write(&path, "color_name = \"  Red \"\nbrightness = 250\ncolor = \"#00ff00\"\n").unwrap();

        let settings = Settings::load_with_path(&path).unwrap();
        assert_eq!(settings.color_name, "red");
        assert_eq!(settings.color, "00FF00");
        assert_eq!(settings.brightness, 100);
        assert_eq!(settings.brightness_scale(), 255);
        assert!(settings.enabled);
        assert_eq!(settings.led_root, DEFAULT_LED_ROOT);
        assert_eq!(settings.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_or_create_writes_readable_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.conf");

        let mut created = Settings::load_or_create(&path).unwrap();
        assert!(path.exists());

        created.animation_file = "C:\\anims\\\"quoted\".animation".to_string();
        created.save().unwrap();

        let reloaded = Settings::load_with_path(&path).unwrap();
        assert_eq!(reloaded, created);
    }

    #[test]
    fn test_invalid_settings_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.conf");
        std::fs::write(&path, "brightness = \"loud\"\n").unwrap();
        assert!(Settings::load_with_path(&path).is_err());
    }
}
