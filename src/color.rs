// Color Module - Hex token decoding, brightness scaling and named colors

use crate::types::{LightbarError, Rgb};

// Name used by the settings file to select the free-form hex color instead of a preset
pub const HEX_COLOR_NAME: &str = "hex color code";

/// Preset colors offered by the service settings (name, hex)
pub fn named_colors() -> &'static [(&'static str, &'static str)] {
    &[
        ("white", "FFFFFF"),
        ("red", "FF0000"),
        ("orange", "FF3300"),
        ("yellow", "FFFF00"),
        ("light green", "33FF00"),
        ("green", "00FF00"),
        ("cyan", "00FF33"),
        ("light blue", "00FFFF"),
        ("blue", "0066FF"),
        ("dark blue", "0000FF"),
        ("indigo", "3300FF"),
        ("purple", "FF00FF"),
        ("magenta", "FF0033"),
    ]
}

/// Decode a 3- or 6-digit hex token into an RGB triple scaled to `max_brightness`.
///
/// A 3-digit token is expanded by doubling each digit ("f0a" becomes "ff00aa").
/// Each byte is rescaled as `floor(byte * max_brightness / 255)`.
pub fn decode(token: &str, max_brightness: u8) -> Result<Rgb, LightbarError> {
    let expanded: String = match token.chars().count() {
        3 => token.chars().flat_map(|c| [c, c]).collect(),
        6 => token.to_string(),
        _ => return Err(LightbarError::InvalidTokenLength(token.to_string())),
    };

    // from_str_radix tolerates a leading '+', so check digits up front
    if !expanded.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LightbarError::InvalidHexDigit(token.to_string()));
    }

    let byte = |i: usize| -> Result<u8, LightbarError> {
        u8::from_str_radix(&expanded[i..i + 2], 16)
            .map_err(|_| LightbarError::InvalidHexDigit(token.to_string()))
    };

    Ok(Rgb {
        r: scale(byte(0)?, max_brightness),
        g: scale(byte(2)?, max_brightness),
        b: scale(byte(4)?, max_brightness),
    })
}

/// Linear 0-255 rescale of one channel
pub fn scale(value: u8, max_brightness: u8) -> u8 {
    (value as u32 * max_brightness as u32 / 255) as u8
}

/// Map a 0-100% brightness setting onto the 0-255 output scale
pub fn percent_to_brightness(percent: u8) -> u8 {
    (percent.min(100) as u32 * 255 / 100) as u8
}

/// Parse a user supplied color, accepting an optional leading '#'
pub fn parse_user_color(value: &str, max_brightness: u8) -> Result<Rgb, LightbarError> {
    decode(value.trim().trim_start_matches('#'), max_brightness)
}

/// Resolve the service color setting to an unscaled RGB value.
/// Unknown names and unparseable hex fall back to white.
pub fn resolve_setting_color(color_name: &str, hex_color: &str) -> Rgb {
    let name = color_name.trim();

    let hex = if name.eq_ignore_ascii_case(HEX_COLOR_NAME) {
        let hex = hex_color.trim().trim_start_matches('#');
        if hex.is_empty() { "FFFFFF" } else { hex }
    } else {
        named_colors()
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, hex)| *hex)
            .unwrap_or("FFFFFF")
    };

    match decode(hex, 255) {
        Ok(rgb) => rgb,
        Err(e) => {
            log::warn!("{}, falling back to white", e);
            Rgb::WHITE
        }
    }
}
