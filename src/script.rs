// Script Module - Animation file parsing and loop-block expansion
//
// File format, one frame per line:
//   <delay_ms>:<c1>,<c2>,<c3>,<c4>,<c5>
// Blank lines and '#' lines are comments. With loop expansion enabled,
// "loop <N>" repeats the following lines (up to the next blank line) N times.
use std::path::Path;
use std::time::Duration;

use crate::types::LightbarError;

/// One timed color instruction for the LED bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub delay_ms: u64,
    pub colors: Vec<String>,
}

impl Frame {
    /// Parse "<delay>:<frame-data>"; the delay must be a non-negative integer
    pub fn parse(line: &str) -> Result<Self, LightbarError> {
        let (delay, data) = line
            .split_once(':')
            .ok_or_else(|| LightbarError::MalformedFrameLine(line.to_string()))?;

        let delay_ms = delay
            .trim()
            .parse::<u64>()
            .map_err(|_| LightbarError::MalformedFrameLine(line.to_string()))?;

        // Tokens are taken verbatim; padding makes them the wrong length
        let colors = data.split(',').map(str::to_string).collect();

        Ok(Frame { delay_ms, colors })
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Ordered frame source lines, loop blocks already expanded.
/// Lines are parsed into frames as they are played, so a malformed
/// line only costs itself and never the rest of the animation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSequence {
    lines: Vec<String>,
}

impl FrameSequence {
    pub fn from_lines(lines: Vec<String>) -> Self {
        FrameSequence { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn frames(&self) -> impl Iterator<Item = Result<Frame, LightbarError>> + '_ {
        self.lines().iter().map(|line| Frame::parse(line))
    }
}

fn is_loop_line(line: &str) -> bool {
    line.get(..4).is_some_and(|head| head.eq_ignore_ascii_case("loop"))
}

/// Turn animation file text into a frame sequence
pub fn parse(text: &str, expand_loops: bool) -> FrameSequence {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    if !expand_loops {
        let kept = lines
            .iter()
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !is_loop_line(line))
            .map(|line| line.to_string())
            .collect();
        return FrameSequence::from_lines(kept);
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if is_loop_line(line) {
            let count = match line.split_whitespace().nth(1).map(str::parse::<i64>) {
                Some(Ok(n)) => n,
                _ => {
                    // No usable count: drop just this line, the block below plays once
                    log::debug!("Ignoring loop line without count: {:?}", line);
                    i += 1;
                    continue;
                }
            };

            let start = i + 1;
            let end = lines[start..]
                .iter()
                .position(|l| l.is_empty())
                .map_or(lines.len(), |offset| start + offset);

            for _ in 0..count.max(0) {
                out.extend(lines[start..end].iter().map(|l| l.to_string()));
            }
            // Skip the block and its terminating blank line
            i = end + 1;
            continue;
        }

        if !line.is_empty() && !line.starts_with('#') {
            out.push(line.to_string());
        }
        i += 1;
    }

    FrameSequence::from_lines(out)
}

/// Read and parse an animation file
pub fn load_file(path: &Path, expand_loops: bool) -> Result<FrameSequence, LightbarError> {
    if !path.exists() {
        return Err(LightbarError::FileNotFound(path.to_path_buf()));
    }

    let text = std::fs::read_to_string(path).map_err(|source| LightbarError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let sequence = parse(&text, expand_loops);
    log::debug!("Loaded {} frame lines from {}", sequence.len(), path.display());
    Ok(sequence)
}
