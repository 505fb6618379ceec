//! Decoding of ffmpeg's `-stats` lines into progress samples.

use regex::Regex;
use std::sync::LazyLock;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=\s*(\d{1,2}):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid time regex")
});
static SPEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"speed=\s*([0-9.]+)x").expect("valid speed regex"));

const MAX_ETA_SECONDS: f64 = 24.0 * 3600.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    pub percent: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub speed: Option<String>,
}

impl ProgressSample {
    pub fn is_empty(&self) -> bool {
        self.percent.is_none() && self.eta_seconds.is_none() && self.speed.is_none()
    }
}

/// ETA and speed are only meaningful between 5% and 99%.
pub fn in_eta_band(percent: f64) -> bool {
    (5.0..99.0).contains(&percent)
}

/// Parses one diagnostic line. Lines that are not progress-bearing, or that
/// fail to parse in any way, yield an empty sample.
pub fn parse(line: &str, total_duration: f64) -> ProgressSample {
    try_parse(line.trim(), total_duration).unwrap_or_default()
}

fn try_parse(line: &str, total_duration: f64) -> Option<ProgressSample> {
    let has_markers = line.contains("frame=")
        && line.contains("time=")
        && (line.contains("speed=") || line.contains("fps="));
    if !has_markers || !(total_duration > 0.0) || !total_duration.is_finite() {
        return None;
    }

    let caps = TIME_RE.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let elapsed = hours * 3600.0 + minutes * 60.0 + seconds;

    let percent = (elapsed / total_duration * 100.0).min(100.0);
    if percent < 0.0 {
        return None;
    }

    let speed_factor = match SPEED_RE.captures(line) {
        Some(caps) => Some(caps[1].parse::<f64>().ok()?),
        None => None,
    };

    let eta_seconds = speed_factor.and_then(|factor| {
        if !in_eta_band(percent) || factor <= 0.1 {
            return None;
        }
        let remaining = total_duration - elapsed;
        (remaining > 0.0).then(|| (remaining / factor).min(MAX_ETA_SECONDS) as u64)
    });

    Some(ProgressSample {
        percent: Some(percent),
        eta_seconds,
        speed: speed_factor.map(format_speed),
    })
}

pub fn format_speed(factor: f64) -> String {
    if factor >= 10.0 {
        format!("{:.0}x", factor)
    } else if factor >= 1.0 {
        format!("{:.1}x", factor)
    } else {
        format!("{:.2}x", factor)
    }
}
