//! Slider frame decoding.
//!
//! Devices send one line per reading: raw 10-bit values separated by `|`,
//! e.g. `512|1023|0`. The decoder normalizes them, applies the invert flag
//! and only reports sliders that moved further than the noise threshold.

use crate::config::schema::NoiseReduction;
use crate::controller::SliderMoveEvent;

pub const MAX_RAW_VALUE: u16 = 1023;

/// Parse one line into raw values. `None` for anything malformed.
pub fn parse_line(line: &str) -> Option<Vec<u16>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    line.split('|')
        .map(|part| {
            part.trim()
                .parse::<u16>()
                .ok()
                .filter(|value| *value <= MAX_RAW_VALUE)
        })
        .collect()
}

/// Map a raw reading onto [0, 1], rounded to two decimals.
pub fn normalize(raw: u16) -> f32 {
    let scaled = f32::from(raw) / f32::from(MAX_RAW_VALUE);
    (scaled * 100.0).round() / 100.0
}

fn is_significant(previous: Option<f32>, current: f32, threshold: f32) -> bool {
    match previous {
        None => true,
        Some(previous) if current == 0.0 || current == 1.0 => previous != current,
        Some(previous) => (current - previous).abs() >= threshold,
    }
}

#[derive(Debug, Clone)]
pub struct FrameDecoder {
    last: Vec<Option<f32>>,
    invert: bool,
    noise: NoiseReduction,
}

impl FrameDecoder {
    pub fn new(invert: bool, noise: NoiseReduction) -> Self {
        Self {
            last: Vec::new(),
            invert,
            noise,
        }
    }

    /// Pick up reloaded settings. Flipping the invert flag forgets the last
    /// readings so every slider is reported again.
    pub fn apply_settings(&mut self, invert: bool, noise: NoiseReduction) {
        if invert != self.invert {
            self.last.clear();
        }
        self.invert = invert;
        self.noise = noise;
    }

    pub fn feed(&mut self, line: &str) -> Vec<SliderMoveEvent> {
        let Some(values) = parse_line(line) else {
            tracing::debug!(line, "Ignoring malformed slider line");
            return Vec::new();
        };

        if values.len() != self.last.len() {
            self.last.resize(values.len(), None);
        }

        let threshold = self.noise.threshold();
        let mut moves = Vec::new();
        for (slider_id, raw) in values.into_iter().enumerate() {
            let mut percent = normalize(raw);
            if self.invert {
                percent = 1.0 - percent;
            }

            if is_significant(self.last[slider_id], percent, threshold) {
                self.last[slider_id] = Some(percent);
                moves.push(SliderMoveEvent { slider_id, percent });
            }
        }
        moves
    }
}
