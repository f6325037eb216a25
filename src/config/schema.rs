//! Configuration schema definitions.
//!
//! Two layers live here:
//! - [`UserDocument`] / [`InternalDocument`]: the raw shape of the TOML files,
//!   deserialized with serde. Every field has a default so a minimal (or
//!   empty) file is valid.
//! - [`CanonicalConfig`]: the validated, merged snapshot handed to the rest
//!   of the process. Built by `validation::normalize`, never mutated after.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_COM_PORT: &str = "COM4";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_UDP_PORT: u16 = 16990;

/// The user-editable document (`config.toml`).
///
/// Every field is kept as a raw TOML value: a value of the wrong type is a
/// validation warning, not a parse failure. Only broken TOML syntax fails
/// the load.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UserDocument {
    pub slider_mapping: Option<toml::Value>,
    pub button_mapping: Option<toml::Value>,
    pub invert_sliders: Option<toml::Value>,
    pub com_port: Option<toml::Value>,
    pub baud_rate: Option<toml::Value>,
    pub noise_reduction: Option<toml::Value>,
    pub udp_port: Option<toml::Value>,
    pub controller_type: Option<toml::Value>,
}

/// The program-managed document (`preferences.toml`). Only the mapping keys
/// are honoured; anything else in the file is ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InternalDocument {
    pub slider_mapping: Option<toml::Value>,
    pub button_mapping: Option<toml::Value>,
}

/// Which transport drives the sliders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerKind {
    #[default]
    Serial,
    Udp,
}

impl ControllerKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "serial" => Some(ControllerKind::Serial),
            "udp" => Some(ControllerKind::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerKind::Serial => "serial",
            ControllerKind::Udp => "udp",
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How aggressively small slider movements are filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NoiseReduction {
    Low,
    #[default]
    Default,
    High,
}

impl NoiseReduction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(NoiseReduction::Low),
            "default" => Some(NoiseReduction::Default),
            "high" => Some(NoiseReduction::High),
            _ => None,
        }
    }

    /// Minimum change on the normalized [0, 1] scale that counts as a move.
    pub fn threshold(&self) -> f32 {
        match self {
            NoiseReduction::Low => 0.015,
            NoiseReduction::Default => 0.025,
            NoiseReduction::High => 0.035,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseReduction::Low => "low",
            NoiseReduction::Default => "default",
            NoiseReduction::High => "high",
        }
    }
}

impl fmt::Display for NoiseReduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serial connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub com_port: String,
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            com_port: DEFAULT_COM_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// UDP listener parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpSettings {
    pub port: u16,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_UDP_PORT,
        }
    }
}

/// Index → list of identifiers. Ordered by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMapping {
    entries: BTreeMap<usize, Vec<String>>,
}

impl IndexMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add identifiers to an index, skipping ones already present.
    pub fn extend(&mut self, index: usize, identifiers: impl IntoIterator<Item = String>) {
        let slot = self.entries.entry(index).or_default();
        for identifier in identifiers {
            if !slot.contains(&identifier) {
                slot.push(identifier);
            }
        }
        if slot.is_empty() {
            self.entries.remove(&index);
        }
    }

    pub fn get(&self, index: usize) -> &[String] {
        self.entries.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.entries.iter().map(|(index, ids)| (*index, ids.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for IndexMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (index, ids)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: [{}]", index, ids.join(", "))?;
        }
        f.write_str("}")
    }
}

/// The validated, merged configuration snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalConfig {
    pub slider_mapping: IndexMapping,
    pub button_mapping: IndexMapping,
    pub controller: ControllerKind,
    pub serial: SerialSettings,
    pub udp: UdpSettings,
    pub invert_sliders: bool,
    pub noise_reduction: NoiseReduction,
}
