//! Configuration validation and merging.
//!
//! # Responsibilities
//! - Turn the raw user/internal documents into a [`CanonicalConfig`]
//! - Replace out-of-range or unknown values with documented defaults
//! - Union internal mapping entries into the user's mappings
//!
//! # Design Decisions
//! - Never fails: every problem becomes a [`ConfigWarning`] plus a default
//! - Pure function, so the store can validate before publishing anything
//! - Scalars come only from the user document

use std::fmt;

use toml::Value;

use crate::config::schema::{
    CanonicalConfig, ControllerKind, IndexMapping, InternalDocument, NoiseReduction,
    SerialSettings, UdpSettings, UserDocument, DEFAULT_BAUD_RATE, DEFAULT_COM_PORT,
    DEFAULT_UDP_PORT,
};

pub const KEY_SLIDER_MAPPING: &str = "slider_mapping";
pub const KEY_BUTTON_MAPPING: &str = "button_mapping";
pub const KEY_INVERT_SLIDERS: &str = "invert_sliders";
pub const KEY_COM_PORT: &str = "com_port";
pub const KEY_BAUD_RATE: &str = "baud_rate";
pub const KEY_UDP_PORT: &str = "udp_port";
pub const KEY_CONTROLLER_TYPE: &str = "controller_type";
pub const KEY_NOISE_REDUCTION: &str = "noise_reduction";

/// A value that was replaced by its default during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
    pub invalid_value: String,
    pub default_value: String,
}

impl ConfigWarning {
    fn new(key: &str, invalid_value: impl ToString, default_value: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            invalid_value: invalid_value.to_string(),
            default_value: default_value.to_string(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} {:?}, using {:?}",
            self.key, self.invalid_value, self.default_value
        )
    }
}

/// Merge and validate the two documents into a canonical snapshot.
pub fn normalize(
    user: UserDocument,
    internal: Option<InternalDocument>,
) -> (CanonicalConfig, Vec<ConfigWarning>) {
    let mut warnings = Vec::new();
    let internal = internal.unwrap_or_default();

    let slider_mapping = merge_mappings(
        KEY_SLIDER_MAPPING,
        user.slider_mapping,
        internal.slider_mapping,
        &mut warnings,
    );
    let button_mapping = merge_mappings(
        KEY_BUTTON_MAPPING,
        user.button_mapping,
        internal.button_mapping,
        &mut warnings,
    );

    let controller = scalar(
        KEY_CONTROLLER_TYPE,
        user.controller_type,
        ControllerKind::default(),
        |value| as_string(value).and_then(|raw| ControllerKind::parse(&raw)),
        &mut warnings,
    );

    let baud_rate = scalar(
        KEY_BAUD_RATE,
        user.baud_rate,
        DEFAULT_BAUD_RATE,
        |value| {
            as_integer(value)
                .and_then(|raw| u32::try_from(raw).ok())
                .filter(|rate| *rate > 0)
        },
        &mut warnings,
    );

    let udp_port = scalar(
        KEY_UDP_PORT,
        user.udp_port,
        DEFAULT_UDP_PORT,
        |value| {
            as_integer(value)
                .and_then(|raw| u16::try_from(raw).ok())
                .filter(|port| *port > 0)
        },
        &mut warnings,
    );

    let noise_reduction = scalar(
        KEY_NOISE_REDUCTION,
        user.noise_reduction,
        NoiseReduction::default(),
        |value| as_string(value).and_then(|raw| NoiseReduction::parse(&raw)),
        &mut warnings,
    );

    let invert_sliders = scalar(KEY_INVERT_SLIDERS, user.invert_sliders, false, as_bool, &mut warnings);

    // An empty port name means "not set", not "invalid".
    let com_port = scalar(
        KEY_COM_PORT,
        user.com_port,
        DEFAULT_COM_PORT.to_string(),
        as_string,
        &mut warnings,
    );
    let com_port = match com_port.trim() {
        "" => DEFAULT_COM_PORT.to_string(),
        trimmed => trimmed.to_string(),
    };

    for warning in &warnings {
        tracing::warn!(
            key = %warning.key,
            invalid_value = %warning.invalid_value,
            default_value = %warning.default_value,
            "Invalid configuration value, using default"
        );
    }

    let config = CanonicalConfig {
        slider_mapping,
        button_mapping,
        controller,
        serial: SerialSettings {
            com_port,
            baud_rate,
        },
        udp: UdpSettings { port: udp_port },
        invert_sliders,
        noise_reduction,
    };

    (config, warnings)
}

/// Convert a present value, or fall back to `default` with a warning.
fn scalar<T: ToString>(
    key: &str,
    raw: Option<Value>,
    default: T,
    convert: impl FnOnce(&Value) -> Option<T>,
    warnings: &mut Vec<ConfigWarning>,
) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match convert(&raw) {
        Some(value) => value,
        None => {
            warnings.push(ConfigWarning::new(key, display_value(&raw), default.to_string()));
            default
        }
    }
}

/// Integers, whole floats and numeric strings.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(raw) => Some(*raw),
        Value::Float(raw) if raw.is_finite() && raw.fract() == 0.0 => Some(*raw as i64),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(raw) => Some(*raw),
        Value::Integer(raw) => Some(*raw != 0),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => Some(true),
            "0" | "f" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Strings as-is; other scalars in their TOML spelling.
fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.clone()),
        Value::Integer(raw) => Some(raw.to_string()),
        Value::Float(raw) => Some(raw.to_string()),
        Value::Boolean(raw) => Some(raw.to_string()),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// User entries first, then internal entries unioned in per index.
fn merge_mappings(
    key: &str,
    user: Option<Value>,
    internal: Option<Value>,
    warnings: &mut Vec<ConfigWarning>,
) -> IndexMapping {
    let mut mapping = IndexMapping::new();
    let entries = mapping_entries(key, user, warnings)
        .into_iter()
        .chain(mapping_entries(key, internal, warnings));

    for (raw_index, value) in entries {
        let entry_key = format!("{}.{}", key, raw_index);
        let Ok(index) = raw_index.trim().parse::<usize>() else {
            warnings.push(ConfigWarning::new(&entry_key, &raw_index, "entry skipped"));
            continue;
        };
        let Some(targets) = mapping_targets(&value) else {
            warnings.push(ConfigWarning::new(&entry_key, display_value(&value), "entry skipped"));
            continue;
        };
        mapping.extend(index, normalize_identifiers(targets));
    }
    mapping
}

fn mapping_entries(
    key: &str,
    raw: Option<Value>,
    warnings: &mut Vec<ConfigWarning>,
) -> Vec<(String, Value)> {
    match raw {
        None => Vec::new(),
        Some(Value::Table(table)) => table.into_iter().collect(),
        Some(other) => {
            warnings.push(ConfigWarning::new(key, display_value(&other), "empty mapping"));
            Vec::new()
        }
    }
}

/// `0 = "master"` or `1 = ["chrome.exe", "firefox.exe"]`.
fn mapping_targets(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(as_string).collect(),
        other => as_string(other).map(|target| vec![target]),
    }
}

fn normalize_identifiers(values: Vec<String>) -> impl Iterator<Item = String> {
    values
        .into_iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
}
