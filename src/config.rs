//! Property-based configuration for the control plane, in the same style as
//! the teacher's `SessionConfig`: a typed value enum held in a property bag,
//! with change notification for listeners that care about live updates.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single configuration property's value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl ConfigValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

/// A single property change, delivered to listeners registered via
/// [`Config::add_listener`].
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub property_name: String,
    pub old_value: Option<ConfigValue>,
    pub new_value: ConfigValue,
}

/// Notified whenever a tracked property is set after startup (e.g. `Set()`
/// actions issued over the peer/HTTP surface).
pub trait ConfigChangeListener: Send + Sync {
    fn on_config_changed(&mut self, event: &ConfigChangeEvent);
}

/// Process-wide configuration, populated from CLI arguments at startup and
/// mutable afterward via the `Set` action.
pub struct Config {
    properties: HashMap<String, ConfigValue>,
    listeners: Vec<Box<dyn ConfigChangeListener>>,
}

impl Default for Config {
    fn default() -> Self {
        let mut properties = HashMap::new();
        properties.insert("requestCap".to_string(), ConfigValue::Integer(crate::constants::DEFAULT_REQUEST_CAP as i64));
        properties.insert("preferIpv4".to_string(), ConfigValue::Boolean(false));
        properties.insert("preferIpv6".to_string(), ConfigValue::Boolean(false));
        properties.insert("monoCase".to_string(), ConfigValue::Boolean(false));
        Config { properties, listeners: Vec::new() }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.properties.get(name)
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(ConfigValue::as_string)
    }

    pub fn get_integer(&self, name: &str) -> Option<i64> {
        self.properties.get(name).and_then(ConfigValue::as_integer)
    }

    pub fn get_boolean(&self, name: &str) -> Option<bool> {
        self.properties.get(name).and_then(ConfigValue::as_boolean)
    }

    pub fn request_cap(&self) -> usize {
        self.get_integer("requestCap").unwrap_or(crate::constants::DEFAULT_REQUEST_CAP as i64) as usize
    }

    pub fn add_listener(&mut self, listener: Box<dyn ConfigChangeListener>) {
        self.listeners.push(listener);
    }

    /// Sets a property, notifying listeners with the old and new value.
    pub fn set(&mut self, name: &str, value: ConfigValue) {
        let old_value = self.properties.insert(name.to_string(), value.clone());
        let event = ConfigChangeEvent { property_name: name.to_string(), old_value, new_value: value };
        for listener in &mut self.listeners {
            listener.on_config_changed(&event);
        }
    }
}

/// The subset of CLI options this crate's `main.rs` understands, parsed out
/// of `std::env::args()` (§6.7).
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub scriptport: Option<String>,
    pub httpd: Option<String>,
    pub callback: Option<String>,
    pub cookiefile: Option<String>,
    pub socket: bool,
}

impl CliOptions {
    /// Parses a CLI argument vector (excluding `argv[0]`).
    pub fn parse<I, S>(args: I) -> Result<CliOptions, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut opts = CliOptions::default();
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            let arg = arg.as_ref();
            match arg {
                "-scriptport" => opts.scriptport = Some(require_value(&mut iter, arg)?),
                "-httpd" => opts.httpd = Some(require_value(&mut iter, arg)?),
                "-callback" => opts.callback = Some(require_value(&mut iter, arg)?),
                "-cookiefile" => opts.cookiefile = Some(require_value(&mut iter, arg)?),
                "-socket" => opts.socket = true,
                other => {
                    return Err(ConfigError::InvalidParameter {
                        parameter: "argv".to_string(),
                        value: other.to_string(),
                        reason: "unrecognized option".to_string(),
                    });
                }
            }
        }
        Ok(opts)
    }
}

fn require_value<I, S>(iter: &mut I, flag: &str) -> Result<String, ConfigError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    iter.next()
        .map(|s| s.as_ref().to_string())
        .ok_or_else(|| ConfigError::MissingRequired { parameter: flag.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_request_cap() {
        let config = Config::new();
        assert_eq!(config.request_cap(), crate::constants::DEFAULT_REQUEST_CAP);
    }

    #[test]
    fn set_notifies_listeners_with_old_and_new_value() {
        struct Capture(std::sync::Arc<std::sync::Mutex<Vec<ConfigChangeEvent>>>);
        impl ConfigChangeListener for Capture {
            fn on_config_changed(&mut self, event: &ConfigChangeEvent) {
                self.0.lock().unwrap().push(event.clone());
            }
        }

        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut config = Config::new();
        config.add_listener(Box::new(Capture(events.clone())));
        config.set("monoCase", ConfigValue::Boolean(true));
        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].property_name, "monoCase");
        assert_eq!(captured[0].old_value, Some(ConfigValue::Boolean(false)));
    }

    #[test]
    fn cli_parses_known_flags() {
        let opts = CliOptions::parse(["-scriptport", ":9999", "-httpd", ":8080", "-socket"]).unwrap();
        assert_eq!(opts.scriptport.as_deref(), Some(":9999"));
        assert_eq!(opts.httpd.as_deref(), Some(":8080"));
        assert!(opts.socket);
    }

    #[test]
    fn cli_rejects_unknown_flag() {
        assert!(CliOptions::parse(["-bogus"]).is_err());
    }

    #[test]
    fn cli_rejects_missing_value() {
        assert!(CliOptions::parse(["-scriptport"]).is_err());
    }
}
