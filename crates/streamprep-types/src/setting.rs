//! Plugin specs: a type-name plus a free-form settings mapping.
//!
//! In pipeline YAML a plugin setting is written as a single-key mapping,
//! `{ <type-name>: { ...settings } }`. A bare string (`stdout`) or a `null`
//! settings body is shorthand for empty settings.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SettingError;

#[derive(Debug, Clone, PartialEq)]
pub struct PluginSetting {
    name: String,
    settings: Map<String, Value>,
    pipeline_name: Option<String>,
}

impl PluginSetting {
    pub fn new(name: impl Into<String>, settings: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            settings,
            pipeline_name: None,
        }
    }

    /// Interpret a raw setting value.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingError`] when the value is not a type-name string or a
    /// single-key mapping whose value is a mapping (or `null`).
    pub fn from_value(raw: Value) -> Result<Self, SettingError> {
        match raw {
            Value::String(name) => Ok(Self::new(name, Map::new())),
            Value::Object(map) => {
                if map.len() != 1 {
                    return Err(SettingError::PluginCount(map.len()));
                }
                let Some((name, body)) = map.into_iter().next() else {
                    return Err(SettingError::PluginCount(0));
                };
                match body {
                    Value::Null => Ok(Self::new(name, Map::new())),
                    Value::Object(settings) => Ok(Self::new(name, settings)),
                    _ => Err(SettingError::SettingsNotMapping(name)),
                }
            }
            _ => Err(SettingError::Shape),
        }
    }

    /// Plugin type-name, used as the registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn string_attribute(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    /// Name of the pipeline this plugin is being built for, once known.
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    #[must_use]
    pub fn with_pipeline_name(mut self, pipeline_name: impl Into<String>) -> Self {
        self.pipeline_name = Some(pipeline_name.into());
        self
    }

    /// Deserialize the settings mapping into a plugin's typed configuration.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the settings do not match `T`.
    pub fn deserialize_settings<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.settings.clone()))
    }
}

impl<'de> Deserialize<'de> for PluginSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_value(raw).map_err(de::Error::custom)
    }
}

impl Serialize for PluginSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.settings)?;
        map.end()
    }
}
