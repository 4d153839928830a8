//! Built-in preppers.

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use streamprep_sdk::prelude::*;

pub const STRING_CONVERTER: &str = "string_converter";
pub const NO_OP: &str = "no-op";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct StringConverterConfig {
    #[serde(default = "default_upper_case")]
    upper_case: bool,
}

fn default_upper_case() -> bool {
    true
}

/// Converts every top-level string field of a record to upper or lower case.
/// Non-object data and non-string fields pass through untouched.
#[derive(Debug, Clone)]
pub struct StringConverter {
    upper_case: bool,
}

impl StringConverter {
    pub fn new(upper_case: bool) -> Self {
        Self { upper_case }
    }

    /// # Errors
    ///
    /// Fails if the settings do not match the prepper's configuration.
    pub fn from_setting(setting: &PluginSetting) -> anyhow::Result<Self> {
        let config: StringConverterConfig = setting
            .deserialize_settings()
            .context("invalid string_converter settings")?;
        Ok(Self::new(config.upper_case))
    }

    fn convert(&self, value: &str) -> String {
        if self.upper_case {
            value.to_uppercase()
        } else {
            value.to_lowercase()
        }
    }
}

impl Prepper for StringConverter {
    fn execute(&self, records: &[Record]) -> anyhow::Result<Vec<Record>> {
        Ok(records
            .iter()
            .map(|record| {
                record.map_data(|data| match data {
                    Value::Object(fields) => Value::Object(
                        fields
                            .iter()
                            .map(|(key, value)| {
                                let value = match value {
                                    Value::String(s) => Value::String(self.convert(s)),
                                    other => other.clone(),
                                };
                                (key.clone(), value)
                            })
                            .collect(),
                    ),
                    other => other.clone(),
                })
            })
            .collect())
    }
}

/// Passes every batch through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl Prepper for NoOp {
    fn execute(&self, records: &[Record]) -> anyhow::Result<Vec<Record>> {
        Ok(records.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upper_case_is_default() {
        let setting = PluginSetting::from_value(json!("string_converter")).unwrap();
        let prepper = StringConverter::from_setting(&setting).unwrap();

        let out = prepper
            .execute(&[Record::new(json!({"message": "hello", "count": 3, "nested": {"k": "v"}}))])
            .unwrap();
        assert_eq!(
            out[0].data(),
            &json!({"message": "HELLO", "count": 3, "nested": {"k": "v"}})
        );
    }

    #[test]
    fn test_lower_case() {
        let setting =
            PluginSetting::from_value(json!({"string_converter": {"upper_case": false}})).unwrap();
        let prepper = StringConverter::from_setting(&setting).unwrap();
        let out = prepper.execute(&[Record::from_message("MiXeD")]).unwrap();
        assert_eq!(out[0].data()["message"], "mixed");
    }

    #[test]
    fn test_metadata_preserved_and_input_untouched() {
        let input = vec![Record::from_message("abc")];
        let out = StringConverter::new(true).execute(&input).unwrap();
        assert_eq!(input[0].data()["message"], "abc");
        assert_eq!(out[0].metadata(), input[0].metadata());
    }

    #[test]
    fn test_non_object_data_passes_through() {
        let out = StringConverter::new(true)
            .execute(&[Record::new(json!("plain string"))])
            .unwrap();
        assert_eq!(out[0].data(), &json!("plain string"));
    }

    #[test]
    fn test_no_op_passthrough() {
        let input = vec![Record::from_message("a"), Record::from_message("b")];
        assert_eq!(NoOp.execute(&input).unwrap(), input);
    }
}
