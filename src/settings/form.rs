use serde_json::{Map, Value};

use crate::error::SyncError;

use super::SettingsPatch;

fn is_numeric_key(key: &str) -> bool {
    key.contains("Seconds") || key.contains("Duration")
}

impl SettingsPatch {
    /// Build a patch from string form values keyed by camelCase field name.
    pub fn from_form<I, K, V>(pairs: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut fields = Map::new();
        for (key, raw) in pairs {
            let (key, raw) = (key.as_ref(), raw.as_ref());
            let value = if is_numeric_key(key) {
                let n: u64 = raw.trim().parse().map_err(|_| {
                    SyncError::Validation(format!("{} must be a whole number, got {:?}", key, raw))
                })?;
                Value::from(n)
            } else {
                Value::from(raw)
            };
            fields.insert(key.to_string(), value);
        }

        serde_json::from_value(Value::Object(fields))
            .map_err(|err| SyncError::Validation(format!("invalid settings form: {}", err)))
    }
}
