//! Durable plugin records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::ArchiveBundle;
use crate::error::PluginResult;
use crate::manifest::{CodePayload, PluginData};

pub type PluginId = i64;

/// Reserved key; installs under this name are always rejected.
pub const RESERVED_KEY: &str = "plugin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PluginStatus {
    Disabled,
    Enabled,
}

impl PluginStatus {
    pub fn is_enabled(self) -> bool {
        matches!(self, PluginStatus::Enabled)
    }
}

impl From<PluginStatus> for u8 {
    fn from(status: PluginStatus) -> Self {
        match status {
            PluginStatus::Disabled => 0,
            PluginStatus::Enabled => 1,
        }
    }
}

impl TryFrom<u8> for PluginStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PluginStatus::Disabled),
            1 => Ok(PluginStatus::Enabled),
            other => Err(format!("invalid plugin status: {}", other)),
        }
    }
}

/// Source-of-truth row for one installed plugin.
///
/// The registry holds a derived, in-memory view of this; the cache tier
/// mirrors only `content`/`ts_content`. Neither is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    pub id: PluginId,
    pub key_name: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub hook: Option<String>,
    pub status: PluginStatus,
    pub readme: String,
    /// Base64-encoded logo bytes.
    pub logo: String,
    pub content: CodePayload,
    pub ts_content: CodePayload,
    pub config: Value,
    /// Original manifest, retained for audit and reinstall comparison.
    pub plugin_json: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PluginRecord {
    pub fn is_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Cache-tier payload for this record.
    pub fn data(&self) -> PluginData {
        PluginData {
            content: self.content.clone(),
            ts_content: self.ts_content.clone(),
        }
    }

    /// `singleton` flag carried through the original manifest.
    pub fn singleton(&self) -> bool {
        self.plugin_json
            .get("singleton")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Row content for insert/reinstall; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewPluginRecord {
    pub key_name: String,
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub hook: Option<String>,
    pub status: PluginStatus,
    pub readme: String,
    pub logo: String,
    pub content: CodePayload,
    pub ts_content: CodePayload,
    pub config: Value,
    pub plugin_json: Value,
}

impl NewPluginRecord {
    /// Build a fresh-install row from a validated package.
    pub fn from_bundle(bundle: &ArchiveBundle) -> PluginResult<Self> {
        let data = bundle.data();
        Ok(Self {
            key_name: bundle.manifest.key.clone(),
            name: bundle.manifest.name.clone(),
            version: bundle.manifest.version.clone(),
            author: bundle.manifest.author.clone(),
            description: bundle.manifest.description.clone(),
            hook: bundle.manifest.hook.clone(),
            status: PluginStatus::Enabled,
            readme: bundle.readme.clone(),
            logo: bundle.logo.clone(),
            content: data.content,
            ts_content: data.ts_content,
            config: bundle.manifest.config.clone(),
            plugin_json: serde_json::to_value(&bundle.manifest)?,
        })
    }
}

/// Field patch applied by the update operation.
#[derive(Debug, Clone, Default)]
pub struct PluginPatch {
    pub status: Option<PluginStatus>,
    pub config: Option<Value>,
}

impl PluginPatch {
    pub fn status(status: PluginStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Reinstall config merge: manifest defaults first, saved values win,
/// manifest introduces keys the saved config lacks.
pub fn merge_config(manifest: &Value, existing: &Value) -> Value {
    match (manifest.as_object(), existing.as_object()) {
        (Some(defaults), Some(saved)) => {
            let mut merged = defaults.clone();
            for (key, value) in saved {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ if existing.is_null() => manifest.clone(),
        _ => existing.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(u8::from(PluginStatus::Disabled), 0);
        assert_eq!(u8::from(PluginStatus::Enabled), 1);
        assert_eq!(PluginStatus::try_from(1).unwrap(), PluginStatus::Enabled);
        assert!(PluginStatus::try_from(2).is_err());
    }

    #[test]
    fn test_status_serde_as_integer() {
        let json = serde_json::to_string(&PluginStatus::Enabled).unwrap();
        assert_eq!(json, "1");
        let status: PluginStatus = serde_json::from_str("0").unwrap();
        assert_eq!(status, PluginStatus::Disabled);
    }

    #[test]
    fn test_merge_config_saved_values_win() {
        let manifest = json!({"b": 9, "c": 3});
        let existing = json!({"a": 1, "b": 2});
        let merged = merge_config(&manifest, &existing);
        assert_eq!(merged, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_merge_config_null_existing_takes_manifest() {
        let manifest = json!({"a": 1});
        assert_eq!(merge_config(&manifest, &Value::Null), manifest);
    }

    #[test]
    fn test_merge_config_non_object_existing_wins() {
        let manifest = json!({"a": 1});
        let existing = json!("opaque");
        assert_eq!(merge_config(&manifest, &existing), existing);
    }

    #[test]
    fn test_singleton_flag_from_manifest() {
        let record = PluginRecord {
            id: 1,
            key_name: "k".into(),
            name: "n".into(),
            version: "1".into(),
            author: String::new(),
            description: String::new(),
            hook: None,
            status: PluginStatus::Enabled,
            readme: String::new(),
            logo: String::new(),
            content: CodePayload::comm(""),
            ts_content: CodePayload::ts(""),
            config: Value::Null,
            plugin_json: json!({"singleton": true}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(record.singleton());
    }
}
