//! Package manifest and code payload types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Manifest bundled at the archive root as `plugin.json`.
///
/// `readme` and `logo` are entry names pointing at other files inside the
/// same archive. `config` holds the plugin's default configuration; on
/// reinstall it is merged with the saved configuration, saved values winning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Globally unique plugin identifier, stable across installs.
    pub key: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: String,
    /// Extension point this plugin binds to; independent plugins leave it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: Value,
    /// Archive entry holding the readme text.
    pub readme: String,
    /// Archive entry holding the logo image.
    pub logo: String,
    /// Share one instance across invocations instead of constructing per call.
    #[serde(default)]
    pub singleton: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Comm,
    Module,
    Ts,
}

/// Tagged code payload as stored in both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePayload {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub data: String,
}

impl CodePayload {
    pub fn comm(data: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Comm,
            data: data.into(),
        }
    }

    pub fn ts(data: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Ts,
            data: data.into(),
        }
    }
}

/// Cache-tier file payload: executable code plus its type declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginData {
    pub content: CodePayload,
    pub ts_content: CodePayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_minimal() {
        let manifest: PluginManifest = serde_json::from_str(
            r#"{
                "key": "pay",
                "name": "Payments",
                "version": "1.0.0",
                "readme": "README.md",
                "logo": "logo.png"
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.key, "pay");
        assert!(manifest.hook.is_none());
        assert!(!manifest.singleton);
        assert!(manifest.config.is_null());
    }

    #[test]
    fn test_manifest_full() {
        let manifest: PluginManifest = serde_json::from_str(
            r#"{
                "key": "upload-oss",
                "name": "OSS Upload",
                "version": "2.1.0",
                "author": "acme",
                "hook": "upload",
                "description": "Uploads files to OSS",
                "config": {"bucket": "media"},
                "readme": "README.md",
                "logo": "logo.png",
                "singleton": true
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.hook.as_deref(), Some("upload"));
        assert!(manifest.singleton);
        assert_eq!(manifest.config["bucket"], "media");
    }

    #[test]
    fn test_manifest_missing_required_fields() {
        let err = serde_json::from_str::<PluginManifest>(r#"{"key":"incomplete"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_payload_wire_format() {
        let data = PluginData {
            content: CodePayload::comm("module.exports = {}"),
            ts_content: CodePayload::ts("export {}"),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["content"]["type"], "comm");
        assert_eq!(json["tsContent"]["type"], "ts");

        let parsed: PluginData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, data);
    }
}
