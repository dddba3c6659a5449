//! Uploaded-package extraction and validation.
//!
//! A plugin package is a zip archive with a `plugin.json` manifest at the
//! root, the readme/logo entries the manifest points at, a required code
//! entry and an optional type-declaration entry. Every extraction failure is
//! reported as a validation error tagged with the section that failed, so the
//! uploader gets a precise diagnostic instead of a raw zip error.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use base64::Engine;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ArchiveSection, PluginError, PluginResult};
use crate::manifest::{CodePayload, PluginData, PluginManifest};

/// Manifest entry name, fixed at the archive root.
pub const MANIFEST_ENTRY: &str = "plugin.json";
/// Required executable code entry.
pub const CONTENT_ENTRY: &str = "src/index.js";
/// Optional type-declaration entry.
pub const DECLARATION_ENTRY: &str = "source/index.ts";

/// Fully extracted plugin package.
#[derive(Debug, Clone)]
pub struct ArchiveBundle {
    pub manifest: PluginManifest,
    pub readme: String,
    /// Logo bytes re-encoded as base64.
    pub logo: String,
    pub content: String,
    pub ts_content: Option<String>,
}

impl ArchiveBundle {
    /// Read and validate a package at `path`.
    ///
    /// Fails with [`PluginError::Validation`] naming the first section that
    /// is missing or unparsable. Opening the file itself is ordinary I/O and
    /// propagates as [`PluginError::Io`].
    pub fn load(path: &Path) -> PluginResult<Self> {
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(file)
            .map_err(|e| PluginError::validation(ArchiveSection::Manifest, e.to_string()))?;

        let raw = read_entry(&mut zip, MANIFEST_ENTRY, ArchiveSection::Manifest)?;
        let manifest: PluginManifest = serde_json::from_slice(&raw)
            .map_err(|e| PluginError::validation(ArchiveSection::Manifest, e.to_string()))?;

        let readme = string_entry(&mut zip, &manifest.readme, ArchiveSection::Readme)?;

        let logo_bytes = read_entry(&mut zip, &manifest.logo, ArchiveSection::Logo)?;
        let logo = base64::engine::general_purpose::STANDARD.encode(logo_bytes);

        let content = string_entry(&mut zip, CONTENT_ENTRY, ArchiveSection::Content)?;

        let ts_content = match read_optional_entry(&mut zip, DECLARATION_ENTRY)? {
            Some(raw) => Some(utf8(raw, ArchiveSection::Content)?),
            None => None,
        };

        Ok(Self {
            manifest,
            readme,
            logo,
            content,
            ts_content,
        })
    }

    /// Code payload as stored in both store tiers.
    pub fn data(&self) -> PluginData {
        PluginData {
            content: CodePayload::comm(self.content.clone()),
            ts_content: CodePayload::ts(self.ts_content.clone().unwrap_or_default()),
        }
    }
}

fn read_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
    section: ArchiveSection,
) -> PluginResult<Vec<u8>> {
    let mut entry = zip
        .by_name(name)
        .map_err(|e| PluginError::validation(section, e.to_string()))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| PluginError::validation(section, e.to_string()))?;
    Ok(buf)
}

fn read_optional_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
) -> PluginResult<Option<Vec<u8>>> {
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(PluginError::validation(ArchiveSection::Content, e.to_string())),
    };
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| PluginError::validation(ArchiveSection::Content, e.to_string()))?;
    Ok(Some(buf))
}

fn string_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
    section: ArchiveSection,
) -> PluginResult<String> {
    utf8(read_entry(zip, name, section)?, section)
}

fn utf8(raw: Vec<u8>, section: ArchiveSection) -> PluginResult<String> {
    String::from_utf8(raw).map_err(|e| PluginError::validation(section, e.to_string()))
}
