//! Asset Extractor (spec §4.2): materializes zip payloads under a
//! configured root directory.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use tracker_protocol::decode_html_entities;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Flags,
    Pictures,
    Styles,
    Translations,
    Database,
}

impl AssetKind {
    fn subdirectory(self) -> Option<&'static str> {
        match self {
            AssetKind::Flags => Some("flags"),
            AssetKind::Pictures => Some("pictures"),
            AssetKind::Styles => Some("styles"),
            AssetKind::Translations | AssetKind::Database => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not a valid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("translations.json missing or malformed")]
    MalformedTranslations,
}

#[derive(Debug, Default)]
pub struct AssetReport {
    pub files_written: Vec<PathBuf>,
}

/// Extracts `flags_zip`/`pictures`/`styles`/`database_zip` archives to
/// `<root>/<subdirectory>`. Directory entries are skipped; writes are
/// atomic at the entry level (temp file + rename) per spec §5.
pub fn extract_zip(bytes: &[u8], root: &Path, kind: AssetKind) -> Result<AssetReport, ExtractError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)?;
    let dest = match kind.subdirectory() {
        Some(sub) => root.join(sub),
        None => root.to_path_buf(),
    };
    std::fs::create_dir_all(&dest)?;

    let mut report = AssetReport::default();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            warn!(index = i, "skipping zip entry with unsafe path");
            continue;
        };
        let target = dest.join(name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        write_atomic(&target, &buf)?;
        report.files_written.push(target);
    }
    info!(kind = ?kind, count = report.files_written.len(), "asset archive extracted");
    Ok(report)
}

fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = target.with_file_name(tmp_name);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, target)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranslationsDocument {
    Wrapped {
        locales: BTreeMap<String, BTreeMap<String, String>>,
        #[serde(default, rename = "translationsChecksum")]
        translations_checksum: Option<String>,
    },
    /// Back-compat bare shape: `{ <locale>: { <key>: <value> } }`.
    Bare(BTreeMap<String, BTreeMap<String, String>>),
}

pub struct TranslationsPayload {
    pub locales: BTreeMap<String, BTreeMap<String, String>>,
    pub checksum: Option<String>,
}

/// Extracts the single `translations.json` entry from a `translations_zip`
/// archive, decoding HTML entities in every value (spec §4.2).
pub fn extract_translations(bytes: &[u8]) -> Result<TranslationsPayload, ExtractError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)?;
    let mut entry = archive
        .by_name("translations.json")
        .map_err(|_| ExtractError::MalformedTranslations)?;
    let mut contents = String::new();
    entry
        .read_to_string(&mut contents)
        .map_err(|_| ExtractError::MalformedTranslations)?;
    drop(entry);

    let doc: TranslationsDocument =
        serde_json::from_str(&contents).map_err(|_| ExtractError::MalformedTranslations)?;
    let (mut locales, checksum) = match doc {
        TranslationsDocument::Wrapped { locales, translations_checksum } => (locales, translations_checksum),
        TranslationsDocument::Bare(locales) => (locales, None),
    };

    for map in locales.values_mut() {
        for value in map.values_mut() {
            *value = decode_html_entities(value);
        }
    }

    Ok(TranslationsPayload { locales, checksum })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options: zip::write::FileOptions<()> =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for (name, contents) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn extracts_flags_zip_entries_to_flags_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = make_zip(&[("USA.svg", b"<svg/>"), ("CAN.png", b"\x89PNG")]);
        let report = extract_zip(&zip_bytes, dir.path(), AssetKind::Flags).unwrap();
        assert_eq!(report.files_written.len(), 2);
        assert!(dir.path().join("flags/USA.svg").exists());
        assert!(dir.path().join("flags/CAN.png").exists());
    }

    #[test]
    fn directory_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = make_zip(&[("nested/", b""), ("nested/file.txt", b"hi")]);
        let report = extract_zip(&zip_bytes, dir.path(), AssetKind::Styles).unwrap();
        assert_eq!(report.files_written.len(), 1);
        assert!(dir.path().join("styles/nested/file.txt").exists());
    }

    #[test]
    fn translations_wrapped_shape_decodes_entities() {
        let json = r#"{"locales":{"en":{"greeting":"Caf&eacute;"}},"translationsChecksum":"T1"}"#;
        let zip_bytes = make_zip(&[("translations.json", json.as_bytes())]);
        let payload = extract_translations(&zip_bytes).unwrap();
        assert_eq!(payload.checksum.as_deref(), Some("T1"));
        // &eacute; is not in the fixed entity table; left untouched on purpose.
        assert_eq!(payload.locales["en"]["greeting"], "Caf&eacute;");
    }

    #[test]
    fn translations_bare_back_compat_shape_is_accepted() {
        let json = r#"{"en":{"hello":"Hello &amp; welcome"}}"#;
        let zip_bytes = make_zip(&[("translations.json", json.as_bytes())]);
        let payload = extract_translations(&zip_bytes).unwrap();
        assert_eq!(payload.locales["en"]["hello"], "Hello & welcome");
        assert!(payload.checksum.is_none());
    }

    #[test]
    fn missing_translations_json_entry_is_malformed() {
        let zip_bytes = make_zip(&[("other.json", b"{}")]);
        assert!(matches!(extract_translations(&zip_bytes), Err(ExtractError::MalformedTranslations)));
    }
}
