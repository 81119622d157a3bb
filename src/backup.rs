//! Dataset bundles: a zip with a manifest and the full dataset snapshot,
//! checksummed so a truncated or edited file is refused before it reaches
//! the gateway's destructive restore.

use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DATA_ENTRY: &str = "data/dataset.json";
pub const BUNDLE_FORMAT_V1: &str = "kelasd-dataset-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn export_data_bundle(
    dataset: &serde_json::Value,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }

    let data_bytes = serde_json::to_vec_pretty(dataset).context("failed to serialize dataset")?;
    let checksum = sha256_hex(&data_bytes);

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "sha256": checksum,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DATA_ENTRY, opts)
        .context("failed to start dataset entry")?;
    zip.write_all(&data_bytes)
        .context("failed to write dataset entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        sha256: checksum,
    })
}

/// Reads a bundle back without touching any state. A plain JSON file (the
/// web client's old raw backup download) is accepted as a legacy format.
pub fn read_data_bundle(in_path: &Path) -> anyhow::Result<(serde_json::Value, ImportSummary)> {
    if !is_zip_file(in_path)? {
        let bytes = std::fs::read(in_path).with_context(|| {
            format!("failed to read legacy backup {}", in_path.to_string_lossy())
        })?;
        let dataset: serde_json::Value =
            serde_json::from_slice(&bytes).context("legacy backup is not valid JSON")?;
        return Ok((
            dataset,
            ImportSummary {
                bundle_format_detected: "legacy-json".to_string(),
                sha256: sha256_hex(&bytes),
            },
        ));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_checksum = manifest
        .get("sha256")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut data_bytes = Vec::new();
    archive
        .by_name(DATA_ENTRY)
        .context("bundle missing data/dataset.json")?
        .read_to_end(&mut data_bytes)
        .context("failed to read dataset entry")?;

    let actual_checksum = sha256_hex(&data_bytes);
    if !expected_checksum.is_empty() && actual_checksum != expected_checksum {
        return Err(anyhow!(
            "bundle checksum mismatch: expected {} got {}",
            expected_checksum,
            actual_checksum
        ));
    }

    let dataset: serde_json::Value =
        serde_json::from_slice(&data_bytes).context("dataset entry is invalid JSON")?;

    Ok((
        dataset,
        ImportSummary {
            bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
            sha256: actual_checksum,
        },
    ))
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
