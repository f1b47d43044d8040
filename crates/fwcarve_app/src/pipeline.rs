//! Extraction, rebuild, status and inspection steps.
//!
//! Each step is a plain function over a [`Workspace`]; state lives only in
//! the files on disk and is re-read on every call.

use anyhow::{Context, Result};
use fwcarve_core::{
    find_marker, marker_offsets, read_marker, reframe_to_writer, split_rebuilt,
    statistics::WindowStats, BlockSource, CoreError, Detection, LocatorConfig, MarkerBlock,
    SegmentLocator,
};
use fwcarve_io::{is_cancelled, load_bytes, write_atomic, AtomicFile, Cancellable, Reader};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, warn};

use crate::manifest::{sha256_file, DigestWriter, Manifest};
use crate::settings::Workspace;

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    FirmwareMissing,
    AlreadyExtracted { size: u64 },
    Extracted(ExtractionReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub detection: Detection,
    pub firmware_size: u64,
    pub manifest: Manifest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    FirmwareMissing,
    PayloadMissing,
    Rebuilt {
        original_size: u64,
        payload_size: u64,
        rebuilt_size: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    /// No manifest next to the side file.
    Unknown,
    Verified,
    Mismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectStatus {
    pub firmware_size: Option<u64>,
    pub payload_size: Option<u64>,
    pub payload_integrity: Integrity,
    pub manifest: Option<Manifest>,
    pub rebuilt_size: Option<u64>,
    pub embedded: Option<std::result::Result<MarkerBlock, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectReport {
    pub image_size: u64,
    /// Head plus tail, the size of the image the payload was inserted into.
    pub original_size: u64,
    pub marker: MarkerBlock,
    pub payload_sha256: String,
    pub written_to: Option<PathBuf>,
}

/// Size of a regular file, `None` if it does not exist.
pub fn file_size(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => anyhow::bail!("{} exists but is not a regular file", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

/// Locates the payload in the firmware and saves it to the side file.
///
/// An existing side file short-circuits the step: its presence alone counts
/// as "already extracted" and it is left untouched. The manifest is written
/// before the side file is committed, so a failed step leaves no side file.
pub fn extract<F>(
    ws: &Workspace,
    config: &LocatorConfig,
    cancel: Option<&AtomicBool>,
    on_window: F,
) -> Result<ExtractOutcome>
where
    F: FnMut(&WindowStats),
{
    if let Some(size) = file_size(&ws.payload)? {
        info!(path = %ws.payload.display(), size, "payload already extracted");
        return Ok(ExtractOutcome::AlreadyExtracted { size });
    }
    if file_size(&ws.firmware)?.is_none() {
        warn!(path = %ws.firmware.display(), "firmware not found");
        return Ok(ExtractOutcome::FirmwareMissing);
    }

    let mut reader = Reader::new(&ws.firmware)
        .with_context(|| format!("Failed to open firmware: {}", ws.firmware.display()))?;
    let firmware_size = reader.size();
    info!(
        path = %ws.firmware.display(),
        size = firmware_size,
        mmap = reader.is_mmap(),
        "scanning firmware"
    );

    let detection = SegmentLocator::with_config(config.clone())
        .locate_source(&mut reader, cancel, on_window)
        .context("Segment scan failed")?;
    match detection {
        Detection::Detected(s) => {
            info!(offset = s.offset, length = s.length, "dense run detected")
        }
        Detection::Fallback(s) => warn!(
            offset = s.offset,
            length = s.length,
            "no dense run reached the minimum size, using the middle-half fallback"
        ),
    }

    let mut out = AtomicFile::create(&ws.payload)
        .with_context(|| format!("Failed to create {}", ws.payload.display()))?;
    let mut writer = DigestWriter::new(&mut out);
    reader
        .copy_segment(detection.segment(), &mut writer)
        .context("Failed to copy payload segment")?;
    let digest = writer.finish();

    let manifest = Manifest::new(&ws.firmware, &detection, &digest);
    let json = serde_json::to_vec_pretty(&manifest)?;
    write_atomic(ws.manifest(), &json)
        .with_context(|| format!("Failed to write {}", ws.manifest().display()))?;

    if let Err(e) = out.commit() {
        if let Err(rm) = fs::remove_file(ws.manifest()) {
            warn!(path = %ws.manifest().display(), error = %rm, "failed to remove manifest");
        }
        return Err(e).with_context(|| format!("Failed to write {}", ws.payload.display()));
    }
    debug!(sha256 = %digest.sha256, entropy = digest.head_entropy, "payload saved");

    Ok(ExtractOutcome::Extracted(ExtractionReport {
        detection,
        firmware_size,
        manifest,
    }))
}

/// Writes a rebuilt image from the firmware and the current side file.
///
/// Raising `cancel` stops the write; the previous rebuilt image, if any, is
/// left in place.
pub fn rebuild(ws: &Workspace, cancel: Option<&AtomicBool>) -> Result<RebuildOutcome> {
    if file_size(&ws.firmware)?.is_none() {
        return Ok(RebuildOutcome::FirmwareMissing);
    }
    if file_size(&ws.payload)?.is_none() {
        return Ok(RebuildOutcome::PayloadMissing);
    }

    let original = load_bytes(&ws.firmware)
        .with_context(|| format!("Failed to load firmware: {}", ws.firmware.display()))?;
    let payload = load_bytes(&ws.payload)
        .with_context(|| format!("Failed to load payload: {}", ws.payload.display()))?;
    info!(
        original = original.len(),
        payload = payload.len(),
        "rebuilding firmware"
    );

    let mut out = AtomicFile::create(&ws.rebuilt)
        .with_context(|| format!("Failed to create {}", ws.rebuilt.display()))?;
    let written = reframe_to_writer(&original, &payload, &mut Cancellable::new(&mut out, cancel));
    let rebuilt_size = match written {
        Ok(n) => n,
        Err(_) if is_cancelled(cancel) => return Err(CoreError::Cancelled.into()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to write {}", ws.rebuilt.display()))
        }
    };
    out.commit()
        .with_context(|| format!("Failed to write {}", ws.rebuilt.display()))?;

    Ok(RebuildOutcome::Rebuilt {
        original_size: original.len() as u64,
        payload_size: payload.len() as u64,
        rebuilt_size,
    })
}

pub fn status(ws: &Workspace, cancel: Option<&AtomicBool>) -> Result<ProjectStatus> {
    let firmware_size = file_size(&ws.firmware)?;
    let payload_size = file_size(&ws.payload)?;
    let rebuilt_size = file_size(&ws.rebuilt)?;

    let manifest = match file_size(&ws.manifest())? {
        Some(_) => {
            let raw = fs::read(ws.manifest())?;
            match serde_json::from_slice::<Manifest>(&raw) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!(path = %ws.manifest().display(), error = %e, "unreadable manifest");
                    None
                }
            }
        }
        None => None,
    };

    let payload_integrity = match (&manifest, payload_size) {
        (Some(m), Some(_)) => {
            let actual = match sha256_file(&ws.payload, cancel) {
                Ok(hash) => hash,
                Err(_) if is_cancelled(cancel) => return Err(CoreError::Cancelled.into()),
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to hash {}", ws.payload.display()))
                }
            };
            if actual == m.sha256_hash {
                Integrity::Verified
            } else {
                Integrity::Mismatch {
                    expected: m.sha256_hash.clone(),
                    actual,
                }
            }
        }
        _ => Integrity::Unknown,
    };

    let embedded = match rebuilt_size {
        Some(_) => {
            let image = load_bytes(&ws.rebuilt)
                .with_context(|| format!("Failed to load {}", ws.rebuilt.display()))?;
            Some(read_marker(&image).map_err(|e| e.to_string()))
        }
        None => None,
    };

    Ok(ProjectStatus {
        firmware_size,
        payload_size,
        payload_integrity,
        manifest,
        rebuilt_size,
        embedded,
    })
}

/// Reads the marker block of a rebuilt image and optionally saves its payload.
pub fn inspect(image_path: &Path, output: Option<&Path>) -> Result<InspectReport> {
    let image = load_bytes(image_path)
        .with_context(|| format!("Failed to load {}", image_path.display()))?;
    let parts = match split_rebuilt(&image) {
        Ok(parts) => parts,
        Err(e) => {
            let context = match find_marker(&image) {
                Some(at) => format!(
                    "Marker token at {at:#x} in {} is not a valid marker block",
                    image_path.display()
                ),
                None => format!("No marker block in {}", image_path.display()),
            };
            return Err(anyhow::Error::new(e).context(context));
        }
    };
    let tokens = marker_offsets(&image).len();
    if tokens > 1 {
        debug!(tokens, "marker bytes also occur outside the marker block");
    }
    let payload = parts.payload;

    let mut sink = std::io::sink();
    let mut hasher = DigestWriter::new(&mut sink);
    std::io::Write::write_all(&mut hasher, payload)?;
    let digest = hasher.finish();

    if let Some(path) = output {
        write_atomic(path, payload)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(InspectReport {
        image_size: image.len() as u64,
        original_size: (parts.head.len() + parts.tail.len()) as u64,
        marker: parts.marker,
        payload_sha256: digest.sha256,
        written_to: output.map(Path::to_path_buf),
    })
}
