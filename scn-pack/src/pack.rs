//! Unpack an archive to a directory of numbered files and pack it back.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::archive;
use crate::lz::{self, Mode};

pub const MANIFEST: &str = "__META__.json";

/// One line of the manifest written next to the unpacked files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub name: String,
    /// Whether the file was LZ-compressed inside the archive.
    pub lz: bool,
    /// Segment size inside the archive, informational only.
    pub size: usize,
}

pub fn segment_name(index: usize) -> String {
    format!("{index:05}")
}

/// Decompress a segment if it is compressed, keep it verbatim otherwise.
pub fn open_segment(index: usize, segment: &[u8]) -> (Vec<u8>, bool) {
    match lz::unpacked_size(segment) {
        Ok(0) | Err(_) => return (segment.to_vec(), false),
        Ok(_) => {}
    }
    match lz::decompress(segment) {
        Ok(data) => (data, true),
        Err(e) => {
            log::warn!("segment {index}: {e}, keeping it stored");
            (segment.to_vec(), false)
        }
    }
}

pub fn unpack_to_dir(archive_path: &Path, out_dir: &Path) -> Result<Vec<MetaEntry>> {
    let data = fs::read(archive_path)
        .with_context(|| format!("reading archive {}", archive_path.display()))?;
    let segments = archive::split(&data)
        .with_context(|| format!("parsing index of {}", archive_path.display()))?;
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut manifest = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        log::debug!("extracting segment {index} of {}", segments.len());
        let (content, lz) = open_segment(index, segment);
        let name = segment_name(index);
        let path = out_dir.join(&name);
        fs::write(&path, &content).with_context(|| format!("writing {}", path.display()))?;
        manifest.push(MetaEntry {
            name,
            lz,
            size: segment.len(),
        });
    }

    let path = out_dir.join(MANIFEST);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!(
        "{}: {} segments, {} compressed",
        archive_path.display(),
        manifest.len(),
        manifest.iter().filter(|m| m.lz).count()
    );
    Ok(manifest)
}

pub fn pack_from_dir(in_dir: &Path, archive_path: &Path, mode: Mode) -> Result<usize> {
    let path = in_dir.join(MANIFEST);
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let manifest: Vec<MetaEntry> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    if manifest.is_empty() {
        bail!("{} lists no segments", path.display());
    }

    let mut segments = Vec::with_capacity(manifest.len());
    for entry in &manifest {
        let path = in_dir.join(&entry.name);
        let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        segments.push(if entry.lz { lz::compress(&data, mode) } else { data });
    }

    let out = archive::join(&segments)?;
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(archive_path, &out).with_context(|| format!("writing {}", archive_path.display()))?;
    log::info!("{}: packed {} segments", archive_path.display(), segments.len());
    Ok(segments.len())
}
