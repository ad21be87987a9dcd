//! Packing: enumerate the source tree, encode the file list, one pack call,
//! verify the result.
//!
//! The plugin's success code alone is not trusted: a zero return with no
//! archive on disk afterwards is reported as a failure. Nothing cleans up a
//! half-written archive; the partial output stays on disk for the caller
//! to inspect or delete.

use std::path::Path;

use walkdir::WalkDir;

use crate::abi::pack;
use crate::bridge::PluginBridge;
use crate::error::NkxError;
use crate::wide::WideList;

// ── Summary ──────────────────────────────────────────────────────────────────

/// Result of a successful pack.
#[derive(Debug, Clone, Copy)]
pub struct PackSummary {
    /// Files handed to the plugin.
    pub files: u64,
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ArchiveWriter<'b> {
    bridge: &'b PluginBridge,
}

impl<'b> ArchiveWriter<'b> {
    pub fn new(bridge: &'b PluginBridge) -> Self {
        Self { bridge }
    }

    /// Pack every file under `source_dir` into `archive_out`, keeping paths
    /// relative to `source_dir`.
    pub fn pack(&self, source_dir: &Path, archive_out: &Path) -> Result<PackSummary, NkxError> {
        if !source_dir.is_dir() {
            return Err(NkxError::Local(format!(
                "source folder not found: {}",
                source_dir.display()
            )));
        }

        let names = collect_relative_files(source_dir)?;
        let count = names.len() as u64;
        let list = WideList::from_names(&names)?;

        let code = self
            .bridge
            .pack(archive_out, None, pack::SAVE_PATHS, &list, source_dir)?;
        self.bridge.abi().codes.expect_success(code)?;

        if !archive_out.is_file() {
            return Err(NkxError::Local(format!(
                "plugin reported success but {} was not created",
                archive_out.display()
            )));
        }
        Ok(PackSummary { files: count })
    }
}

// ── Enumeration ──────────────────────────────────────────────────────────────

/// All regular files under `dir`, as `dir`-relative strings in a stable
/// name order. Directories themselves are not listed; the plugin records
/// them implicitly from the member paths.
pub fn collect_relative_files(dir: &Path) -> Result<Vec<String>, NkxError> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry =
            entry.map_err(|e| NkxError::Local(format!("walking {}: {e}", dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).map_err(|_| {
            NkxError::Local(format!("path escapes source root: {}", entry.path().display()))
        })?;
        names.push(rel.to_string_lossy().into_owned());
    }
    Ok(names)
}
