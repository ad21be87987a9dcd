//! Extraction and listing: the open → read-header → process → close loop.
//!
//! The loop is deliberately fail-fast. The end sentinel terminates it
//! normally (including on the very first read: an empty archive is a
//! success with zero files); every other non-success code aborts the whole
//! operation. There is no per-entry retry and no skipping past a failed
//! entry. Whatever happens, an obtained handle is closed exactly once.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};

use crate::abi::{self, op, openmode, ArchiveHandle, Outcome, RawHeaderData};
use crate::bridge::PluginBridge;
use crate::error::{NativeKind, NkxError};
use crate::wide;

// ── Entry metadata ───────────────────────────────────────────────────────────

/// One archive member, decoded from the raw header.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Relative path as stored, separators as the plugin produced them.
    pub path:        String,
    pub packed_size: u64,
    pub size:        u64,
    pub crc:         u32,
    /// DOS-packed modification time, as stored.
    pub dos_time:    i32,
    pub is_dir:      bool,
    pub method:      i32,
    pub unp_ver:     i32,
}

impl EntryInfo {
    pub fn from_raw(raw: &RawHeaderData) -> Self {
        // Packed fields are copied out before use; references into the
        // struct would be unaligned.
        let file_name = raw.file_name;
        Self {
            path:        wide::decode_fixed(&file_name),
            packed_size: join_size(raw.pack_size, raw.pack_size_high),
            size:        join_size(raw.unp_size, raw.unp_size_high),
            crc:         raw.file_crc,
            dos_time:    raw.file_time,
            is_dir:      raw.file_attr & abi::ATTR_DIRECTORY != 0,
            method:      raw.method,
            unp_ver:     raw.unp_ver,
        }
    }

    /// Modification time decoded from the DOS-packed field, when in range.
    pub fn modified(&self) -> Option<NaiveDateTime> {
        decode_dos_time(self.dos_time)
    }
}

/// Assemble a 64-bit size from a header's low/high pair.
pub fn join_size(low: u32, high: u32) -> u64 {
    (u64::from(high) << 32) | u64::from(low)
}

/// Decode a DOS-packed timestamp: bits 25.. year since 1980, 21.. month,
/// 16.. day, 11.. hour, 5.. minute, 0.. seconds/2.
pub fn decode_dos_time(t: i32) -> Option<NaiveDateTime> {
    let t = t as u32;
    let year  = 1980 + ((t >> 25) & 0x7f) as i32;
    let month = (t >> 21) & 0x0f;
    let day   = (t >> 16) & 0x1f;
    let hour  = (t >> 11) & 0x1f;
    let min   = (t >> 5) & 0x3f;
    let sec   = (t & 0x1f) * 2;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Result of a successful extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractSummary {
    /// File entries written to disk. Directory entries are never counted.
    pub files: u64,
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ArchiveReader<'b> {
    bridge: &'b PluginBridge,
}

impl<'b> ArchiveReader<'b> {
    pub fn new(bridge: &'b PluginBridge) -> Self {
        Self { bridge }
    }

    /// Extract every entry of `archive` under `dest`.
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractSummary, NkxError> {
        let guard = self.open(archive, openmode::EXTRACT)?;
        match self.run_extract(guard.handle, dest) {
            Ok(summary) => {
                guard.close()?;
                Ok(summary)
            }
            // The guard's drop closes the handle; the original failure is
            // what propagates.
            Err(e) => Err(e),
        }
    }

    /// Enumerate `archive` without writing anything to disk.
    pub fn list(&self, archive: &Path) -> Result<Vec<EntryInfo>, NkxError> {
        let guard = self.open(archive, openmode::LIST)?;
        match self.run_list(guard.handle) {
            Ok(entries) => {
                guard.close()?;
                Ok(entries)
            }
            Err(e) => Err(e),
        }
    }

    fn open(&self, archive: &Path, mode: i32) -> Result<HandleGuard<'b>, NkxError> {
        let (handle, open_result) = self.bridge.open(archive, mode);
        if handle.is_invalid() {
            // The plugin sometimes says why in the out field; pass that
            // through when it names a known error, otherwise the archive is
            // bad or unknown. Nothing was opened, so nothing is closed.
            return Err(match self.bridge.abi().codes.classify(open_result) {
                Outcome::Error(kind) if kind != NativeKind::Unknown => {
                    NkxError::Native { kind, code: open_result }
                }
                _ => NkxError::Native { kind: NativeKind::Format, code: open_result },
            });
        }
        Ok(HandleGuard::new(self.bridge, handle))
    }

    fn run_extract(&self, handle: ArchiveHandle, dest: &Path) -> Result<ExtractSummary, NkxError> {
        let codes = &self.bridge.abi().codes;
        let mut header = RawHeaderData::zeroed();
        let mut files = 0u64;
        loop {
            let code = self.bridge.read_header(handle, &mut header);
            match codes.classify(code) {
                Outcome::Success      => {}
                Outcome::EndOfArchive => break,
                Outcome::Error(kind)  => return Err(NkxError::Native { kind, code }),
            }
            let entry = EntryInfo::from_raw(&header);
            if entry.is_dir {
                // The plugin enumerates nested entries itself; a directory
                // record only needs to be stepped over.
                codes.expect_success(self.bridge.process(handle, op::SKIP, None))?;
                continue;
            }
            let target = entry_destination(dest, &entry.path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            codes.expect_success(self.bridge.process(handle, op::EXTRACT, Some(&target)))?;
            files += 1;
        }
        Ok(ExtractSummary { files })
    }

    fn run_list(&self, handle: ArchiveHandle) -> Result<Vec<EntryInfo>, NkxError> {
        let codes = &self.bridge.abi().codes;
        let mut header = RawHeaderData::zeroed();
        let mut entries = Vec::new();
        loop {
            let code = self.bridge.read_header(handle, &mut header);
            match codes.classify(code) {
                Outcome::Success      => {}
                Outcome::EndOfArchive => break,
                Outcome::Error(kind)  => return Err(NkxError::Native { kind, code }),
            }
            entries.push(EntryInfo::from_raw(&header));
            codes.expect_success(self.bridge.process(handle, op::SKIP, None))?;
        }
        Ok(entries)
    }
}

// ── Close-exactly-once guard ─────────────────────────────────────────────────

/// Owns an open handle and guarantees exactly one close.
///
/// The happy path calls [`close`](Self::close) so the plugin's close verdict
/// is checked; error paths fall back to the drop impl, which closes without
/// inspecting the verdict (the original failure is already propagating).
struct HandleGuard<'b> {
    bridge: &'b PluginBridge,
    handle: ArchiveHandle,
    armed:  bool,
}

impl<'b> HandleGuard<'b> {
    fn new(bridge: &'b PluginBridge, handle: ArchiveHandle) -> Self {
        Self { bridge, handle, armed: true }
    }

    fn close(mut self) -> Result<(), NkxError> {
        self.armed = false;
        let code = self.bridge.close(self.handle);
        self.bridge.abi().codes.expect_success(code)
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.bridge.close(self.handle);
        }
    }
}

// ── Destination paths ────────────────────────────────────────────────────────

/// Join an entry's stored path onto the destination root, converting both
/// separator conventions to the host's. Paths that could land outside the
/// root (rooted, drive-qualified, or containing `..`) are refused before
/// anything touches the filesystem.
pub fn entry_destination(root: &Path, stored: &str) -> Result<PathBuf, NkxError> {
    if stored.starts_with('/') || stored.starts_with('\\') {
        return Err(NkxError::Local(format!("entry path is not relative: {stored:?}")));
    }
    let mut out = root.to_path_buf();
    let mut pushed = false;
    for part in stored.split(|c| c == '/' || c == '\\') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." || part.contains(':') {
            return Err(NkxError::Local(format!(
                "entry path escapes the destination: {stored:?}"
            )));
        }
        out.push(part);
        pushed = true;
    }
    if !pushed {
        return Err(NkxError::Local(format!("entry has no usable path: {stored:?}")));
    }
    Ok(out)
}
