//! Binary contract for one build of the WCX-family packer plugin.
//!
//! Everything in this module is data: struct layouts, flag values,
//! entry-point names, and the result-code table. The layouts are the
//! reverse-engineered wire contract: field order, widths, 1-byte packing,
//! and fixed UTF-16 buffer lengths are non-negotiable. A mismatch here does
//! not fail cleanly; it corrupts extraction or crashes inside the plugin.
//!
//! # Build variance
//! Plugin builds disagree on the numeric result table. Two observed tables
//! ship built in ([`AbiDescriptor::classic`], [`AbiDescriptor::legacy`]);
//! neither is assumed universal, and a table for another build can be loaded
//! from JSON ([`AbiDescriptor::from_json_file`]) after checking it against
//! that build's documentation.

use std::ffi::c_void;
use std::fs;
use std::mem;
use std::path::Path;
use std::ptr;

use serde::Deserialize;

use crate::error::{NativeKind, NkxError};

// ── Fixed buffer lengths ─────────────────────────────────────────────────────

/// UTF-16 units in each name buffer of [`RawHeaderData`].
pub const NAME_BUF_LEN: usize = 1024;
/// Bytes in the reserved tail of [`RawHeaderData`]. Unused, but its size is
/// part of the contract.
pub const RESERVED_LEN: usize = 1024;

// ── Flag values ──────────────────────────────────────────────────────────────

/// Open modes for [`RawOpenArchiveData::open_mode`].
pub mod openmode {
    pub const LIST:    i32 = 0;
    pub const EXTRACT: i32 = 1;
}

/// Per-entry operations for the process-entry call.
pub mod op {
    pub const SKIP:    i32 = 0;
    pub const TEST:    i32 = 1;
    pub const EXTRACT: i32 = 2;
}

/// Flag bits for the pack call.
pub mod pack {
    pub const DEFAULT:    i32 = 0x0000;
    pub const MOVE_FILES: i32 = 0x0001;
    /// Store member paths relative to the caller's base directory.
    pub const SAVE_PATHS: i32 = 0x0002;
    pub const ATTRIBUTES: i32 = 0x0004;
}

/// Directory bit in [`RawHeaderData::file_attr`] (FAT attribute numbering).
pub const ATTR_DIRECTORY: i32 = 0x10;

// ── Opaque handle ────────────────────────────────────────────────────────────

/// Opaque token identifying one open archive session inside the plugin.
///
/// Null is the invalid sentinel returned by a failed open. A valid handle is
/// owned by exactly one operation and closed exactly once.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHandle(pub(crate) *mut c_void);

impl ArchiveHandle {
    pub fn is_invalid(self) -> bool {
        self.0.is_null()
    }
}

// ── Raw structs ──────────────────────────────────────────────────────────────

/// Open request, passed by reference to the open entry point. The plugin
/// writes its verdict into `open_result` when it refuses to open. The
/// comment fields are never used by this tool but occupy layout.
#[repr(C, packed)]
pub struct RawOpenArchiveData {
    pub arc_name:     *const u16,
    pub open_mode:    i32,
    pub open_result:  i32,
    pub cmt_buf:      *mut u16,
    pub cmt_buf_size: i32,
    pub cmt_size:     i32,
    pub cmt_state:    i32,
}

impl RawOpenArchiveData {
    /// `arc_name` must stay valid for the duration of the open call.
    pub fn new(arc_name: *const u16, open_mode: i32) -> Self {
        Self {
            arc_name,
            open_mode,
            open_result: 0,
            cmt_buf: ptr::null_mut(),
            cmt_buf_size: 0,
            cmt_size: 0,
            cmt_state: 0,
        }
    }
}

/// One entry's metadata, populated by the read-next-header entry point.
///
/// `file_name` is the single combined name/relative-path field of the
/// working protocol revision. Sizes are 32-bit low/high pairs. The struct is
/// around 6 KiB, so it is boxed once and reused across loop iterations.
#[repr(C, packed)]
pub struct RawHeaderData {
    pub arc_name:       [u16; NAME_BUF_LEN],
    pub file_name:      [u16; NAME_BUF_LEN],
    pub flags:          i32,
    pub pack_size:      u32,
    pub pack_size_high: u32,
    pub unp_size:       u32,
    pub unp_size_high:  u32,
    pub host_os:        i32,
    pub file_crc:       u32,
    pub file_time:      i32,
    pub unp_ver:        i32,
    pub method:         i32,
    pub file_attr:      i32,
    pub cmt_buf:        *mut u8,
    pub cmt_buf_size:   i32,
    pub cmt_size:       i32,
    pub cmt_state:      i32,
    pub reserved:       [u8; RESERVED_LEN],
}

impl RawHeaderData {
    /// Fresh all-zero header. Zero is valid for every field: integers,
    /// empty name buffers, null comment pointer.
    pub fn zeroed() -> Box<Self> {
        // SAFETY: all-zero bytes are a valid value of this struct.
        unsafe { Box::new(mem::zeroed()) }
    }
}

// ── Result-code table ────────────────────────────────────────────────────────

/// Classification of one raw plugin return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// No more entries remain. Not an error.
    EndOfArchive,
    Error(NativeKind),
}

/// One raw code and its semantic class.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeEntry {
    pub code: i32,
    pub kind: NativeKind,
}

/// Numeric-to-semantic mapping for one plugin build.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeTable {
    pub success:        i32,
    pub end_of_archive: i32,
    pub entries:        Vec<CodeEntry>,
}

impl CodeTable {
    pub fn classify(&self, code: i32) -> Outcome {
        if code == self.success {
            return Outcome::Success;
        }
        if code == self.end_of_archive {
            return Outcome::EndOfArchive;
        }
        match self.entries.iter().find(|e| e.code == code) {
            Some(e) => Outcome::Error(e.kind),
            None    => Outcome::Error(NativeKind::Unknown),
        }
    }

    /// `Err` for every non-success outcome. The end sentinel is an error
    /// here as well; loops that expect it match on [`classify`](Self::classify)
    /// instead.
    pub fn expect_success(&self, code: i32) -> Result<(), NkxError> {
        match self.classify(code) {
            Outcome::Success      => Ok(()),
            Outcome::EndOfArchive => Err(NkxError::Native { kind: NativeKind::Unknown, code }),
            Outcome::Error(kind)  => Err(NkxError::Native { kind, code }),
        }
    }
}

// ── Descriptor ───────────────────────────────────────────────────────────────

/// Calling contract for one specific plugin build: entry-point names,
/// declared struct sizes, pointer width, and the result-code table.
///
/// The declared sizes exist so a descriptor written against a different
/// struct shape fails fast instead of corrupting memory: [`validate`]
/// compares them with the layouts this crate was compiled with, and the
/// bridge refuses to load on any mismatch.
///
/// [`validate`]: Self::validate
#[derive(Debug, Clone, Deserialize)]
pub struct AbiDescriptor {
    pub name:             String,
    pub open_fn:          String,
    pub read_header_fn:   String,
    pub process_fn:       String,
    pub pack_fn:          String,
    pub close_fn:         String,
    /// Pointer width the plugin was built for (32 or 64).
    pub pointer_width:    u32,
    /// Declared byte size of the open-request struct.
    pub open_data_size:   usize,
    /// Declared byte size of the entry-header struct.
    pub header_data_size: usize,
    pub codes:            CodeTable,
}

impl AbiDescriptor {
    /// WCX-SDK-style table observed on current plugin builds: 0 success,
    /// 10 end-of-archive, 11..=24 error band. The default.
    pub fn classic() -> Self {
        use NativeKind::*;
        Self {
            name:             "classic".into(),
            open_fn:          "OpenArchiveW".into(),
            read_header_fn:   "ReadHeaderExW".into(),
            process_fn:       "ProcessFileW".into(),
            pack_fn:          "PackFilesW".into(),
            close_fn:         "CloseArchive".into(),
            pointer_width:    usize::BITS,
            open_data_size:   mem::size_of::<RawOpenArchiveData>(),
            header_data_size: mem::size_of::<RawHeaderData>(),
            codes: CodeTable {
                success:        0,
                end_of_archive: 10,
                entries: vec![
                    CodeEntry { code: 11, kind: OutOfMemory },
                    CodeEntry { code: 12, kind: Format },       // bad data / CRC
                    CodeEntry { code: 13, kind: Format },       // bad archive
                    CodeEntry { code: 14, kind: Format },       // unknown format
                    CodeEntry { code: 15, kind: Io },           // open failed
                    CodeEntry { code: 16, kind: Io },           // create failed
                    CodeEntry { code: 17, kind: Io },           // close failed
                    CodeEntry { code: 18, kind: Io },           // read failed
                    CodeEntry { code: 19, kind: Io },           // write failed
                    CodeEntry { code: 20, kind: BufferTooSmall },
                    CodeEntry { code: 21, kind: Aborted },
                    CodeEntry { code: 22, kind: Format },       // no files
                    CodeEntry { code: 23, kind: NotSupported }, // too many files
                    CodeEntry { code: 24, kind: NotSupported },
                ],
            },
        }
    }

    /// Earlier observed table, incompatible with [`classic`](Self::classic):
    /// end-of-archive is 1 and the error band starts at 2. Kept selectable
    /// because which table matches a given plugin install was never
    /// conclusively settled.
    pub fn legacy() -> Self {
        use NativeKind::*;
        Self {
            name: "legacy".into(),
            codes: CodeTable {
                success:        0,
                end_of_archive: 1,
                entries: vec![
                    CodeEntry { code: 2, kind: Format },
                    CodeEntry { code: 3, kind: Format },
                    CodeEntry { code: 4, kind: Io },
                    CodeEntry { code: 5, kind: Io },
                    CodeEntry { code: 6, kind: OutOfMemory },
                    CodeEntry { code: 7, kind: Aborted },
                    CodeEntry { code: 8, kind: NotSupported },
                ],
            },
            ..Self::classic()
        }
    }

    /// Load a descriptor for another plugin build from JSON.
    pub fn from_json_file(path: &Path) -> Result<Self, NkxError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            NkxError::Local(format!("bad ABI descriptor {}: {e}", path.display()))
        })
    }

    /// Fail fast when this descriptor cannot match the struct layouts and
    /// pointer width this binary was compiled with.
    pub fn validate(&self) -> Result<(), NkxError> {
        if self.pointer_width != usize::BITS {
            return Err(NkxError::BindingUnavailable(format!(
                "descriptor '{}' targets a {}-bit plugin, host process is {}-bit",
                self.name, self.pointer_width, usize::BITS
            )));
        }
        let (open_size, header_size) =
            (mem::size_of::<RawOpenArchiveData>(), mem::size_of::<RawHeaderData>());
        if self.open_data_size != open_size || self.header_data_size != header_size {
            return Err(NkxError::BindingUnavailable(format!(
                "descriptor '{}' declares struct sizes {}/{}, compiled layouts are {}/{}",
                self.name, self.open_data_size, self.header_data_size, open_size, header_size
            )));
        }
        Ok(())
    }
}
