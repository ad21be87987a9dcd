//! Semantic error taxonomy for plugin-backed archive operations.
//!
//! The plugin reports outcomes as bare `i32` codes whose meaning depends on
//! the plugin build (see [`crate::abi::CodeTable`]). Everything surfaced by
//! this crate is one of the [`NkxError`] variants below; the raw code
//! survives inside `Native` so scripts still see the exact number.
//!
//! # Propagation rules
//! `BindingUnavailable` is produced once, before any protocol call, and is
//! always fatal to the run. Every protocol-level non-success code is fatal
//! to the current pack/extract operation: there is no retry and no
//! continuation past a failing entry.

use std::fmt;
use std::io;

use serde::Deserialize;
use thiserror::Error;

// ── Native code classes ──────────────────────────────────────────────────────

/// Semantic class of a non-success plugin return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeKind {
    /// Bad or unknown archive data, including CRC mismatches.
    Format,
    /// Disk-level open/create/close/read/write failure inside the plugin.
    Io,
    BufferTooSmall,
    Aborted,
    NotSupported,
    OutOfMemory,
    /// Code absent from the active table.
    Unknown,
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NativeKind::Format         => "bad or unknown archive data",
            NativeKind::Io             => "plugin-side I/O failure",
            NativeKind::BufferTooSmall => "buffer too small",
            NativeKind::Aborted        => "operation aborted",
            NativeKind::NotSupported   => "operation not supported by the plugin",
            NativeKind::OutOfMemory    => "plugin out of memory",
            NativeKind::Unknown        => "unrecognized plugin code",
        };
        f.write_str(text)
    }
}

// ── NkxError ─────────────────────────────────────────────────────────────────

/// Everything that can go wrong across one pack/extract/list operation.
#[derive(Debug, Error)]
pub enum NkxError {
    /// The plugin binary or one of its entry points could not be bound, or
    /// the descriptor cannot match this host. Never caused by archive
    /// content.
    #[error("plugin binding unavailable: {0}")]
    BindingUnavailable(String),

    /// The plugin returned a non-success code during a protocol call.
    #[error("plugin call failed: {kind} (native code {code})")]
    Native { kind: NativeKind, code: i32 },

    /// Local filesystem failure outside the plugin.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed precondition or unexpected local fault during an operation.
    #[error("{0}")]
    Local(String),
}

impl NkxError {
    /// Process exit code for the CLI contract: the raw plugin code when one
    /// exists, 1 for everything local.
    pub fn exit_code(&self) -> i32 {
        match self {
            NkxError::Native { code, .. } if *code > 0 => *code,
            _ => 1,
        }
    }
}
