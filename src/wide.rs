//! Scoped UTF-16 buffers for strings crossing the plugin boundary.
//!
//! Every string handed to the plugin is a NUL-terminated UTF-16 copy whose
//! allocation lives exactly as long as the call that uses it: built
//! immediately before the call, released when the value leaves scope, on
//! every exit path. Buffers are never shared between calls.
//!
//! Optional strings follow the protocol's convention: absent means a null
//! pointer, never an allocated empty string.

use std::path::Path;
use std::ptr;

use crate::error::NkxError;

// ── Single string ────────────────────────────────────────────────────────────

/// One NUL-terminated UTF-16 string copy.
#[derive(Debug)]
pub struct WideStr {
    buf: Vec<u16>,
}

impl WideStr {
    pub fn new(s: &str) -> Self {
        let mut buf: Vec<u16> = s.encode_utf16().collect();
        buf.push(0);
        Self { buf }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.to_string_lossy())
    }

    /// Valid while `self` is alive; the terminating NUL is included.
    pub fn as_ptr(&self) -> *const u16 {
        self.buf.as_ptr()
    }
}

/// Null pointer for `None`, the string pointer otherwise.
pub fn opt_ptr(s: Option<&WideStr>) -> *const u16 {
    match s {
        Some(w) => w.as_ptr(),
        None    => ptr::null(),
    }
}

// ── Multi-string list ────────────────────────────────────────────────────────

/// The pack call's file list: every name NUL-terminated, the whole list
/// closed by one extra NUL. An empty list is exactly two NULs.
#[derive(Debug)]
pub struct WideList {
    buf: Vec<u16>,
}

impl WideList {
    /// Names must not contain NUL; an embedded NUL would silently truncate
    /// the list inside the plugin, so it is rejected up front.
    pub fn from_names<I, S>(names: I) -> Result<Self, NkxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut buf = Vec::new();
        let mut any = false;
        for name in names {
            let name = name.as_ref();
            if name.contains('\0') {
                return Err(NkxError::Local(format!("file name contains NUL: {name:?}")));
            }
            buf.extend(name.encode_utf16());
            buf.push(0);
            any = true;
        }
        if !any {
            buf.push(0);
        }
        buf.push(0);
        Ok(Self { buf })
    }

    pub fn as_ptr(&self) -> *const u16 {
        self.buf.as_ptr()
    }

    /// Encoded units, terminators included.
    pub fn as_units(&self) -> &[u16] {
        &self.buf
    }
}

// ── Fixed-buffer decode ──────────────────────────────────────────────────────

/// Decode a fixed-length UTF-16 field up to its first NUL. A buffer with no
/// NUL decodes in full.
pub fn decode_fixed(buf: &[u16]) -> String {
    let end = buf.iter().position(|&u| u == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}
