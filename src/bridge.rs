//! The only module that talks to the plugin binary.
//!
//! [`PluginBridge::load`] binds all five entry points up front, so a missing
//! plugin file, an absent symbol, or a bit-width mismatch surfaces as
//! [`NkxError::BindingUnavailable`] before any protocol call is attempted.
//! That is a setup failure, never to be confused with an archive-format
//! error.
//!
//! Calls use `extern "system"` (stdcall on 32-bit Windows, the platform C
//! convention elsewhere). Nothing unwinds across the boundary; every outcome
//! is a raw `i32` code, classified by the callers through the descriptor's
//! [`CodeTable`](crate::abi::CodeTable).

use std::env;
use std::path::{Path, PathBuf};
use std::ptr;

use libloading::Library;

use crate::abi::{AbiDescriptor, ArchiveHandle, RawHeaderData, RawOpenArchiveData};
use crate::error::NkxError;
use crate::wide::{self, WideList, WideStr};

type OpenFn       = unsafe extern "system" fn(*mut RawOpenArchiveData) -> ArchiveHandle;
type ReadHeaderFn = unsafe extern "system" fn(ArchiveHandle, *mut RawHeaderData) -> i32;
type ProcessFn    = unsafe extern "system" fn(ArchiveHandle, i32, *const u16, *const u16) -> i32;
type PackFn       = unsafe extern "system" fn(*const u16, *const u16, i32, *const u16) -> i32;
type CloseFn      = unsafe extern "system" fn(ArchiveHandle) -> i32;

// ── Bridge ───────────────────────────────────────────────────────────────────

/// A loaded plugin with every entry point resolved.
#[derive(Debug)]
pub struct PluginBridge {
    /// Keeps the plugin mapped. The copied fn pointers below are valid only
    /// while this is alive.
    _lib: Library,
    abi: AbiDescriptor,
    open_fn:        OpenFn,
    read_header_fn: ReadHeaderFn,
    process_fn:     ProcessFn,
    pack_fn:        PackFn,
    close_fn:       CloseFn,
}

impl PluginBridge {
    /// Validate `abi` against the compiled layouts, load the plugin, and
    /// resolve every entry point.
    pub fn load(plugin_path: &Path, abi: AbiDescriptor) -> Result<Self, NkxError> {
        abi.validate()?;

        if !plugin_path.is_file() {
            return Err(NkxError::BindingUnavailable(format!(
                "plugin not found: {}",
                plugin_path.display()
            )));
        }

        // SAFETY: loading runs the library's initializers; there is no safer
        // entry for a native plugin. A wrong-architecture binary fails here
        // with an OS loader error.
        let lib = unsafe { Library::new(plugin_path) }.map_err(|e| {
            NkxError::BindingUnavailable(format!("cannot load {}: {e}", plugin_path.display()))
        })?;

        let open_fn        = resolve::<OpenFn>(&lib, &abi.open_fn)?;
        let read_header_fn = resolve::<ReadHeaderFn>(&lib, &abi.read_header_fn)?;
        let process_fn     = resolve::<ProcessFn>(&lib, &abi.process_fn)?;
        let pack_fn        = resolve::<PackFn>(&lib, &abi.pack_fn)?;
        let close_fn       = resolve::<CloseFn>(&lib, &abi.close_fn)?;

        Ok(Self {
            _lib: lib,
            abi,
            open_fn,
            read_header_fn,
            process_fn,
            pack_fn,
            close_fn,
        })
    }

    pub fn abi(&self) -> &AbiDescriptor {
        &self.abi
    }

    /// Open `archive` in `mode`. Returns the handle (possibly the invalid
    /// sentinel) and the plugin's out result code.
    pub fn open(&self, archive: &Path, mode: i32) -> (ArchiveHandle, i32) {
        let name = WideStr::from_path(archive);
        let mut data = RawOpenArchiveData::new(name.as_ptr(), mode);
        // SAFETY: `data` outlives the call and `name` outlives `data`.
        let handle = unsafe { (self.open_fn)(&mut data) };
        (handle, data.open_result)
    }

    pub fn read_header(&self, handle: ArchiveHandle, header: &mut RawHeaderData) -> i32 {
        // SAFETY: `handle` is a live handle from `open`; `header` is a valid
        // out-struct of the layout the descriptor was validated against.
        unsafe { (self.read_header_fn)(handle, header) }
    }

    /// One process-entry call. The corrected protocol carries the full
    /// destination path in the *name* argument; the directory argument is
    /// always null.
    pub fn process(&self, handle: ArchiveHandle, operation: i32, dest: Option<&Path>) -> i32 {
        let dest = dest.map(WideStr::from_path);
        // SAFETY: `handle` is live; the string buffer outlives the call.
        unsafe { (self.process_fn)(handle, operation, ptr::null(), wide::opt_ptr(dest.as_ref())) }
    }

    pub fn close(&self, handle: ArchiveHandle) -> i32 {
        // SAFETY: `handle` came from `open`; callers close at most once.
        unsafe { (self.close_fn)(handle) }
    }

    /// One-shot pack. The plugin resolves the relative names in `files`
    /// against the process working directory, so `base_dir` is applied as a
    /// scoped override for exactly this call and restored on every exit
    /// path. The crate runs one operation at a time, so the temporary
    /// process-wide state cannot be observed by another operation.
    pub fn pack(
        &self,
        archive_out: &Path,
        sub_path: Option<&str>,
        flags: i32,
        files: &WideList,
        base_dir: &Path,
    ) -> Result<i32, NkxError> {
        let out = WideStr::from_path(archive_out);
        let sub = sub_path.map(WideStr::new);
        let _cwd = ScopedCwd::enter(base_dir)?;
        // SAFETY: all string buffers outlive the call; `files` is
        // double-NUL-terminated by construction.
        let code = unsafe {
            (self.pack_fn)(out.as_ptr(), wide::opt_ptr(sub.as_ref()), flags, files.as_ptr())
        };
        Ok(code)
    }
}

fn resolve<T: Copy>(lib: &Library, name: &str) -> Result<T, NkxError> {
    // SAFETY: the caller supplies the fn type matching `name` per the active
    // descriptor; layout/width mismatches were rejected by `validate`.
    unsafe {
        lib.get::<T>(name.as_bytes())
            .map(|sym| *sym)
            .map_err(|e| NkxError::BindingUnavailable(format!("entry point {name} missing: {e}")))
    }
}

// ── Scoped working directory ─────────────────────────────────────────────────

/// RAII working-directory override for the pack call. Restores the previous
/// directory when dropped, error paths included.
struct ScopedCwd {
    saved: PathBuf,
}

impl ScopedCwd {
    fn enter(base: &Path) -> Result<Self, NkxError> {
        let saved = env::current_dir()?;
        env::set_current_dir(base).map_err(|e| {
            NkxError::Local(format!("cannot enter base directory {}: {e}", base.display()))
        })?;
        Ok(Self { saved })
    }
}

impl Drop for ScopedCwd {
    fn drop(&mut self) {
        // Nothing actionable remains if restoration fails at this point.
        let _ = env::set_current_dir(&self.saved);
    }
}
