use clap::{Parser, Subcommand};
use nkxtool::abi::AbiDescriptor;
use nkxtool::bridge::PluginBridge;
use nkxtool::error::NkxError;
use nkxtool::reader::ArchiveReader;
use nkxtool::writer::ArchiveWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Plugin file name looked up next to the executable when `--plugin` is not
/// given.
const DEFAULT_PLUGIN: &str = "inNKX.wcx";
const ARCHIVE_EXT: &str = "nkx";

#[derive(Parser)]
#[command(
    name = "nkxtool",
    about = "Pack and unpack NKX sample archives through the inNKX packer plugin"
)]
struct Cli {
    /// Packer plugin to load (default: inNKX.wcx beside the executable)
    #[arg(long, global = true)]
    plugin: Option<PathBuf>,
    /// Plugin ABI: "classic", "legacy", or a path to a JSON descriptor
    #[arg(long, global = true, default_value = "classic")]
    abi: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a folder into an NKX archive
    Compress {
        /// Folder to pack
        source_dir: PathBuf,
        /// Destination directory (archive named <folder>.nkx) or an explicit .nkx path
        dest: PathBuf,
    },
    /// Extract an NKX archive
    Decompress {
        /// Archive to extract
        archive: PathBuf,
        /// Directory the contents are extracted into
        dest_dir: PathBuf,
    },
    /// List archive contents without extracting
    List {
        archive: PathBuf,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), NkxError> {
    let abi = resolve_abi(&cli.abi)?;
    let plugin_path = resolve_plugin(cli.plugin)?;
    let bridge = PluginBridge::load(&plugin_path, abi)?;

    match cli.command {

        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { source_dir, dest } => {
            let archive_out = archive_destination(&source_dir, &dest)?;
            println!(
                "Compressing '{}' into '{}'...",
                source_dir.display(),
                archive_out.display()
            );
            let summary = ArchiveWriter::new(&bridge).pack(&source_dir, &archive_out)?;
            println!("Packed {} file(s): {}", summary.files, archive_out.display());
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { archive, dest_dir } => {
            require_archive_path(&archive)?;
            std::fs::create_dir_all(&dest_dir)?;
            println!(
                "Decompressing '{}' to '{}'...",
                archive.display(),
                dest_dir.display()
            );
            let summary = ArchiveReader::new(&bridge).extract(&archive, &dest_dir)?;
            println!("Extracted {} file(s) to {}", summary.files, dest_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive } => {
            require_archive_path(&archive)?;
            let entries = ArchiveReader::new(&bridge).list(&archive)?;
            println!("Archive: {}", archive.display());
            println!("{:<44} {:>12} {:>12}  Modified", "Name", "Size", "Packed");
            for e in &entries {
                let name = if e.is_dir { format!("{}/", e.path) } else { e.path.clone() };
                let when = e
                    .modified()
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".into());
                println!("{:<44} {:>12} {:>12}  {}", name, e.size, e.packed_size, when);
            }
            println!("{} entries", entries.len());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn resolve_abi(sel: &str) -> Result<AbiDescriptor, NkxError> {
    match sel {
        "classic" => Ok(AbiDescriptor::classic()),
        "legacy"  => Ok(AbiDescriptor::legacy()),
        other     => AbiDescriptor::from_json_file(Path::new(other)),
    }
}

fn resolve_plugin(explicit: Option<PathBuf>) -> Result<PathBuf, NkxError> {
    if let Some(p) = explicit {
        return Ok(p);
    }
    let exe = std::env::current_exe()?;
    Ok(exe
        .parent()
        .map(|d| d.join(DEFAULT_PLUGIN))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGIN)))
}

/// `<dest>/<folder>.nkx` when dest names a directory, dest itself when it
/// already names a `.nkx` path. Missing directories are created.
fn archive_destination(source_dir: &Path, dest: &Path) -> Result<PathBuf, NkxError> {
    let is_archive_name = dest
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXT));
    if is_archive_name {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(dest.to_path_buf());
    }
    let folder = source_dir.file_name().ok_or_else(|| {
        NkxError::Local(format!(
            "cannot derive an archive name from {}",
            source_dir.display()
        ))
    })?;
    std::fs::create_dir_all(dest)?;
    Ok(dest.join(format!("{}.{ARCHIVE_EXT}", folder.to_string_lossy())))
}

/// The archive must exist and carry the `.nkx` extension before any
/// destination directory is created.
fn require_archive_path(archive: &Path) -> Result<(), NkxError> {
    let ok_ext = archive
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXT));
    if !archive.is_file() || !ok_ext {
        return Err(NkxError::Local(format!(
            "source file not found or not a .{ARCHIVE_EXT} archive: {}",
            archive.display()
        )));
    }
    Ok(())
}
