use nkxtool::abi::{self, AbiDescriptor, Outcome, RawHeaderData};
use nkxtool::bridge::PluginBridge;
use nkxtool::error::{NativeKind, NkxError};
use nkxtool::reader::{decode_dos_time, entry_destination, join_size, EntryInfo};
use nkxtool::wide::{decode_fixed, WideList};
use nkxtool::writer::collect_relative_files;
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

// ── Binding & descriptor validation ──────────────────────────────────────────

#[test]
fn test_missing_plugin_is_binding_failure() {
    let dir = tempdir().unwrap();
    let plugin = dir.path().join("inNKX.wcx");
    let err = PluginBridge::load(&plugin, AbiDescriptor::classic()).unwrap_err();
    assert!(matches!(err, NkxError::BindingUnavailable(_)), "got {err:?}");
}

#[test]
fn test_descriptor_size_mismatch_rejected() {
    let mut desc = AbiDescriptor::classic();
    desc.header_data_size += 4;
    let err = desc.validate().unwrap_err();
    assert!(matches!(err, NkxError::BindingUnavailable(_)), "got {err:?}");
}

#[test]
fn test_descriptor_pointer_width_mismatch_rejected() {
    let mut desc = AbiDescriptor::classic();
    desc.pointer_width = if usize::BITS == 64 { 32 } else { 64 };
    let err = desc.validate().unwrap_err();
    assert!(matches!(err, NkxError::BindingUnavailable(_)), "got {err:?}");
}

#[test]
fn test_json_descriptor_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.json");
    let json = format!(
        r#"{{
            "name": "custom-build",
            "open_fn": "OpenArchiveW",
            "read_header_fn": "ReadHeaderExW",
            "process_fn": "ProcessFileW",
            "pack_fn": "PackFilesW",
            "close_fn": "CloseArchive",
            "pointer_width": {},
            "open_data_size": {},
            "header_data_size": {},
            "codes": {{
                "success": 0,
                "end_of_archive": 42,
                "entries": [ {{ "code": 7, "kind": "format" }} ]
            }}
        }}"#,
        usize::BITS,
        std::mem::size_of::<abi::RawOpenArchiveData>(),
        std::mem::size_of::<RawHeaderData>(),
    );
    fs::write(&path, json).unwrap();

    let desc = AbiDescriptor::from_json_file(&path).unwrap();
    desc.validate().unwrap();
    assert_eq!(desc.codes.classify(42), Outcome::EndOfArchive);
    assert_eq!(desc.codes.classify(7), Outcome::Error(NativeKind::Format));
}

// ── Code tables ──────────────────────────────────────────────────────────────

#[test]
fn test_classic_table_classification() {
    let codes = AbiDescriptor::classic().codes;
    assert_eq!(codes.classify(0), Outcome::Success);
    assert_eq!(codes.classify(10), Outcome::EndOfArchive);
    assert_eq!(codes.classify(11), Outcome::Error(NativeKind::OutOfMemory));
    assert_eq!(codes.classify(12), Outcome::Error(NativeKind::Format));
    assert_eq!(codes.classify(18), Outcome::Error(NativeKind::Io));
    assert_eq!(codes.classify(20), Outcome::Error(NativeKind::BufferTooSmall));
    assert_eq!(codes.classify(21), Outcome::Error(NativeKind::Aborted));
    assert_eq!(codes.classify(999), Outcome::Error(NativeKind::Unknown));

    codes.expect_success(0).unwrap();
    let err = codes.expect_success(13).unwrap_err();
    assert!(matches!(
        err,
        NkxError::Native { kind: NativeKind::Format, code: 13 }
    ));
}

#[test]
fn test_end_sentinel_is_not_success_for_process_calls() {
    let codes = AbiDescriptor::classic().codes;
    assert!(codes.expect_success(10).is_err());
}

#[test]
fn test_legacy_table_is_incompatible_with_classic() {
    let legacy = AbiDescriptor::legacy().codes;
    assert_eq!(legacy.classify(1), Outcome::EndOfArchive);
    assert_ne!(legacy.classify(10), Outcome::EndOfArchive);
    assert_eq!(legacy.classify(2), Outcome::Error(NativeKind::Format));
}

#[test]
fn test_native_error_exit_code_is_raw_code() {
    let err = NkxError::Native { kind: NativeKind::Io, code: 18 };
    assert_eq!(err.exit_code(), 18);
    assert_eq!(NkxError::Local("x".into()).exit_code(), 1);
}

// ── Wide string transfer ─────────────────────────────────────────────────────

fn split_wide_list(units: &[u16]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = Vec::new();
    for &u in units {
        if u == 0 {
            if cur.is_empty() {
                break;
            }
            out.push(String::from_utf16(&cur).unwrap());
            cur.clear();
        } else {
            cur.push(u);
        }
    }
    out
}

#[test]
fn test_wide_list_encoding() {
    let list = WideList::from_names(["A.wav", "Sub/B.wav"]).unwrap();
    let units = list.as_units();
    // one terminator per name plus the closing one
    assert_eq!(units.iter().filter(|&&u| u == 0).count(), 3);
    assert_eq!(units.last(), Some(&0));
    assert_eq!(split_wide_list(units), vec!["A.wav", "Sub/B.wav"]);
}

#[test]
fn test_empty_wide_list_is_two_terminators() {
    let list = WideList::from_names(Vec::<String>::new()).unwrap();
    assert_eq!(list.as_units(), &[0u16, 0u16]);
}

#[test]
fn test_wide_list_rejects_embedded_nul() {
    let err = WideList::from_names(["bad\0name"]).unwrap_err();
    assert!(matches!(err, NkxError::Local(_)));
}

#[test]
fn test_decode_fixed_stops_at_first_nul() {
    let mut buf = [0u16; 16];
    for (i, u) in "A.wav".encode_utf16().enumerate() {
        buf[i] = u;
    }
    buf[6] = 'x' as u16; // garbage past the terminator
    assert_eq!(decode_fixed(&buf), "A.wav");

    let full: Vec<u16> = "no-nul".encode_utf16().collect();
    assert_eq!(decode_fixed(&full), "no-nul");
}

proptest! {
    #[test]
    fn prop_wide_list_roundtrips(names in proptest::collection::vec("[A-Za-z0-9._/-]{1,16}", 0..8)) {
        let list = WideList::from_names(&names).unwrap();
        prop_assert_eq!(split_wide_list(list.as_units()), names);
    }
}

// ── Header decoding ──────────────────────────────────────────────────────────

fn header_with(name: &str, attr: i32) -> Box<RawHeaderData> {
    let mut header = RawHeaderData::zeroed();
    let mut buf = [0u16; abi::NAME_BUF_LEN];
    for (i, u) in name.encode_utf16().enumerate() {
        buf[i] = u;
    }
    header.file_name = buf;
    header.file_attr = attr;
    header
}

#[test]
fn test_entry_decodes_name_and_directory_bit() {
    let mut header = header_with("Sub\\B.wav", 0);
    header.pack_size = 0x1000;
    header.unp_size = 0xffff_ffff;
    header.unp_size_high = 1;

    let entry = EntryInfo::from_raw(&header);
    assert_eq!(entry.path, "Sub\\B.wav");
    assert!(!entry.is_dir);
    assert_eq!(entry.packed_size, 0x1000);
    assert_eq!(entry.size, 0x1_ffff_ffff);

    let dir = EntryInfo::from_raw(&header_with("Sub", abi::ATTR_DIRECTORY));
    assert!(dir.is_dir);
}

#[test]
fn test_join_size_assembles_low_high_pair() {
    assert_eq!(join_size(0, 0), 0);
    assert_eq!(join_size(0xffff_ffff, 0), 0xffff_ffff);
    assert_eq!(join_size(1, 1), 0x1_0000_0001);
}

#[test]
fn test_decode_dos_time() {
    // 2021-05-10 12:30:20
    let packed: i32 = (41 << 25) | (5 << 21) | (10 << 16) | (12 << 11) | (30 << 5) | 10;
    let t = decode_dos_time(packed).unwrap();
    assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-05-10 12:30:20");

    // month 0 is out of range
    assert!(decode_dos_time(0).is_none());
}

// ── Destination paths ────────────────────────────────────────────────────────

#[test]
fn test_entry_destination_normalizes_both_separators() {
    let root = PathBuf::from("Out");
    let expected: PathBuf = ["Out", "Sub", "B.wav"].iter().collect();
    assert_eq!(entry_destination(&root, "Sub\\B.wav").unwrap(), expected);
    assert_eq!(entry_destination(&root, "Sub/B.wav").unwrap(), expected);
}

#[test]
fn test_entry_destination_rejects_escapes() {
    let root = PathBuf::from("Out");
    assert!(entry_destination(&root, "../evil.wav").is_err());
    assert!(entry_destination(&root, "Sub/../../evil.wav").is_err());
    assert!(entry_destination(&root, "/rooted.wav").is_err());
    assert!(entry_destination(&root, "C:\\rooted.wav").is_err());
    assert!(entry_destination(&root, "").is_err());
}

// ── Pack enumeration ─────────────────────────────────────────────────────────

#[test]
fn test_collect_relative_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("A.wav"), b"aaaa").unwrap();
    fs::create_dir(dir.path().join("Sub")).unwrap();
    fs::write(dir.path().join("Sub").join("B.wav"), b"bbbb").unwrap();

    let names = collect_relative_files(dir.path()).unwrap();
    let sub_b: PathBuf = ["Sub", "B.wav"].iter().collect();
    assert_eq!(names, vec!["A.wav".to_string(), sub_b.to_string_lossy().into_owned()]);
}

#[test]
fn test_collect_relative_files_empty_dir() {
    let dir = tempdir().unwrap();
    let names = collect_relative_files(dir.path()).unwrap();
    assert!(names.is_empty());

    // An empty enumeration still encodes as the two-terminator list.
    let list = WideList::from_names(&names).unwrap();
    assert_eq!(list.as_units(), &[0u16, 0u16]);
}
