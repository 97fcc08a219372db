mod common;

use std::io::Cursor;

use iscab::{Error, V3Archive};
use time::macros::datetime;

// ========================================================================= //

#[test]
fn explode_literal_stream() {
    let compressed = common::blast_literals(b"hello v3");
    assert_eq!(iscab::blast::decode(&compressed).unwrap(), b"hello v3");
}

#[test]
fn archive_with_root_and_subdirectory() {
    let readme = lipsum::lipsum(120);
    let data = common::v3_archive(&[
        ("", "README.TXT", readme.as_bytes()),
        ("SYSTEM\\FONTS", "serif.fon", b"serif font"),
        ("SYSTEM\\FONTS", "sans.fon", b"sans font"),
    ]);
    let mut archive = V3Archive::new(Cursor::new(data)).unwrap();

    assert_eq!(archive.header().file_count, 3);
    assert_eq!(archive.header().dir_count, 2);
    let directories: Vec<(&str, u16)> = archive
        .directories()
        .iter()
        .map(|directory| (directory.name(), directory.file_count()))
        .collect();
    assert_eq!(directories, vec![("", 1), ("SYSTEM/FONTS", 2)]);

    let paths: Vec<&str> = archive.files().map(|file| file.path()).collect();
    assert_eq!(
        paths,
        vec!["README.TXT", "SYSTEM/FONTS/serif.fon", "SYSTEM/FONTS/sans.fon"]
    );
    let sans = archive.file("SYSTEM/FONTS/sans.fon").unwrap();
    assert_eq!(sans.name(), "sans.fon");
    assert_eq!(sans.index(), 1);
    assert_eq!(sans.uncompressed_size(), 9);
    assert_eq!(sans.attributes(), 0x20);
    assert_eq!(sans.datetime(), Some(datetime!(2018-01-06 15:19:42)));

    assert_eq!(
        String::from_utf8_lossy(&archive.extract("README.TXT").unwrap()),
        readme
    );
    assert_eq!(
        archive.extract("system\\fonts\\SERIF.FON").unwrap(),
        b"serif font"
    );
    let mut output = Vec::new();
    let written = archive
        .extract_to("SYSTEM/FONTS/sans.fon", &mut output)
        .unwrap();
    assert_eq!(written, 9);
    assert_eq!(output, b"sans font");
}

#[test]
fn member_lookup() {
    let data = common::v3_archive(&[
        ("DATA", "Setup.ini", b"[setup]"),
        ("DATA", "setup.INI", b"[other]"),
    ]);
    let mut archive = V3Archive::new(Cursor::new(data)).unwrap();
    assert!(archive.exists("DATA/Setup.ini"));
    assert!(archive.exists("data\\setup.ini"));
    assert!(!archive.exists("Setup.ini"));
    // An exact match wins over an earlier case-insensitive one.
    assert_eq!(archive.extract("DATA/setup.INI").unwrap(), b"[other]");
    match archive.extract("DATA/missing.ini") {
        Err(Error::NotFound(path)) => assert_eq!(path, "DATA/missing.ini"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn open_from_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("DATA.Z");
    std::fs::write(
        &path,
        common::v3_archive(&[("", "a.txt", b"aaa"), ("", "b.txt", b"bbbb")]),
    )
    .unwrap();
    let mut archive = V3Archive::open(&path).unwrap();
    assert_eq!(archive.files().len(), 2);
    assert_eq!(archive.extract("b.txt").unwrap(), b"bbbb");
}

#[test]
fn oversized_member_is_truncated() {
    let mut data = common::v3_archive(&[("", "a.txt", b"aaa")]);
    let toc = u32::from_le_bytes(data[41..45].try_into().unwrap()) as usize;
    // Root directory record (8 bytes), then the member's compressed size.
    let at = toc + 8 + 7;
    data[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    let mut archive = V3Archive::new(Cursor::new(data)).unwrap();
    assert_eq!(archive.file("a.txt").unwrap().compressed_size(), u32::MAX);
    match archive.extract("a.txt") {
        Err(Error::Truncated { offset, .. }) => assert_eq!(offset, Some(255)),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn executable_is_not_a_v3_archive() {
    let mut data = common::v3_archive(&[("", "a.txt", b"aaa")]);
    data[0..4].copy_from_slice(b"MZ\x90\x00");
    match V3Archive::new(Cursor::new(data)) {
        Err(Error::NotThisFormat { expected, foreign, .. }) => {
            assert_eq!(expected, "InstallShield 3 archive");
            assert_eq!(foreign, Some(iscab::ForeignFormat::Executable));
        }
        Err(other) => panic!("unexpected error: {:?}", other),
        Ok(_) => panic!("expected an error"),
    }
}

// ========================================================================= //
