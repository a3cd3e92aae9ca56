use std::fs;

use anyhow::Result;
use pretty_assertions::assert_eq;

use scn_pack::{archive, lz, pack_from_dir, unpack_to_dir, MetaEntry, Mode};

fn sample_archive() -> Result<Vec<u8>> {
    let script = b"\x00hello\x00\x15".repeat(8);
    let segments = vec![
        lz::compress(&script, Mode::Greedy),
        // Stored segment: zero size header.
        vec![0, 0, 0, 0, 0xDE, 0xAD],
        // Not a valid stream: back-reference before any output.
        vec![3, 0, 0, 0, 0x80, 0x00],
    ];
    Ok(archive::join(&segments)?)
}

#[test]
fn unpack_writes_files_and_manifest() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let archive_path = dir.path().join("scn.dat");
    let data = sample_archive()?;
    fs::write(&archive_path, &data)?;

    let out = dir.path().join("unpacked");
    let manifest = unpack_to_dir(&archive_path, &out)?;
    let names: Vec<&str> = manifest.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["00000", "00001", "00002"]);
    assert_eq!(
        manifest.iter().map(|m| m.lz).collect::<Vec<_>>(),
        vec![true, false, false]
    );

    assert_eq!(fs::read(out.join("00000"))?, b"\x00hello\x00\x15".repeat(8));
    assert_eq!(fs::read(out.join("00001"))?, vec![0, 0, 0, 0, 0xDE, 0xAD]);

    let written: Vec<MetaEntry> =
        serde_json::from_str(&fs::read_to_string(out.join("__META__.json"))?)?;
    assert_eq!(written, manifest);
    Ok(())
}

#[test]
fn pack_restores_uncompressed_segments_verbatim() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let archive_path = dir.path().join("scn.dat");
    fs::write(&archive_path, sample_archive()?)?;
    let out = dir.path().join("unpacked");
    unpack_to_dir(&archive_path, &out)?;

    let repacked = dir.path().join("nested").join("scn.dat");
    assert_eq!(pack_from_dir(&out, &repacked, Mode::Literal)?, 3);

    let data = fs::read(&repacked)?;
    let segments = archive::split(&data)?;
    assert_eq!(lz::decompress(segments[0])?, b"\x00hello\x00\x15".repeat(8));
    assert_eq!(segments[1], &[0, 0, 0, 0, 0xDE, 0xAD][..]);
    assert_eq!(segments[2], &[3, 0, 0, 0, 0x80, 0x00][..]);
    Ok(())
}

#[test]
fn empty_manifest_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("__META__.json"), "[]")?;
    let err = pack_from_dir(dir.path(), &dir.path().join("out.dat"), Mode::Literal).unwrap_err();
    assert!(err.to_string().contains("no segments"), "{err}");
    Ok(())
}
