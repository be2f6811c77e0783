use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::tempdir;

use vfarc::{
    name_index, page_size, Archive, ArchiveError, VfsFile, FLAG_COMPRESSED_LZ4,
    FLAG_CRYPTED_AES256, LITE_CRYPT_KEY, RECORD_SIZE,
};

fn new_archive(path: &std::path::Path) -> Archive {
    let file = VfsFile::create(path, false).unwrap();
    let archive = Archive::new();
    archive.create(file, &LITE_CRYPT_KEY).unwrap();
    archive
}

/// Deterministic high-entropy bytes; LZ4 cannot shrink these.
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 56) as u8
        })
        .collect()
}

/// Repeating pattern; LZ4 shrinks this massively.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn create_writes_header_and_padding() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.vfa");
    new_archive(&path);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], &[0x69, 0x31, 0x00, 0x00]);

    let bytes_per_block = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    assert_eq!(bytes_per_block, page_size());

    let first_entry = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(first_entry % bytes_per_block, 0);
    assert_eq!(bytes.len() as u32, first_entry);
}

#[test]
fn write_then_open_roundtrip() {
    let dir = tempdir().unwrap();
    let archive = new_archive(&dir.path().join("t.vfa"));

    archive.write("a/b.txt", b"hello", 0, 1).unwrap();

    assert_eq!(name_index("a/b.txt"), name_index("A\\B.TXT"));
    assert!(archive.exists("a/b.txt"));
    assert!(archive.exists("A\\B.TXT"));

    let stream = archive.open("a/b.txt").unwrap();
    assert_eq!(stream.data().unwrap(), b"hello");

    let opened_by_other_spelling = archive.open("A\\B.TXT").unwrap();
    assert_eq!(opened_by_other_spelling.data().unwrap(), b"hello");

    let records = archive.enumerate();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].version, 1);
    assert_eq!(records[0].rawsize, 5);
    assert_eq!(records[0].filename, "a/b.txt");
}

#[test]
fn compressible_payload_keeps_both_flags() {
    let dir = tempdir().unwrap();
    let archive = new_archive(&dir.path().join("t.vfa"));
    let data = pattern(1 << 20);

    archive
        .write("big.bin", &data, FLAG_COMPRESSED_LZ4 | FLAG_CRYPTED_AES256, 7)
        .unwrap();

    let record = &archive.enumerate()[0];
    assert_eq!(record.flags, FLAG_COMPRESSED_LZ4 | FLAG_CRYPTED_AES256);
    assert_eq!(record.version, 7);
    assert_eq!(record.cryptedsize % 16, 0);
    assert!(record.compressedsize < record.rawsize);
    assert_eq!(record.final_size, record.cryptedsize);

    let stream = archive.open("big.bin").unwrap();
    assert_eq!(stream.data().unwrap(), &data[..]);
}

#[test]
fn incompressible_payload_clears_lz4_flag() {
    let dir = tempdir().unwrap();
    let archive = new_archive(&dir.path().join("t.vfa"));
    let data = noise(64 * 1024);

    archive
        .write("noise.bin", &data, FLAG_COMPRESSED_LZ4 | FLAG_CRYPTED_AES256, 1)
        .unwrap();

    let record = &archive.enumerate()[0];
    assert_eq!(record.flags, FLAG_CRYPTED_AES256);
    assert_eq!(record.compressedsize, record.rawsize);

    let stream = archive.open("noise.bin").unwrap();
    assert_eq!(stream.data().unwrap(), &data[..]);
}

#[test]
fn duplicate_write_is_a_noop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.vfa");
    let archive = new_archive(&path);
    let data = pattern(10_000);

    archive.write("dup", &data, 0, 1).unwrap();
    let size_after_first = fs::metadata(&path).unwrap().len();

    archive.write("dup", &data, 0, 1).unwrap();
    let size_after_second = fs::metadata(&path).unwrap().len();

    assert_eq!(size_after_first, size_after_second);
    assert_eq!(archive.len(), 1);
}

#[test]
fn delete_frees_slot_for_reuse() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.vfa");
    let archive = new_archive(&path);

    archive.write("a", &pattern(4096), 0, 1).unwrap();
    let offset_a = archive.enumerate()[0].offset;
    let size_after_a = fs::metadata(&path).unwrap().len();

    assert!(archive.delete("a"));
    assert!(!archive.exists("a"));
    assert!(!archive.delete("a"));

    archive.write("b", &pattern(2048), 0, 1).unwrap();
    let offset_b = archive.enumerate()[0].offset;

    assert_eq!(offset_a, offset_b);
    assert_eq!(fs::metadata(&path).unwrap().len(), size_after_a);
}

#[test]
fn block_exact_payload_wastes_no_space() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.vfa");
    let archive = new_archive(&path);

    let bpb = u64::from(page_size());
    let size_before = fs::metadata(&path).unwrap().len();

    // Payload plus record fills exactly two blocks.
    let payload_len = 2 * bpb as usize - RECORD_SIZE;
    archive.write("exact", &noise(payload_len), 0, 1).unwrap();

    let record = &archive.enumerate()[0];
    assert_eq!(record.num_blocks, 2);
    assert_eq!(fs::metadata(&path).unwrap().len(), size_before + 2 * bpb);
}

#[test]
fn tampered_payload_fails_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.vfa");
    let archive = new_archive(&path);

    archive.write("x", &pattern(5000), 0, 1).unwrap();
    let offset = archive.enumerate()[0].offset;

    let mut file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte).unwrap();
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&byte).unwrap();

    assert!(matches!(
        archive.open("x"),
        Err(ArchiveError::Entry(_))
    ));
}

#[test]
fn open_missing_entry_fails() {
    let dir = tempdir().unwrap();
    let archive = new_archive(&dir.path().join("t.vfa"));
    assert!(matches!(
        archive.open("nope"),
        Err(ArchiveError::NotFound(_))
    ));
}

#[test]
fn load_rescans_disk_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.vfa");

    {
        let archive = new_archive(&path);
        archive.write("one.txt", b"first entry", 0, 3).unwrap();
        archive
            .write("two.bin", &pattern(9000), FLAG_COMPRESSED_LZ4, 3)
            .unwrap();
        archive.write("gone", b"to be deleted", 0, 3).unwrap();
        assert!(archive.delete("gone"));
        archive.unload();
    }

    let reloaded = Archive::new();
    reloaded
        .load(VfsFile::open(&path).unwrap(), &LITE_CRYPT_KEY)
        .unwrap();

    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.open("one.txt").unwrap().data().unwrap(), b"first entry");
    assert_eq!(reloaded.open("two.bin").unwrap().data().unwrap(), &pattern(9000)[..]);

    // Record geometry invariants.
    let header = reloaded.header().unwrap();
    let bpb = u64::from(header.bytes_per_block);
    for record in reloaded.enumerate() {
        assert_eq!((record.offset - RECORD_SIZE as u64) % bpb, 0);
        assert!(
            u64::from(record.final_size) + RECORD_SIZE as u64
                <= u64::from(record.num_blocks) * bpb
        );
        assert_ne!(record.index, 0);
    }

    // The freed slot is picked up again after a reload.
    let writable = Archive::new();
    writable
        .create(VfsFile::create(&path, true).unwrap(), &LITE_CRYPT_KEY)
        .unwrap();
    assert_eq!(writable.len(), 2);
    let size_before = fs::metadata(&path).unwrap().len();
    writable.write("refill", b"slot reuse", 0, 1).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), size_before);
}

#[test]
fn load_rejects_bad_magic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bogus.vfa");
    fs::write(&path, vec![0xAAu8; 8192]).unwrap();

    let archive = Archive::new();
    assert!(matches!(
        archive.load(VfsFile::open(&path).unwrap(), &LITE_CRYPT_KEY),
        Err(ArchiveError::BadMagic { .. })
    ));
}

#[test]
fn copy_archive_preserves_entries_exactly() {
    let dir = tempdir().unwrap();
    let src = new_archive(&dir.path().join("src.vfa"));
    let dst = new_archive(&dir.path().join("dst.vfa"));

    src.write("raw.dat", &noise(3000), 0, 2).unwrap();
    src.write("packed.dat", &pattern(30_000), FLAG_COMPRESSED_LZ4, 2).unwrap();
    src.write("secret.dat", &pattern(4000), FLAG_CRYPTED_AES256, 2).unwrap();
    src.write(
        "both.dat",
        &pattern(20_000),
        FLAG_COMPRESSED_LZ4 | FLAG_CRYPTED_AES256,
        2,
    )
    .unwrap();

    Archive::copy_archive(&src, &dst).unwrap();

    let mut src_records = src.enumerate();
    let mut dst_records = dst.enumerate();
    src_records.sort_by_key(|r| r.index);
    dst_records.sort_by_key(|r| r.index);
    assert_eq!(src_records.len(), dst_records.len());

    for (a, b) in src_records.iter().zip(&dst_records) {
        assert_eq!(a.index, b.index);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.version, b.version);
        assert_eq!(a.flags, b.flags);
        assert_eq!(a.rawsize, b.rawsize);
        assert_eq!(a.compressedsize, b.compressedsize);
        assert_eq!(a.cryptedsize, b.cryptedsize);
        assert_eq!(a.final_size, b.final_size);

        let original = src.open_index(a.index, None).unwrap();
        let copied = dst.open_index(b.index, None).unwrap();
        assert_eq!(original.data().unwrap(), copied.data().unwrap());
    }
}

#[test]
fn operations_fail_safely_after_unload() {
    let dir = tempdir().unwrap();
    let archive = new_archive(&dir.path().join("t.vfa"));
    archive.write("f", b"data", 0, 1).unwrap();
    archive.unload();

    assert!(matches!(
        archive.write("f", b"data", 0, 1),
        Err(ArchiveError::NotWriteable)
    ));
    assert!(!archive.delete("f"));
    assert!(!archive.exists("f"));
    assert!(archive.enumerate().is_empty());
    assert!(archive.open("f").is_err());
}
