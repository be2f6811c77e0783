use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use vfarc::{
    key_from_ascii, wildcard_match, Archive, PackError, VfsFile, VfsPack, KEY_LENGTH,
    LITE_CRYPT_KEY,
};

fn build_archive_file(path: &std::path::Path, entries: &[(&str, &[u8])]) {
    let archive = Archive::new();
    archive
        .create(VfsFile::create(path, false).unwrap(), &LITE_CRYPT_KEY)
        .unwrap();
    for (name, data) in entries {
        archive.write(name, data, 0, 1).unwrap();
    }
}

#[test]
fn wildcard_semantics() {
    assert!(wildcard_match("data/a.txt", "*.txt"));
    assert!(wildcard_match("data/a.txt", "data/*"));
    assert!(wildcard_match("data/a.txt", "*a*"));
    assert!(wildcard_match("abc", "a?c"));
    assert!(wildcard_match("abc", "???"));
    assert!(wildcard_match("abc", "a*"));
    assert!(wildcard_match("", "*"));
    assert!(wildcard_match("anything", "*"));

    assert!(!wildcard_match("data/a.txt", "*.bin"));
    assert!(!wildcard_match("abc", "a?d"));
    assert!(!wildcard_match("abc", "??"));
    assert!(!wildcard_match("ab", "???"));
    assert!(!wildcard_match("abc", ""));
    assert!(!wildcard_match("", "?"));
}

#[test]
fn key_from_ascii_parses_hex_pairs() {
    let key = key_from_ascii(
        "0000000000000000000000000000000000000000000000000000000000000001",
    )
    .unwrap();
    assert_eq!(key.len(), KEY_LENGTH);
    assert_eq!(key, LITE_CRYPT_KEY.to_vec());

    assert_eq!(key_from_ascii("DEADBEEF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(key_from_ascii("not hex").is_err());
}

#[test]
fn register_and_unregister() {
    let pack = VfsPack::new();
    pack.register("Root.VFA", "*");
    pack.register("patch.vfa", "Data/Patches");

    let registered = pack.registered_archives();
    assert_eq!(registered.get("*"), Some(&"root.vfa".to_string()));
    assert_eq!(registered.get("data/patches"), Some(&"patch.vfa".to_string()));

    pack.unregister("ROOT.vfa");
    assert_eq!(pack.registered_archives().len(), 1);
}

#[test]
fn load_archive_requires_a_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("locked.vfa");
    build_archive_file(&path, &[("f", b"data")]);

    let pack = VfsPack::new();
    assert!(matches!(
        pack.load_archive(&path.to_string_lossy()),
        Err(PackError::KeyNotFound(_))
    ));
}

#[test]
fn load_archive_is_idempotent_per_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.vfa");
    build_archive_file(&path, &[("f", b"data")]);

    let pack = VfsPack::new();
    pack.set_archive_key(&path.to_string_lossy(), &LITE_CRYPT_KEY);

    let first = pack.load_archive(&path.to_string_lossy()).unwrap();
    let second = pack.load_archive(&path.to_string_lossy()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(pack.archives().len(), 1);

    assert!(pack.find_archive(&path.to_string_lossy()).is_some());
    pack.unload_archive(&first);
    assert!(pack.find_archive(&path.to_string_lossy()).is_none());
}

#[test]
fn open_prefers_archives_then_falls_back_to_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("overlay.vfa");
    build_archive_file(&path, &[("virtual/readme.txt", b"from archive")]);

    let pack = VfsPack::new();
    pack.set_archive_key(&path.to_string_lossy(), &LITE_CRYPT_KEY);
    pack.load_archive(&path.to_string_lossy()).unwrap();

    let virt = pack.open("virtual/readme.txt").unwrap();
    assert_eq!(virt.data().unwrap(), b"from archive");

    let on_disk = dir.path().join("plain.txt");
    fs::write(&on_disk, b"from disk").unwrap();
    let mut real = pack.open(&on_disk.to_string_lossy()).unwrap();
    let mut buf = vec![0u8; real.size() as usize];
    let n = real.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"from disk");

    assert!(pack.open("missing/everywhere").is_err());
}

#[test]
fn load_registered_loads_everything_in_parallel() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..3 {
        let path = dir.path().join(format!("pack{i}.vfa"));
        build_archive_file(&path, &[("entry", format!("payload {i}").as_bytes())]);
        paths.push(path);
    }

    let pack = VfsPack::new();
    for path in &paths {
        let name = path.to_string_lossy();
        pack.register(&name, "*");
        pack.set_archive_key(&name, &LITE_CRYPT_KEY);
    }

    pack.load_registered().unwrap();
    assert_eq!(pack.archives().len(), 3);

    for path in &paths {
        assert!(pack.find_archive(&path.to_string_lossy()).is_some());
    }
}
