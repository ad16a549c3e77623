use std::path::Path;
use tapisk::{BlockBackend, Config, Error, Session};

const BLOCK_SIZE: u64 = 4096;

fn config(dir: &Path) -> Config {
    Config {
        drive: dir.join("tape.img"),
        size: 16 * BLOCK_SIZE,
        block_size: None,
        index: dir.join("index.db"),
        namespace: "test".to_string(),
        read_only: false,
        emulate: true,
        strict: false,
    }
}

#[test]
fn data_survives_reopen() {
    env_logger::builder().is_test(true).try_init().ok();
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let session = Session::open(&config).unwrap();
    assert_eq!(session.block_size(), BLOCK_SIZE);
    let backend = session.backend();
    assert_eq!(backend.size(), 16 * BLOCK_SIZE);
    backend.write_at(b"Hello, world!", 3 * BLOCK_SIZE + 10).unwrap();
    backend.sync().unwrap();
    drop(backend);
    session.close().unwrap();

    let session = Session::open(&config).unwrap();
    let backend = session.backend();
    let mut buf = [0u8; 13];
    backend.read_at(&mut buf, 3 * BLOCK_SIZE + 10).unwrap();
    assert_eq!(&buf, b"Hello, world!");

    // A second write after reopening lands behind the first one.
    backend.write_at(&vec![1u8; BLOCK_SIZE as usize], 0).unwrap();
    backend.read_at(&mut buf, 3 * BLOCK_SIZE + 10).unwrap();
    assert_eq!(&buf, b"Hello, world!");
    drop(backend);
    session.close().unwrap();

    let tape_len = std::fs::metadata(dir.path().join("tape.img")).unwrap().len();
    assert_eq!(tape_len, 2 * BLOCK_SIZE);
}

#[test]
fn close_fails_while_backend_is_shared() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(&config(dir.path())).unwrap();

    let _backend = session.backend();
    assert!(session.close().is_err());
}

#[test]
fn size_must_be_a_multiple_of_block_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.size = BLOCK_SIZE + 1;

    assert!(Session::open(&config).is_err());
}

#[test]
fn configured_block_size_applies_to_emulated_tape() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.block_size = Some(512);
    config.size = 8 * 512;

    let session = Session::open(&config).unwrap();
    assert_eq!(session.block_size(), 512);
    session.backend().write_at(&[1u8; 512], 512).unwrap();
    session.close().unwrap();
}

#[test]
fn strict_session_rejects_partial_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.strict = true;

    let session = Session::open(&config).unwrap();
    let backend = session.backend();

    let err = backend.write_at(b"partial", 0).unwrap_err();
    assert!(matches!(err, Error::ChunkSizeMismatch { len: 7, .. }));
    let err = backend.write_at(&vec![0u8; BLOCK_SIZE as usize], 3).unwrap_err();
    assert!(matches!(err, Error::UnalignedOffset { offset: 3, .. }));
    let written = backend.write_at(&vec![0u8; BLOCK_SIZE as usize], BLOCK_SIZE).unwrap();
    assert_eq!(written, BLOCK_SIZE as usize);
}

#[test]
fn missing_drive_is_not_created_without_emulation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.drive = dir.path().join("nst0");
    config.emulate = false;

    assert!(Session::open(&config).is_err());
    assert!(!config.drive.exists());
    assert!(!config.index.exists());
}

#[test]
fn existing_file_is_used_without_emulation_flag() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    std::fs::write(&config.drive, vec![7u8; BLOCK_SIZE as usize]).unwrap();
    config.emulate = false;

    let session = Session::open(&config).unwrap();
    // Block 0 is not indexed yet, so it reads as zeroes even though the file has data.
    let mut buf = [0xffu8; 16];
    session.backend().read_at(&mut buf, 0).unwrap();
    assert_eq!(buf, [0u8; 16]);

    session.backend().write_at(b"appended", 0).unwrap();
    session.close().unwrap();
    assert_eq!(std::fs::metadata(&config.drive).unwrap().len(), 2 * BLOCK_SIZE);
}

#[test]
fn directory_is_not_a_drive() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.drive = dir.path().to_path_buf();

    assert!(Session::open(&config).is_err());
}
