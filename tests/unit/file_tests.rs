//! Unit tests for the file handle

use safetensors_mmap::prelude::*;
use std::io::SeekFrom;

#[test]
fn test_create_write_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");

    let handle = FileHandle::create(&path).unwrap();
    handle.write_exact(b"header").unwrap();
    handle.write_u32(0xdead_beef).unwrap();
    assert_eq!(handle.tell().unwrap(), 10);
    assert_eq!(handle.size().unwrap(), 10);

    handle.seek(SeekFrom::Start(0)).unwrap();
    let mut text = [0u8; 6];
    handle.read_exact(&mut text).unwrap();
    assert_eq!(&text, b"header");
    assert_eq!(handle.read_u32().unwrap(), 0xdead_beef);
}

#[test]
fn test_u32_is_little_endian() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("le.bin");

    let handle = FileHandle::create(&path).unwrap();
    handle.write_u32(0x0403_0201).unwrap();
    drop(handle);

    assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn test_create_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.bin");
    std::fs::write(&path, b"previous contents").unwrap();

    let handle = FileHandle::create(&path).unwrap();
    assert_eq!(handle.size().unwrap(), 0);
}

#[test]
fn test_read_past_end_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.bin");
    std::fs::write(&path, b"ab").unwrap();

    let handle = FileHandle::open(&path).unwrap();
    let mut buf = [0u8; 4];
    assert!(matches!(handle.read_exact(&mut buf), Err(SafeTensorsError::Io(_))));
}

#[test]
fn test_empty_buffers_are_no_ops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"").unwrap();

    let handle = FileHandle::open(&path).unwrap();
    handle.read_exact(&mut []).unwrap();
    assert_eq!(handle.tell().unwrap(), 0);
}

#[test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.safetensors");

    match FileHandle::open(&path) {
        Err(SafeTensorsError::Open { path: reported, source }) => {
            assert_eq!(reported, path);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("Expected Open error, got {:?}", other),
    }
}

#[test]
fn test_from_file_wraps_std_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wrapped.bin");
    std::fs::write(&path, b"12345").unwrap();

    let handle = FileHandle::from_file(std::fs::File::open(&path).unwrap());
    assert_eq!(handle.size().unwrap(), 5);
    assert_eq!(handle.as_file().metadata().unwrap().len(), 5);
}

#[cfg(unix)]
#[test]
fn test_raw_fd() {
    use std::os::unix::io::AsRawFd;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fd.bin");
    std::fs::write(&path, b"x").unwrap();

    let handle = FileHandle::open(&path).unwrap();
    assert_eq!(handle.as_raw_fd(), handle.as_file().as_raw_fd());
}
