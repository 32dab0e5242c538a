#[path = "container/common.rs"]
mod common;

use common::Fixture;
use cvfs::{FileMode, Ivfs, SeekWhence};

#[test]
fn write_then_read_round_trips_through_a_fresh_handle() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    engine.create_file("/notes.txt").unwrap();
    let handle = engine.open_file("/notes.txt", FileMode::ReadWrite).unwrap();
    handle.write(b"hello container").unwrap();
    handle.close().unwrap();

    let reopened = engine.open_file("/notes.txt", FileMode::Read).unwrap();
    let mut buf = [0u8; 15];
    reopened.read(&mut buf).unwrap();
    assert_eq!(&buf, b"hello container");

    let info = engine.get_file_info("/notes.txt").unwrap();
    assert_eq!(info.size, 15);
    assert!(!info.is_directory);
}

#[test]
fn creating_the_same_file_twice_fails() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    engine.create_file("/a.txt").unwrap();
    assert!(engine.create_file("/a.txt").is_err());
}

#[test]
fn opening_with_create_new_on_existing_file_fails() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    engine.create_file("/a.txt").unwrap();
    assert!(engine.open_file("/a.txt", FileMode::CreateNew).is_err());
}

#[test]
fn opening_with_create_materialises_missing_parents() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    let handle = engine.open_file("/docs/report.txt", FileMode::Create).unwrap();
    handle.write(b"draft").unwrap();
    handle.close().unwrap();

    assert!(engine.directory_exists("/docs"));
    assert!(engine.file_exists("/docs/report.txt"));
}

#[test]
fn seek_and_rewrite_updates_only_the_touched_range() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    engine.create_file("/a.txt").unwrap();
    let handle = engine.open_file("/a.txt", FileMode::ReadWrite).unwrap();
    handle.write(b"xxxxxxxxxx").unwrap();
    handle.seek(2, SeekWhence::Set).unwrap();
    handle.write(b"YZ").unwrap();
    handle.seek(0, SeekWhence::Set).unwrap();

    let mut buf = [0u8; 10];
    handle.read(&mut buf).unwrap();
    assert_eq!(&buf, b"xxYZxxxxxx");
}
