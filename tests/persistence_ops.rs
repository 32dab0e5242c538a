#[path = "container/common.rs"]
mod common;

use common::Fixture;
use cvfs::{ContainerEngine, FileMode, Ivfs};

fn reopen(fixture: &Fixture) -> ContainerEngine {
    fixture.open()
}

#[test]
fn tree_and_content_survive_a_process_restart() {
    let fixture = Fixture::new();

    {
        let engine = reopen(&fixture);
        engine.create_directory("/docs").unwrap();
        let handle = engine.open_file("/docs/a.txt", FileMode::Create).unwrap();
        handle.write(b"first session").unwrap();
        handle.close().unwrap();
    }

    {
        let engine = reopen(&fixture);
        assert!(engine.directory_exists("/docs"));
        let handle = engine.open_file("/docs/a.txt", FileMode::Read).unwrap();
        let mut buf = [0u8; 13];
        handle.read(&mut buf).unwrap();
        assert_eq!(&buf, b"first session");
    }
}

#[test]
fn plaintext_never_appears_in_the_host_file() {
    let fixture = Fixture::new();
    let engine = reopen(&fixture);

    let handle = engine.open_file("/secret.txt", FileMode::Create).unwrap();
    let needle = b"the quick brown fox jumps";
    handle.write(needle).unwrap();
    handle.close().unwrap();
    drop(engine);

    let raw = std::fs::read(fixture.container_path()).unwrap();
    assert!(!raw.windows(needle.len()).any(|window| window == needle));
}

#[test]
fn lenient_reopen_recovers_from_a_corrupted_metadata_region() {
    let fixture = Fixture::new();

    {
        let engine = reopen(&fixture);
        engine.create_file("/a.txt").unwrap();
    }

    // Flip a byte inside the encrypted container-metadata region, well past
    // the header, so the integrity hash no longer matches on load.
    let path = fixture.container_path();
    let mut bytes = std::fs::read(&path).unwrap();
    let corrupt_at = cvfs::header::HEADER_LEN as usize + 8;
    bytes[corrupt_at] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let recovered = fixture.reopen_lenient();
    assert!(!recovered.file_exists("/a.txt"));
    recovered.create_file("/b.txt").unwrap();
    assert!(recovered.file_exists("/b.txt"));
}

#[test]
fn repeated_saves_do_not_move_existing_file_offsets() {
    let fixture = Fixture::new();
    let engine = reopen(&fixture);

    let handle = engine.open_file("/a.txt", FileMode::Create).unwrap();
    handle.write(b"stable content").unwrap();
    handle.close().unwrap();

    for i in 0..5 {
        engine.create_file(&format!("/pad{i}.txt")).unwrap();
    }

    let reopened = engine.open_file("/a.txt", FileMode::Read).unwrap();
    let mut buf = [0u8; 14];
    reopened.read(&mut buf).unwrap();
    assert_eq!(&buf, b"stable content");
}
