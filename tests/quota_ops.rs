#[path = "container/common.rs"]
mod common;

use common::Fixture;
use cvfs::{ErrorKind, FileMode, Ivfs, ResourceLimits};

#[test]
fn file_count_limit_rejects_the_next_create() {
    let fixture = Fixture::new();
    let engine = fixture.open_with_limits(ResourceLimits { max_files: 1, ..Default::default() });

    engine.create_file("/a.txt").unwrap();
    assert_eq!(engine.create_file("/b.txt"), Err(ErrorKind::ResourceExhausted));
}

#[test]
fn zero_limits_are_unbounded() {
    let fixture = Fixture::new();
    let engine = fixture.open_with_limits(ResourceLimits::default());

    for i in 0..20 {
        engine.create_file(&format!("/f{i}.txt")).unwrap();
    }
    assert_eq!(engine.list_directory("/").unwrap().len(), 20);
}

#[test]
fn max_file_size_permits_the_boundary_and_rejects_one_byte_over() {
    let fixture = Fixture::new();
    let engine = fixture.open_with_limits(ResourceLimits { max_file_size: 199, ..Default::default() });

    let small = engine.open_file("/large.bin", FileMode::Create).unwrap();
    small.write(&vec![1u8; 199]).unwrap();
    small.close().unwrap();

    let big = engine.open_file("/toolarge.bin", FileMode::Create).unwrap();
    assert_eq!(big.write(&vec![1u8; 200]), Err(ErrorKind::ResourceExhausted));
    big.close().unwrap();
    assert_eq!(engine.get_file_info("/toolarge.bin").unwrap().size, 0);
}
