#[path = "container/common.rs"]
mod common;

use common::Fixture;
use cvfs::Ivfs;

#[test]
fn create_directory_and_list_children() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    engine.create_directory("/photos").unwrap();
    engine.create_file("/photos/a.jpg").unwrap();
    engine.create_file("/photos/b.jpg").unwrap();

    let mut names: Vec<String> = engine.list_directory("/photos").unwrap().into_iter().map(|e| e.name).collect();
    names.sort();
    assert_eq!(names, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
}

#[test]
fn non_recursive_delete_on_non_empty_directory_fails() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    engine.create_directory("/photos").unwrap();
    engine.create_file("/photos/a.jpg").unwrap();

    assert!(engine.delete_directory("/photos", false).is_err());
    assert!(engine.directory_exists("/photos"));
}

#[test]
fn recursive_delete_removes_nested_content() {
    let fixture = Fixture::new();
    let engine = fixture.open();

    engine.create_directory("/photos").unwrap();
    engine.create_file("/photos/a.jpg").unwrap();
    engine.create_directory("/photos/raw").unwrap();
    engine.create_file("/photos/raw/b.jpg").unwrap();

    engine.delete_directory("/photos", true).unwrap();

    assert!(!engine.directory_exists("/photos"));
    assert!(!engine.file_exists("/photos/a.jpg"));
    assert!(!engine.file_exists("/photos/raw/b.jpg"));
}

#[test]
fn root_cannot_be_deleted() {
    let fixture = Fixture::new();
    let engine = fixture.open();
    assert!(engine.delete_directory("/", true).is_err());
}
