use super::sample_module;
use il_patcher::persist::backup_path;
use il_patcher::{Instruction, JsonProvider, ModuleProvider, PatchError, Patcher, Target, WriterOptions};
use std::fs;
use tempfile::TempDir;

fn write_module(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("sample.json");
    let mut bytes = Vec::new();
    JsonProvider
        .write(&sample_module(), &mut bytes, WriterOptions::default())
        .unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

fn is_valid() -> Target {
    Target::new("App", "License").method("IsValid")
}

#[test]
fn test_save_with_backup_keeps_pre_patch_bytes() {
    let dir = TempDir::new().unwrap();
    let path = write_module(&dir);
    let original = fs::read(&path).unwrap();

    let mut patcher = Patcher::open(&path, JsonProvider, false).unwrap();
    patcher.write_return_body(&is_valid(), true).unwrap();
    let report = patcher.save(true).unwrap();

    assert_eq!(report.backup, Some(backup_path(&path)));
    assert_eq!(fs::read(backup_path(&path)).unwrap(), original);
    let patched = fs::read(&path).unwrap();
    assert_ne!(patched, original);
    assert_eq!(report.bytes_written, patched.len());

    let reopened = Patcher::open(&path, JsonProvider, false).unwrap();
    assert_eq!(
        reopened.instructions(&is_valid()).unwrap(),
        vec![Instruction::new("ldc.i4.1"), Instruction::ret()]
    );

    // second save replaces the old backup instead of failing
    let mut again = reopened;
    again.write_return_body(&is_valid(), false).unwrap();
    again.save(true).unwrap();
    assert_eq!(fs::read(backup_path(&path)).unwrap(), patched);
}

#[test]
fn test_save_without_backup_leaves_single_file() {
    let dir = TempDir::new().unwrap();
    let path = write_module(&dir);

    let mut patcher = Patcher::open(&path, JsonProvider, false).unwrap();
    patcher.write_empty_body(&is_valid()).unwrap();
    let report = patcher.save(false).unwrap();
    assert!(report.backup.is_none());

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("sample.json")]);
}

#[test]
fn test_stream_session_needs_explicit_destination() {
    let dir = TempDir::new().unwrap();
    let path = write_module(&dir);
    let bytes = fs::read(&path).unwrap();

    let patcher = Patcher::from_reader(&mut bytes.as_slice(), JsonProvider, false).unwrap();
    assert!(matches!(patcher.save(true), Err(PatchError::NoDestination)));

    let out = dir.path().join("out.json");
    let report = patcher.save_to(&out).unwrap();
    assert_eq!(report.path, out);
    assert_eq!(JsonProvider.load_path(&out).unwrap(), sample_module());
}

#[test]
fn test_keep_old_max_stack_is_forwarded_on_save() {
    let dir = TempDir::new().unwrap();
    let mut module = sample_module();
    let body = module.types[1].methods[0].body.as_mut().unwrap();
    body.max_stack = Some(3);
    let source = dir.path().join("stack.json");
    let mut bytes = Vec::new();
    JsonProvider
        .write(&module, &mut bytes, WriterOptions { keep_old_max_stack: true })
        .unwrap();
    fs::write(&source, bytes).unwrap();

    let kept = dir.path().join("kept.json");
    Patcher::open(&source, JsonProvider, true)
        .unwrap()
        .save_to(&kept)
        .unwrap();
    let fresh = dir.path().join("fresh.json");
    Patcher::open(&source, JsonProvider, false)
        .unwrap()
        .save_to(&fresh)
        .unwrap();

    let max_stack = |path: &std::path::Path| {
        JsonProvider.load_path(path).unwrap().types[1].methods[0]
            .body
            .as_ref()
            .unwrap()
            .max_stack
    };
    assert_eq!(max_stack(&kept), Some(3));
    assert_eq!(max_stack(&fresh), None);
}
