//! Integration tests for the hashfs binary

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

/// Run hashfs with storage isolated under `root`
fn hashfs(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hashfs"))
        .current_dir(root)
        .env("HASHFS_INDEX_DIR", root.join("index.lmdb"))
        .env("HASHFS_BLOB_ROOT", root.join("blobs"))
        .env("HOME", root)
        .args(args)
        .output()
        .expect("Failed to execute hashfs")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_mkdir_put_cat_ls() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let local = root.join("local.txt");
    std::fs::write(&local, "hello from disk").unwrap();

    assert!(hashfs(root, &["mkdir", "-p", "/docs/notes"]).status.success());
    let put = hashfs(root, &["put", local.to_str().unwrap(), "/docs/notes/hello.txt"]);
    assert!(put.status.success(), "{}", String::from_utf8_lossy(&put.stderr));

    let cat = hashfs(root, &["cat", "/docs/notes/hello.txt"]);
    assert!(cat.status.success());
    assert_eq!(stdout(&cat), "hello from disk");

    let ls = hashfs(root, &["ls", "/docs"]);
    assert_eq!(stdout(&ls), "notes/\n");

    let stat = hashfs(root, &["stat", "/docs/notes/hello.txt"]);
    let out = stdout(&stat);
    assert!(out.contains("Type:     file"));
    assert!(out.contains("Size:     15"));
    assert!(out.contains("Mode:     0644"));
}

#[test]
fn test_put_from_stdin() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    let mut child = Command::new(env!("CARGO_BIN_EXE_hashfs"))
        .current_dir(root)
        .env("HASHFS_INDEX_DIR", root.join("index.lmdb"))
        .env("HASHFS_BLOB_ROOT", root.join("blobs"))
        .env("HOME", root)
        .args(["put", "-", "/piped"])
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"piped bytes").unwrap();
    assert!(child.wait().unwrap().success());

    assert_eq!(stdout(&hashfs(root, &["cat", "/piped"])), "piped bytes");
}

#[test]
fn test_rm_requires_recursive_for_non_empty() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    assert!(hashfs(root, &["mkdir", "-p", "/a/b"]).status.success());

    let rm = hashfs(root, &["rm", "/a"]);
    assert!(!rm.status.success());
    assert!(String::from_utf8_lossy(&rm.stderr).contains("directory not empty"));

    assert!(hashfs(root, &["rm", "-r", "/a"]).status.success());
    assert!(!hashfs(root, &["stat", "/a"]).status.success());
    assert!(hashfs(root, &["rm", "-r", "/a"]).status.success());
}

#[test]
fn test_mv_and_chmod() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let local = root.join("f");
    std::fs::write(&local, "x").unwrap();

    assert!(hashfs(root, &["put", local.to_str().unwrap(), "/old"]).status.success());
    assert!(hashfs(root, &["mv", "/old", "/new"]).status.success());
    assert!(hashfs(root, &["chmod", "600", "/new"]).status.success());

    let ls = stdout(&hashfs(root, &["ls", "-l", "/"]));
    assert!(ls.contains("-0600"), "{ls}");
    assert!(ls.contains(" new"));
    assert!(!ls.contains(" old"));
}

#[test]
fn test_gc_dry_run_then_delete() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let local = root.join("f");

    std::fs::write(&local, "first").unwrap();
    assert!(hashfs(root, &["put", local.to_str().unwrap(), "/doc"]).status.success());
    std::fs::write(&local, "second").unwrap();
    assert!(hashfs(root, &["put", local.to_str().unwrap(), "/doc"]).status.success());

    let dry = stdout(&hashfs(root, &["gc"]));
    assert!(dry.contains("Orphaned blobs:    1"), "{dry}");
    assert!(dry.contains("--delete"));

    let real = stdout(&hashfs(root, &["gc", "--delete"]));
    assert!(real.contains("Deleted:           1"), "{real}");
    assert_eq!(stdout(&hashfs(root, &["cat", "/doc"])), "second");
}

#[test]
fn test_config_show_and_path() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    let show = hashfs(root, &["config", "show"]);
    assert!(show.status.success());
    let out = stdout(&show);
    assert!(out.contains("[storage]"));
    assert!(out.contains("[index]"));
    assert!(out.contains("[defaults]"));

    let path = stdout(&hashfs(root, &["config", "path"]));
    assert!(path.contains("Global:"));
    assert!(path.contains("Project:"));
}
