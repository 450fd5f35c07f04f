//! End-to-end behavior of the filesystem over the on-disk blob store.

use std::io::Write;

use hashfs::{FsErrorKind, HashFs};
use hashfs_cas::{compute_hash, BlobStore};
use hashfs_config::testing::TestEnvironment;

fn open(env: &TestEnvironment) -> HashFs {
    HashFs::open_with_config(&env.config()).unwrap()
}

#[test]
fn test_identical_content_stored_once() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    fs.mkdir_all("/one/two", 0o755).unwrap();
    fs.write_file("/a.txt", b"same bytes", 0o644).unwrap();
    fs.write_file("/one/b.txt", b"same bytes", 0o644).unwrap();
    fs.write_file("/one/two/c.txt", b"same bytes", 0o600).unwrap();

    let a = fs.stat("/a.txt").unwrap();
    let c = fs.stat("/one/two/c.txt").unwrap();
    assert_eq!(a.hash(), c.hash());
    assert_eq!(a.hash(), Some(&compute_hash(b"same bytes")));

    let cas = fs.blobs().stats().unwrap();
    assert_eq!(cas.blob_count, 1);
    assert_eq!(cas.total_bytes, 10);

    let stats = fs.stats().unwrap();
    assert_eq!(stats.file_count, 3);
    assert_eq!(stats.unique_blobs, 1);
    assert_eq!(stats.logical_bytes, 30);
}

#[test]
fn test_nothing_created_under_a_file() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);
    fs.write_file("/leaf", b"data", 0o644).unwrap();

    assert_eq!(fs.mkdir("/leaf/sub", 0o755).unwrap_err().kind(), FsErrorKind::NotADirectory);
    assert_eq!(
        fs.mkdir_all("/leaf/sub/deeper", 0o755).unwrap_err().kind(),
        FsErrorKind::NotADirectory
    );
    assert_eq!(
        fs.write_file("/leaf/x", b"", 0o644).unwrap_err().kind(),
        FsErrorKind::NotADirectory
    );
    assert_eq!(
        fs.read_dir("/leaf").unwrap_err().kind(),
        FsErrorKind::NotADirectory
    );
    assert!(!fs.exists("/leaf/sub").unwrap());
}

#[test]
fn test_mkdir_all_over_file_fails() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);
    fs.mkdir("/d", 0o755).unwrap();
    fs.write_file("/d/f", b"x", 0o644).unwrap();

    let err = fs.mkdir_all("/d/f", 0o755).unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::NotADirectory);
    assert!(fs.stat("/d/f").unwrap().is_file());
}

#[test]
fn test_mkdir_remove_remove_all_scenario() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    fs.mkdir_all("/a/b/c", 0o755).unwrap();
    fs.write_file("/a/b/c/file.txt", b"nested", 0o644).unwrap();
    fs.write_file("/a/top.txt", b"top", 0o644).unwrap();

    let err = fs.remove("/a").unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::DirectoryNotEmpty);
    assert!(fs.exists("/a/b/c/file.txt").unwrap());

    assert!(fs.stat("/a/b").unwrap().is_dir());
    let err = fs.remove("/a/b").unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::DirectoryNotEmpty);
    assert!(fs.stat("/a/b/c").unwrap().is_dir());

    fs.remove_all("/a").unwrap();
    for path in ["/a", "/a/b", "/a/b/c", "/a/b/c/file.txt", "/a/top.txt"] {
        assert_eq!(fs.stat(path).unwrap_err().kind(), FsErrorKind::NotFound, "{path}");
    }

    fs.remove_all("/a").unwrap();
    fs.remove_all("/never/existed").unwrap();
}

#[test]
fn test_remove_all_leaves_siblings_with_shared_prefix() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    fs.mkdir_all("/app/src", 0o755).unwrap();
    fs.mkdir_all("/app-data", 0o755).unwrap();
    fs.write_file("/app-data/keep", b"k", 0o644).unwrap();
    fs.write_file("/apple", b"a", 0o644).unwrap();

    fs.remove_all("/app").unwrap();

    assert!(!fs.exists("/app/src").unwrap());
    assert!(fs.exists("/app-data/keep").unwrap());
    assert!(fs.exists("/apple").unwrap());
}

#[test]
fn test_remove_all_root_keeps_root() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);
    fs.mkdir_all("/x/y", 0o755).unwrap();
    fs.write_file("/z", b"z", 0o644).unwrap();

    fs.remove_all("/").unwrap();

    assert!(fs.stat("/").unwrap().is_dir());
    assert!(fs.read_dir("/").unwrap().is_empty());
}

#[test]
fn test_remove_file_and_empty_dir() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);
    fs.mkdir("/empty", 0o755).unwrap();
    fs.write_file("/f", b"1", 0o644).unwrap();

    fs.remove("/empty").unwrap();
    fs.remove("/f").unwrap();
    assert_eq!(fs.remove("/f").unwrap_err().kind(), FsErrorKind::NotFound);
}

#[test]
fn test_write_read_round_trip() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let mut file = fs.create("/big.bin").unwrap();
    file.write_all(&payload[..1000]).unwrap();
    file.write_all(&payload[1000..]).unwrap();
    file.close().unwrap();

    assert_eq!(fs.read_file("/big.bin").unwrap(), payload);
    assert_eq!(fs.stat("/big.bin").unwrap().size(), payload.len() as u64);

    fs.write_file("/empty", b"", 0o644).unwrap();
    assert!(fs.read_file("/empty").unwrap().is_empty());
}

#[test]
fn test_rename_directory_moves_descendants() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    fs.mkdir_all("/src/lib/deep", 0o755).unwrap();
    fs.write_file("/src/lib/deep/mod.rs", b"mod", 0o644).unwrap();
    fs.write_file("/src/main.rs", b"fn main() {}", 0o644).unwrap();
    fs.mkdir("/dst", 0o755).unwrap();

    fs.rename("/src", "/dst/moved").unwrap();

    assert!(!fs.exists("/src").unwrap());
    assert!(!fs.exists("/src/lib/deep/mod.rs").unwrap());
    assert_eq!(fs.read_file("/dst/moved/lib/deep/mod.rs").unwrap(), b"mod");
    assert_eq!(fs.read_file("/dst/moved/main.rs").unwrap(), b"fn main() {}");

    let moved = fs.stat("/dst/moved").unwrap();
    assert!(moved.is_dir());
    assert_eq!(moved.name, "moved");

    let names: Vec<String> = fs
        .read_dir("/dst/moved")
        .unwrap()
        .into_iter()
        .map(|record| record.name)
        .collect();
    assert_eq!(names, vec!["lib", "main.rs"]);
}

#[test]
fn test_rename_overwrite_rules() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    fs.write_file("/f1", b"first", 0o644).unwrap();
    fs.write_file("/f2", b"second", 0o644).unwrap();
    fs.mkdir("/d_empty", 0o755).unwrap();
    fs.mkdir_all("/d_full/child", 0o755).unwrap();
    fs.mkdir("/d_src", 0o755).unwrap();

    // file over file replaces
    fs.rename("/f1", "/f2").unwrap();
    assert_eq!(fs.read_file("/f2").unwrap(), b"first");
    assert!(!fs.exists("/f1").unwrap());

    assert_eq!(fs.rename("/f2", "/d_empty").unwrap_err().kind(), FsErrorKind::IsADirectory);
    assert_eq!(fs.rename("/d_src", "/f2").unwrap_err().kind(), FsErrorKind::NotADirectory);
    assert_eq!(
        fs.rename("/d_src", "/d_full").unwrap_err().kind(),
        FsErrorKind::DirectoryNotEmpty
    );

    // directory over empty directory replaces
    fs.rename("/d_src", "/d_empty").unwrap();
    assert!(!fs.exists("/d_src").unwrap());
    assert!(fs.stat("/d_empty").unwrap().is_dir());

    assert_eq!(fs.rename("/nope", "/x").unwrap_err().kind(), FsErrorKind::NotFound);
    assert_eq!(
        fs.rename("/f2", "/missing/f2").unwrap_err().kind(),
        FsErrorKind::NotFound
    );
}

#[test]
fn test_paths_are_normalized() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    fs.mkdir_all("a//b/./c/", 0o755).unwrap();
    fs.write_file("/a/b/../b/c/f", b"x", 0o644).unwrap();

    assert!(fs.stat("/a/b/c").unwrap().is_dir());
    assert_eq!(fs.read_file("a/b/c/f").unwrap(), b"x");
    assert_eq!(fs.stat("/..").unwrap_err().kind(), FsErrorKind::InvalidPath);
}

#[test]
fn test_state_persists_across_reopen() {
    let env = TestEnvironment::new().unwrap();
    {
        let fs = open(&env);
        fs.mkdir_all("/persist/me", 0o750).unwrap();
        fs.write_file("/persist/me/data", b"durable", 0o640).unwrap();
        fs.chown("/persist/me/data", 42, 7).unwrap();
        fs.index().sync().unwrap();
    }

    let fs = open(&env);
    assert_eq!(fs.stat("/persist/me").unwrap().mode, 0o750);
    let record = fs.stat("/persist/me/data").unwrap();
    assert_eq!((record.mode, record.uid, record.gid), (0o640, 42, 7));
    assert_eq!(fs.read_file("/persist/me/data").unwrap(), b"durable");
}

#[test]
fn test_gc_after_overwrite_reclaims_old_content() {
    let env = TestEnvironment::new().unwrap();
    let fs = open(&env);

    fs.write_file("/doc", b"version one", 0o644).unwrap();
    fs.write_file("/doc", b"version two", 0o644).unwrap();
    assert_eq!(fs.blobs().stats().unwrap().blob_count, 2);

    let report = fs.collect_garbage(false).unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!fs.blobs().exists(&compute_hash(b"version one")));
    assert_eq!(fs.read_file("/doc").unwrap(), b"version two");
}
