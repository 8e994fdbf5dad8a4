//! Shared setup for the end-to-end tests: scratch repositories built with the
//! installed VCS tools, and a cache in a temporary directory.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use vcs_wrapper::cache::{Cache, CacheConfig};
use vcs_wrapper::process::is_available;

/// Skip the calling test when `program` is not installed.
macro_rules! require {
    ($program:expr) => {
        if !$crate::common::available($program) {
            eprintln!("{} not found, skipping", $program);
            return;
        }
    };
}

pub fn available(program: &str) -> bool {
    is_available(program)
}

/// Run a command that has to succeed, returning its stdout.
pub fn run(dir: &Path, program: &str, args: &[&str]) -> String {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .env("HGPLAIN", "1")
        .env("BZR_EMAIL", "t.tom <t.tom@example.com>")
        .output()
        .unwrap_or_else(|e| panic!("failed to run {program}: {e}"));
    assert!(
        output.status.success(),
        "{program} {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn write_file(base: &Path, rel: &str, content: &str) {
    let path = base.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn append_file(base: &Path, rel: &str, content: &str) {
    let mut existing = fs::read_to_string(base.join(rel)).unwrap();
    existing.push_str(content);
    fs::write(base.join(rel), existing).unwrap();
}

/// Cache in its own temporary directory.
pub fn cache() -> (TempDir, Arc<Cache>) {
    let dir = TempDir::new().unwrap();
    let cache = Cache::open(CacheConfig::new(dir.path())).unwrap();
    (dir, Arc::new(cache))
}

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Git repository with the two-commit history used throughout the tests:
/// `file` gets a second line in the second commit, `dir1/file` exists from
/// the start.
pub fn git_upstream(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    run(dir, "git", &["init", "-q"]);
    run(dir, "git", &["config", "user.name", "kore"]);
    run(dir, "git", &["config", "user.email", "kore@example.com"]);

    write_file(dir, "file", "Some test file\n");
    write_file(dir, "dir1/file", "Some other test file\n");
    run(dir, "git", &["add", "."]);
    run(dir, "git", &["commit", "-q", "-m", "- Added a first test file"]);

    append_file(dir, "file", "Another line in the file\n");
    run(dir, "git", &["commit", "-q", "-a", "-m", "- Modified file"]);
}

pub fn git_commit_new_file(dir: &Path, name: &str) {
    write_file(dir, name, "Foobar Bar Foo\n");
    run(dir, "git", &["add", name]);
    run(dir, "git", &["commit", "-q", "-m", "- Added another file"]);
}

/// Mercurial repository with the same history as [`git_upstream`].
pub fn hg_upstream(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    run(dir, "hg", &["init"]);

    write_file(dir, "file", "Some test file\n");
    write_file(dir, "dir1/file", "Some other test file\n");
    run(dir, "hg", &["add", "-q"]);
    run(dir, "hg", &["commit", "-u", "t.tom", "-m", "- Added a first test file"]);

    append_file(dir, "file", "Another line in the file\n");
    run(dir, "hg", &["commit", "-u", "t.tom", "-m", "- Modified file"]);
}

pub fn hg_commit_new_file(dir: &Path, name: &str) {
    write_file(dir, name, "Foobar Bar Foo\n");
    run(dir, "hg", &["add", "-q", name]);
    run(dir, "hg", &["commit", "-u", "t.tom", "-m", "- Added another file"]);
}

/// Subversion repository with the same history as [`git_upstream`],
/// committed through a scratch working copy. Returns the repository URL.
pub fn svn_upstream(dir: &Path) -> String {
    let repo = dir.join("repo");
    let staging = dir.join("staging");
    fs::create_dir_all(dir).unwrap();
    run(dir, "svnadmin", &["create", repo.to_str().unwrap()]);
    let url = file_url(&repo);
    run(dir, "svn", &["checkout", "-q", &url, staging.to_str().unwrap()]);

    write_file(&staging, "file", "Some test file\n");
    write_file(&staging, "dir1/file", "Some other test file\n");
    run(&staging, "svn", &["add", "-q", "file", "dir1"]);
    svn_commit(&staging, "- Added a first test file");

    append_file(&staging, "file", "Another line in the file\n");
    svn_commit(&staging, "- Modified file");
    url
}

pub fn svn_commit(staging: &Path, message: &str) {
    run(
        staging,
        "svn",
        &["commit", "-q", "--username", "kore", "-m", message],
    );
}

/// Bazaar branch with the same history as [`git_upstream`].
pub fn bzr_upstream(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    run(dir, "bzr", &["init", "-q"]);

    write_file(dir, "file", "Some test file\n");
    write_file(dir, "dir1/file", "Some other test file\n");
    run(dir, "bzr", &["add", "-q"]);
    run(dir, "bzr", &["commit", "-q", "-m", "- Added a first test file"]);

    append_file(dir, "file", "Another line in the file\n");
    run(dir, "bzr", &["commit", "-q", "-m", "- Modified file"]);
}

pub fn bzr_commit_new_file(dir: &Path, name: &str) {
    write_file(dir, name, "Foobar Bar Foo\n");
    run(dir, "bzr", &["add", "-q", name]);
    run(dir, "bzr", &["commit", "-q", "-m", "- Added another file"]);
}

/// CVS repository holding module `module` with the same history as
/// [`git_upstream`], committed through `<dir>/staging`. The first commit is
/// tagged `first`. Returns the checkout source `<cvsroot>#module`.
pub fn cvs_upstream(dir: &Path) -> String {
    let repo = dir.join("repo");
    fs::create_dir_all(repo.join("module")).unwrap();
    let cvsroot = repo.to_str().unwrap().to_string();
    run(dir, "cvs", &["-d", &cvsroot, "init"]);
    run(
        dir,
        "cvs",
        &["-Q", "-d", &cvsroot, "checkout", "-d", "staging", "module"],
    );

    let staging = dir.join("staging");
    write_file(&staging, "file", "Some test file\n");
    write_file(&staging, "dir1/file", "Some other test file\n");
    run(&staging, "cvs", &["-Q", "add", "file", "dir1"]);
    run(&staging, "cvs", &["-Q", "add", "dir1/file"]);
    cvs_commit(&staging, "- Added a first test file");
    run(&staging, "cvs", &["-Q", "tag", "first"]);

    append_file(&staging, "file", "Another line in the file\n");
    cvs_commit(&staging, "- Modified file");
    format!("{cvsroot}#module")
}

pub fn cvs_commit(staging: &Path, message: &str) {
    run(staging, "cvs", &["-Q", "commit", "-m", message]);
}
