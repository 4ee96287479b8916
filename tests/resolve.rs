//! Resolver scenarios over synthetic git histories.

mod common;

use common::{EPOCH, TestRepo, head_of, workspace_with_manifest};
use wit::workspace::{ResolutionError, Workspace};

#[test]
fn empty_workspace_resolves_to_an_empty_lock() {
    let tmp = tempfile::tempdir().unwrap();
    let mut ws = Workspace::create(tmp.path(), "ws", Vec::new(), None).unwrap();

    let mut resolution = ws.resolve(true).unwrap();
    assert!(resolution.is_clean());
    assert!(resolution.store.is_empty());
    ws.checkout(&mut resolution).unwrap();

    assert_eq!(
        std::fs::read_to_string(ws.lockfile_path()).unwrap(),
        "{}\n"
    );
    assert!(ws.root.join(".wit").is_dir());
    // No package directories appeared.
    let dirs: Vec<_> = std::fs::read_dir(&ws.root)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(dirs, vec![".wit"]);
}

#[test]
fn single_dependency_pinned_to_a_hash() {
    let tmp = tempfile::tempdir().unwrap();
    let remotes = tmp.path().join("remotes");
    let r = TestRepo::init(&remotes, "r");
    let c1 = r.commit_file("a.txt", "one\n", EPOCH);
    let c2 = r.commit_file("a.txt", "two\n", EPOCH + 100);
    assert_ne!(c1, c2);
    let src = r.source();

    let mut ws = workspace_with_manifest(tmp.path(), &[("r", &c2, &src)]);
    let mut resolution = ws.resolve(true).unwrap();
    assert!(resolution.is_clean());

    let package = resolution
        .store
        .lookup("r")
        .map(|id| resolution.store.get(id))
        .unwrap();
    assert_eq!(package.revision.as_deref(), Some(c2.as_str()));
    assert_eq!(package.revision.as_deref().unwrap().len(), 40);

    ws.checkout(&mut resolution).unwrap();

    // Promoted out of the cache and checked out at the pinned commit.
    assert!(ws.root.join("r").is_dir());
    assert!(!ws.root.join(".wit").join("r").exists());
    assert_eq!(head_of(&ws.root.join("r")), c2);

    let lock = std::fs::read_to_string(ws.lockfile_path()).unwrap();
    assert!(lock.contains(&c2));
    assert!(lock.contains("\"r\""));
}

#[test]
fn newer_dependent_overrides_an_older_ancestor_pin() {
    let tmp = tempfile::tempdir().unwrap();
    let remotes = tmp.path().join("remotes");

    let r = TestRepo::init(&remotes, "r");
    let c1 = r.commit_file("r.txt", "one\n", EPOCH);
    let c2 = r.commit_file("r.txt", "two\n", EPOCH + 100);
    let src = r.source();

    let a = TestRepo::init(&remotes, "a");
    let head_a = a.commit_manifest(&[("r", &c1, &src)], EPOCH + 200);
    let b = TestRepo::init(&remotes, "b");
    let head_b = b.commit_manifest(&[("r", &c2, &src)], EPOCH + 300);

    let mut ws = workspace_with_manifest(
        tmp.path(),
        &[("a", &head_a, &a.source()), ("b", &head_b, &b.source())],
    );
    let mut resolution = ws.resolve(true).unwrap();
    assert!(resolution.is_clean(), "errors: {:?}", resolution.errors);

    let package = resolution
        .store
        .lookup("r")
        .map(|id| resolution.store.get(id))
        .unwrap();
    assert_eq!(package.revision.as_deref(), Some(c2.as_str()));

    ws.checkout(&mut resolution).unwrap();
    assert_eq!(head_of(&ws.root.join("r")), c2);
}

#[test]
fn divergent_pins_report_a_not_ancestor_error() {
    let tmp = tempfile::tempdir().unwrap();
    let remotes = tmp.path().join("remotes");

    let r = TestRepo::init(&remotes, "r");
    let c0 = r.commit_file("r.txt", "base\n", EPOCH);
    let c1 = r.commit_file("r.txt", "master line\n", EPOCH + 50);
    r.branch("side", &c0);
    r.checkout("side");
    let c2 = r.commit_file("side.txt", "divergent line\n", EPOCH + 100);
    r.checkout("master");
    let src = r.source();

    let a = TestRepo::init(&remotes, "a");
    let head_a = a.commit_manifest(&[("r", &c1, &src)], EPOCH + 200);
    let b = TestRepo::init(&remotes, "b");
    let head_b = b.commit_manifest(&[("r", &c2, &src)], EPOCH + 300);

    let ws = workspace_with_manifest(
        tmp.path(),
        &[("a", &head_a, &a.source()), ("b", &head_b, &b.source())],
    );
    let resolution = ws.resolve(true).unwrap();

    assert_eq!(resolution.errors.len(), 1);
    match &resolution.errors[0] {
        ResolutionError::NotAncestor {
            name, loser_tag, ..
        } => {
            assert_eq!(name, "r");
            assert!(loser_tag.starts_with("r::"), "got {loser_tag}");
        }
        other => panic!("expected NotAncestor, got {other:?}"),
    }

    // The caller must refuse to check out; the lock stays untouched.
    assert_eq!(
        std::fs::read_to_string(ws.lockfile_path()).unwrap(),
        "{}\n"
    );
}

#[test]
fn a_dependee_newer_than_its_depender_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let remotes = tmp.path().join("remotes");

    let r = TestRepo::init(&remotes, "r");
    let c1 = r.commit_file("r.txt", "future\n", EPOCH + 500);
    let src = r.source();

    // The manifest that declares the edge is older than the pinned commit.
    let a = TestRepo::init(&remotes, "a");
    let head_a = a.commit_manifest(&[("r", &c1, &src)], EPOCH + 100);

    let ws = workspace_with_manifest(tmp.path(), &[("a", &head_a, &a.source())]);
    let resolution = ws.resolve(true).unwrap();

    assert_eq!(resolution.errors.len(), 1);
    assert!(matches!(
        resolution.errors[0],
        ResolutionError::DependeeNewerThanDepender { .. }
    ));

    // The offending edge was never enqueued, so 'r' was never chosen.
    let package = resolution
        .store
        .lookup("r")
        .map(|id| resolution.store.get(id))
        .unwrap();
    assert!(package.revision.is_none());
}

#[test]
fn submodules_substitute_for_a_missing_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let remotes = tmp.path().join("remotes");

    let x = TestRepo::init(&remotes, "x");
    let cx = x.commit_file("x.txt", "x\n", EPOCH);
    let y = TestRepo::init(&remotes, "y");
    let cy = y.commit_file("y.txt", "y\n", EPOCH + 10);

    let p = TestRepo::init(&remotes, "p");
    let x_src = x.source();
    let y_src = y.source();
    // Default submodule names are their checkout paths; "libs/x" must be
    // flattened to the url basename in the synthesized entries.
    let head_p = p.commit_submodules(
        &[
            ("libs/x", "libs/x", &x_src, &cx),
            ("y", "y", &y_src, &cy),
        ],
        EPOCH + 100,
    );

    let mut ws = workspace_with_manifest(tmp.path(), &[("p", &head_p, &p.source())]);
    let mut resolution = ws.resolve(true).unwrap();
    assert!(resolution.is_clean(), "errors: {:?}", resolution.errors);

    let x_pkg = resolution
        .store
        .lookup("x")
        .map(|id| resolution.store.get(id))
        .expect("libs/x flattened to x");
    assert_eq!(x_pkg.revision.as_deref(), Some(cx.as_str()));
    let y_pkg = resolution
        .store
        .lookup("y")
        .map(|id| resolution.store.get(id))
        .unwrap();
    assert_eq!(y_pkg.revision.as_deref(), Some(cy.as_str()));
    assert!(resolution.store.lookup("libs/x").is_none());

    ws.checkout(&mut resolution).unwrap();
    assert_eq!(head_of(&ws.root.join("x")), cx);
    assert_eq!(head_of(&ws.root.join("y")), cy);
}

#[test]
fn resolve_and_checkout_are_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let remotes = tmp.path().join("remotes");
    let r = TestRepo::init(&remotes, "r");
    let c1 = r.commit_file("r.txt", "one\n", EPOCH);
    let src = r.source();

    let mut ws = workspace_with_manifest(tmp.path(), &[("r", &c1, &src)]);

    let mut resolution = ws.resolve(true).unwrap();
    ws.checkout(&mut resolution).unwrap();
    let first_lock = std::fs::read_to_string(ws.lockfile_path()).unwrap();

    let mut again = ws.resolve(true).unwrap();
    assert!(again.is_clean());
    ws.checkout(&mut again).unwrap();
    let second_lock = std::fs::read_to_string(ws.lockfile_path()).unwrap();

    assert_eq!(first_lock, second_lock);
    assert_eq!(head_of(&ws.root.join("r")), c1);
}

#[test]
fn repo_path_mirror_wins_over_the_declared_source() {
    let tmp = tempfile::tempdir().unwrap();
    let mirrors = tmp.path().join("mirrors");
    let r = TestRepo::init(&mirrors, "r");
    let c1 = r.commit_file("r.txt", "one\n", EPOCH);

    // The manifest declares no source at all; only the search path knows it.
    let ws = {
        let created = Workspace::create(tmp.path(), "ws", vec![mirrors.clone()], None).unwrap();
        let entries = vec![wit::repo_entries::RepoEntry {
            message: None,
            revision: c1.clone(),
            checkout_path: "r".to_string(),
            remote_url: None,
        }];
        wit::repo_entries::write_manifest(&created.manifest_path(), &entries).unwrap();
        Workspace::open(created.root.clone(), vec![mirrors.clone()], None).unwrap()
    };

    let mut resolution = ws.resolve(true).unwrap();
    assert!(resolution.is_clean());
    let package = resolution
        .store
        .lookup("r")
        .map(|id| resolution.store.get(id))
        .unwrap();
    let expected = mirrors.join("r").display().to_string();
    assert_eq!(package.source.as_deref(), Some(expected.as_str()));

    let mut ws = ws;
    ws.checkout(&mut resolution).unwrap();
    let lock = std::fs::read_to_string(ws.lockfile_path()).unwrap();
    assert!(lock.contains(&expected));
}

#[test]
fn transitive_dependencies_are_expanded() {
    let tmp = tempfile::tempdir().unwrap();
    let remotes = tmp.path().join("remotes");

    let leaf = TestRepo::init(&remotes, "leaf");
    let c_leaf = leaf.commit_file("leaf.txt", "leaf\n", EPOCH);
    let leaf_src = leaf.source();

    let mid = TestRepo::init(&remotes, "mid");
    let c_mid = mid.commit_manifest(&[("leaf", &c_leaf, &leaf_src)], EPOCH + 100);
    let mid_src = mid.source();

    let top = TestRepo::init(&remotes, "top");
    let c_top = top.commit_manifest(&[("mid", &c_mid, &mid_src)], EPOCH + 200);

    let mut ws = workspace_with_manifest(tmp.path(), &[("top", &c_top, &top.source())]);
    let mut resolution = ws.resolve(true).unwrap();
    assert!(resolution.is_clean(), "errors: {:?}", resolution.errors);
    assert_eq!(resolution.store.len(), 3);

    ws.checkout(&mut resolution).unwrap();
    for name in ["top", "mid", "leaf"] {
        assert!(ws.root.join(name).is_dir(), "{name} missing");
    }
    assert_eq!(head_of(&ws.root.join("leaf")), c_leaf);

    // All three landed in the lock.
    let lock = wit::lock::Lock::read(&ws.lockfile_path()).unwrap();
    assert!(lock.contains("top") && lock.contains("mid") && lock.contains("leaf"));
}
