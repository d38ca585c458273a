//! Workspace isolation across ids and caller working directories

use proptest::prelude::*;
use std::path::Path;
use xstack_workspace::{sanitize, Workspace, WorkspaceDirs, WorkspaceId, WorkspaceSpec};

fn disjoint(a: &WorkspaceDirs, b: &WorkspaceDirs) -> bool {
    a.roots()
        .iter()
        .all(|x| b.roots().iter().all(|y| !x.starts_with(y) && !y.starts_with(x)))
}

#[test]
fn ten_workspaces_are_pairwise_disjoint() {
    let dir = tempfile::tempdir().unwrap();
    let workspaces: Vec<Workspace> = (0..10)
        .map(|i| {
            let spec = WorkspaceSpec::new(dir.path()).with_discriminator(Some(format!("ws-{i}")));
            Workspace::create(&spec).unwrap()
        })
        .collect();

    for (i, a) in workspaces.iter().enumerate() {
        for b in &workspaces[i + 1..] {
            assert_ne!(a.id(), b.id());
            assert!(disjoint(a.dirs(), b.dirs()));
            assert!(!a.allowed(&b.dirs().dist_root.join("f")));
        }
    }
}

#[test]
fn relative_repo_root_resolves_independent_of_caller() {
    let dir = tempfile::tempdir().unwrap();
    let absolute = Workspace::create(&WorkspaceSpec::new(dir.path())).unwrap();

    // Same root expressed with redundant components
    let noisy = dir.path().join(".").join("sub").join("..");
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    let other = Workspace::create(&WorkspaceSpec::new(noisy)).unwrap();

    assert_eq!(absolute.id(), other.id());
    assert_eq!(absolute.dirs(), other.dirs());
}

proptest! {
    #[test]
    fn distinct_ids_give_disjoint_roots(a in "[a-z0-9]{1,20}", b in "[a-z0-9]{1,20}") {
        prop_assume!(a != b);
        let root = Path::new("/repo");
        let ida = WorkspaceId::derive(root, "seed", Some(&a));
        let idb = WorkspaceId::derive(root, "seed", Some(&b));
        prop_assert_eq!(ida.as_str(), sanitize(&a));
        let da = WorkspaceDirs::for_id(root, &ida);
        let db = WorkspaceDirs::for_id(root, &idb);
        prop_assert!(disjoint(&da, &db));
    }
}
