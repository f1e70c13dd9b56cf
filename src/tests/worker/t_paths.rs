use std::path::PathBuf;

use crate::services::worker::paths::library_paths;

#[test]
fn configured_extras_come_first_in_order() {
    let extras = vec![PathBuf::from("/first"), PathBuf::from("/second")];
    let paths = library_paths(&extras);
    assert!(paths.len() >= 2);
    assert_eq!(paths[0], PathBuf::from("/first"));
    assert_eq!(paths[1], PathBuf::from("/second"));
}

#[test]
fn empty_config_yields_only_discovered_entries() {
    let paths = library_paths(&[]);
    // Whatever the environment contributes, nothing else sneaks in ahead.
    for path in &paths {
        assert!(!path.as_os_str().is_empty());
    }
}
