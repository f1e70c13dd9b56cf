use std::path::{Path, PathBuf};

use crate::services::worker::uri::Uri;

#[test]
fn scheme_is_lowercased() {
    assert_eq!(Uri::new("FILE:///Tmp/a.lm").as_str(), "file:///Tmp/a.lm");
}

#[test]
fn separators_and_dot_segments_normalize() {
    assert_eq!(
        Uri::new("file:///a/b/../c/./d.lm").as_str(),
        "file:///a/c/d.lm"
    );
    assert_eq!(Uri::new("file:///a\\b\\c.lm").as_str(), "file:///a/b/c.lm");
}

#[test]
fn equal_identities_compare_equal() {
    assert_eq!(
        Uri::new("FILE:///x/./y.lm"),
        Uri::new("file:///x/y.lm")
    );
}

#[test]
fn path_round_trip() {
    let uri = Uri::from_path(Path::new("/proj/src/main.lm"));
    assert_eq!(uri.to_path(), Some(PathBuf::from("/proj/src/main.lm")));
    assert_eq!(uri.parent_dir(), Some(PathBuf::from("/proj/src")));
}

#[test]
fn from_path_resolves_relative_segments() {
    let uri = Uri::from_path(Path::new("/proj/src/../lib/util.lm"));
    assert_eq!(uri.as_str(), "file:///proj/lib/util.lm");
}

#[test]
fn non_file_uri_has_no_path() {
    assert_eq!(Uri::new("untitled:demo").to_path(), None);
}
