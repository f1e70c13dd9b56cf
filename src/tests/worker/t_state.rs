use std::sync::Arc;

use crate::core::names::ModuleName;
use crate::core::tree::parsed::Module;
use crate::services::worker::clock::{Clock, Version};
use crate::services::worker::state::{
    FileState, FileStore, OpenedFileState, VersionedArtifact, WorkingMark,
};
use crate::services::worker::uri::Uri;

#[test]
fn versioned_artifact_survives_later_failures() {
    let mut slot: VersionedArtifact<u32> = VersionedArtifact::default();
    assert!(slot.latest().is_none());

    slot.record(Version(1), 10);
    assert_eq!(slot.current_at(Version(1)), Some(&10));
    // Version 2 failed somewhere upstream: the slot is simply not updated,
    // and the old success stays reachable.
    assert_eq!(slot.current_at(Version(2)), None);
    assert_eq!(slot.latest(), Some((Version(1), &10)));

    slot.record(Version(3), 30);
    assert_eq!(slot.current_at(Version(3)), Some(&30));
    assert_eq!(slot.current_at(Version(1)), None);
}

#[test]
fn working_mark_accessors() {
    assert!(WorkingMark::Done(Clock(2)).is_done());
    assert_eq!(WorkingMark::Done(Clock(2)).done_at(), Some(Clock(2)));
    assert!(!WorkingMark::WorkingRoot.is_done());
}

#[test]
fn file_store_maintains_the_inverse_name_index() {
    let mut store = FileStore::default();
    let uri = Uri::new("file:///a.lm");
    let name = ModuleName(1);
    store.insert(uri.clone(), FileState::Opened(OpenedFileState::new(name)));

    assert_eq!(store.uri_of(name), Some(&uri));
    assert_eq!(store.len(), 1);

    store.remove(&uri);
    assert_eq!(store.uri_of(name), None);
    assert!(store.is_empty());
}

#[test]
fn replacing_a_state_with_a_new_name_updates_the_index() {
    let mut store = FileStore::default();
    let uri = Uri::new("file:///a.lm");
    store.insert(
        uri.clone(),
        FileState::Opened(OpenedFileState::new(ModuleName(1))),
    );
    store.insert(
        uri.clone(),
        FileState::Opened(OpenedFileState::new(ModuleName(2))),
    );

    assert_eq!(store.uri_of(ModuleName(1)), None);
    assert_eq!(store.uri_of(ModuleName(2)), Some(&uri));
}

#[test]
fn opened_state_serves_latest_signature_to_importers() {
    let mut state = OpenedFileState::new(ModuleName(5));
    assert!(FileState::Opened(state.clone()).signature().is_none());

    state.parsed.record(Version(1), Arc::new(Module::default()));
    let file = FileState::Opened(state);
    assert!(file.signature().is_none());
    assert!(file.type_env().is_none());
}
