//! Current text of each known file.
//!
//! A file is either open in an editor, in which case the rope is
//! authoritative and disk is ignored, or it lives on disk. Absence from
//! the map is the implicit
//! on-disk sentinel; an explicit `OnDisk` entry only exists to carry the
//! dirty flag of a `touch`.

use ropey::Rope;

use crate::services::worker::clock::Version;

#[derive(Debug, Clone)]
pub enum FileContents {
    Opened { version: Version, text: Rope },
    OnDisk { dirty: bool },
}

impl FileContents {
    pub fn opened(version: Version, text: &str) -> Self {
        FileContents::Opened {
            version,
            text: Rope::from_str(text),
        }
    }

    pub fn is_opened(&self) -> bool {
        matches!(self, FileContents::Opened { .. })
    }

    pub fn open_version(&self) -> Option<Version> {
        match self {
            FileContents::Opened { version, .. } => Some(*version),
            FileContents::OnDisk { .. } => None,
        }
    }
}
