//! Cyclic traversal of the current photo-index snapshot.

use std::path::Path;

use crate::index::Snapshot;

/// Cursor into the latest snapshot.
///
/// The cursor is positional: when a rescan replaces the snapshot, rotation
/// continues from the same index, reduced modulo the new length when the
/// list shrank. An empty snapshot resets the cursor to its sentinel so the
/// first photo after a repopulation starts the cycle from the top.
#[derive(Debug, Default)]
pub struct Rotator {
    cursor: Option<usize>,
}

impl Rotator {
    pub const fn new() -> Self {
        Self { cursor: None }
    }

    /// Step to the next photo in `snapshot`, wrapping after the last one.
    ///
    /// Returns `None` when the snapshot holds no photos.
    pub fn advance<'a>(&mut self, snapshot: &'a Snapshot) -> Option<&'a Path> {
        if snapshot.is_empty() {
            self.cursor = None;
            return None;
        }
        let next = match self.cursor {
            Some(cursor) => (cursor + 1) % snapshot.len(),
            None => 0,
        };
        self.cursor = Some(next);
        snapshot.path_at(next)
    }
}
