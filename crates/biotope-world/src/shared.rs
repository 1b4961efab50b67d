//! Handle for driving an ecosystem from one task while others read it.

use crate::ecosystem::{Ecosystem, TickSummary};
use crate::snapshot::Snapshot;
use biotope_core::{Category, Coordinate, Result};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Copy of everything a display needs for one picture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub tick: u64,
    pub revision: u64,
    pub width: i32,
    pub height: i32,
    pub cells: Vec<(Coordinate, Category)>,
}

#[derive(Clone)]
pub struct SharedEcosystem {
    inner: Arc<RwLock<Ecosystem>>,
}

impl SharedEcosystem {
    pub fn new(ecosystem: Ecosystem) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ecosystem)),
        }
    }

    /// Run one tick under the write lock
    pub fn evolve(&self) -> TickSummary {
        let mut ecosystem = self.inner.write();
        ecosystem.evolve()
    }

    /// Hold the read lock for a longer read pass
    pub fn read(&self) -> RwLockReadGuard<'_, Ecosystem> {
        self.inner.read()
    }

    pub fn frame(&self) -> Frame {
        let ecosystem = self.inner.read();
        Frame {
            tick: ecosystem.tick(),
            revision: ecosystem.revision(),
            width: ecosystem.width(),
            height: ecosystem.height(),
            cells: ecosystem.cells().collect(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().serialize()
    }

    /// Swap in a snapshot; readers see either the old or the new state
    pub fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        let mut ecosystem = self.inner.write();
        ecosystem.load(snapshot)?;
        debug!(tick = ecosystem.tick(), "Shared ecosystem restored");
        Ok(())
    }

    pub fn cursor(&self) -> FrameCursor {
        FrameCursor {
            shared: self.clone(),
            last_revision: None,
        }
    }
}

/// Reader that remembers which revision it last saw
pub struct FrameCursor {
    shared: SharedEcosystem,
    last_revision: Option<u64>,
}

impl FrameCursor {
    /// Current frame and whether it differs from the previous read
    pub fn next_frame(&mut self) -> (Frame, bool) {
        let frame = self.shared.frame();
        let changed = self.last_revision != Some(frame.revision);
        self.last_revision = Some(frame.revision);
        (frame, changed)
    }

    /// Cheap check that skips copying the cells
    pub fn has_changed(&self) -> bool {
        self.last_revision != Some(self.shared.read().revision())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biotope_core::ConfigurationCatalog;

    fn shared() -> SharedEcosystem {
        let mut catalog = ConfigurationCatalog::default();
        catalog.biotope.width = 30;
        catalog.biotope.height = 20;
        for species in &mut catalog.species {
            species.initial_count /= 20;
        }
        SharedEcosystem::new(Ecosystem::new(catalog, 21).unwrap())
    }

    #[test]
    fn test_frame_matches_ecosystem() {
        let shared = shared();
        let frame = shared.frame();
        let ecosystem = shared.read();

        assert_eq!(frame.tick, 0);
        assert_eq!(frame.width, 30);
        assert_eq!(frame.cells.len(), ecosystem.population());
    }

    #[test]
    fn test_cursor_reports_changes() {
        let shared = shared();
        let mut cursor = shared.cursor();

        let (_, changed) = cursor.next_frame();
        assert!(changed);
        let (_, changed) = cursor.next_frame();
        assert!(!changed);
        assert!(!cursor.has_changed());

        shared.evolve();
        assert!(cursor.has_changed());
        let (frame, changed) = cursor.next_frame();
        assert!(changed);
        assert_eq!(frame.tick, 1);
    }

    #[test]
    fn test_restore_is_visible_to_cursor() {
        let shared = shared();
        let saved = shared.snapshot();
        let mut cursor = shared.cursor();

        shared.evolve();
        shared.evolve();
        cursor.next_frame();

        shared.restore(&saved).unwrap();
        let (frame, changed) = cursor.next_frame();
        assert!(changed);
        assert_eq!(frame.tick, 0);
        assert_eq!(shared.snapshot(), saved);
    }

    #[test]
    fn test_clones_share_state() {
        let shared = shared();
        let other = shared.clone();
        shared.evolve();
        assert_eq!(other.frame().tick, 1);
    }
}
