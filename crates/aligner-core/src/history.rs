use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::consts::DEFAULT_HISTORY_CAPACITY;
use crate::params::AlignmentParams;

#[derive(Clone, Debug, Default)]
struct Timeline {
    states: Vec<AlignmentParams>,
    cursor: usize,
}

/// Bounded per-image undo/redo of alignment snapshots.
///
/// Each timeline holds at most `capacity` states; the cursor marks the
/// current one. Pushing drops any redo tail, and overflowing drops the
/// oldest state.
#[derive(Clone, Debug)]
pub struct History {
    capacity: usize,
    timelines: HashMap<PathBuf, Timeline>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            timelines: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an edit of `path` from `before` to `after`.
    ///
    /// `before` is stored first unless it already is the current state, so an
    /// undo always lands on the pre-edit params. Consecutive identical states
    /// are stored once.
    pub fn push(&mut self, path: &Path, before: &AlignmentParams, after: AlignmentParams) {
        let capacity = self.capacity;
        let line = self.timelines.entry(path.to_path_buf()).or_default();

        line.states.truncate(line.cursor + 1);
        if line.states.last() != Some(before) {
            line.states.push(before.clone());
        }
        if line.states.last() != Some(&after) {
            line.states.push(after);
        }
        if line.states.len() > capacity {
            let excess = line.states.len() - capacity;
            line.states.drain(..excess);
        }
        line.cursor = line.states.len() - 1;
    }

    /// Step back; `None` when already at the oldest state.
    pub fn undo(&mut self, path: &Path) -> Option<AlignmentParams> {
        let line = self.timelines.get_mut(path)?;
        if line.cursor == 0 {
            return None;
        }
        line.cursor -= 1;
        line.states.get(line.cursor).cloned()
    }

    /// Step forward; `None` when there is nothing to redo.
    pub fn redo(&mut self, path: &Path) -> Option<AlignmentParams> {
        let line = self.timelines.get_mut(path)?;
        if line.cursor + 1 >= line.states.len() {
            return None;
        }
        line.cursor += 1;
        line.states.get(line.cursor).cloned()
    }

    pub fn can_undo(&self, path: &Path) -> bool {
        self.timelines.get(path).is_some_and(|l| l.cursor > 0)
    }

    pub fn can_redo(&self, path: &Path) -> bool {
        self.timelines
            .get(path)
            .is_some_and(|l| l.cursor + 1 < l.states.len())
    }

    /// Number of stored states for `path`.
    pub fn len(&self, path: &Path) -> usize {
        self.timelines.get(path).map_or(0, |l| l.states.len())
    }

    pub fn clear(&mut self) {
        self.timelines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(v: f64) -> AlignmentParams {
        AlignmentParams {
            tx: v,
            ..Default::default()
        }
    }

    #[test]
    fn test_undo_redo_walks_timeline() {
        let p = PathBuf::from("a.png");
        let mut h = History::new(10);
        h.push(&p, &tx(0.0), tx(1.0));
        h.push(&p, &tx(1.0), tx(2.0));
        assert_eq!(h.undo(&p), Some(tx(1.0)));
        assert_eq!(h.undo(&p), Some(tx(0.0)));
        assert_eq!(h.undo(&p), None);
        assert_eq!(h.redo(&p), Some(tx(1.0)));
        assert_eq!(h.redo(&p), Some(tx(2.0)));
        assert_eq!(h.redo(&p), None);
    }

    #[test]
    fn test_push_discards_redo_tail() {
        let p = PathBuf::from("a.png");
        let mut h = History::new(10);
        assert!(!h.can_undo(&p));
        h.push(&p, &tx(0.0), tx(1.0));
        h.push(&p, &tx(1.0), tx(2.0));
        h.undo(&p);
        assert!(h.can_undo(&p) && h.can_redo(&p));
        h.push(&p, &tx(1.0), tx(5.0));
        assert!(!h.can_redo(&p));
        assert_eq!(h.undo(&p), Some(tx(1.0)));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let p = PathBuf::from("a.png");
        let mut h = History::new(3);
        for i in 1..=10 {
            h.push(&p, &tx((i - 1) as f64), tx(i as f64));
        }
        assert_eq!(h.len(&p), 3);
        assert_eq!(h.undo(&p), Some(tx(9.0)));
        assert_eq!(h.undo(&p), Some(tx(8.0)));
        assert_eq!(h.undo(&p), None);
    }

    #[test]
    fn test_unknown_path_has_nothing() {
        let mut h = History::default();
        assert_eq!(h.undo(Path::new("x.png")), None);
        assert_eq!(h.redo(Path::new("x.png")), None);
    }
}
