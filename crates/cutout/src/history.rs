//! Linear undo/redo over full-document snapshots.

use std::collections::VecDeque;

use crate::{
    compositor::Layer,
    config::HISTORY_DEPTH,
    error::{CutoutError, Result},
};

/// Full copy of the layer stack (base layer included) at one point in time.
///
/// Layer pixels are immutable and shared, so cloning the list is a deep copy
/// as far as any later edit can observe.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub description: String,
    pub layers: Vec<Layer>,
}

impl Snapshot {
    pub fn new(description: impl Into<String>, layers: &[Layer]) -> Self {
        Self {
            description: description.into(),
            layers: layers.to_vec(),
        }
    }

    fn memory_bytes(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.image().as_raw().len())
            .sum()
    }
}

/// Undo/redo stacks; pushing a new snapshot discards everything redoable.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: Vec<Snapshot>,
    max_depth: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_DEPTH)
    }
}

impl History {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Record the state before a destructive operation
    pub fn push(&mut self, snapshot: Snapshot) {
        self.redo_stack.clear();
        self.undo_stack.push_back(snapshot);
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    /// Step back: `current` goes onto the redo stack, the previous state is returned
    pub fn undo(&mut self, current: Snapshot) -> Result<Snapshot> {
        let previous = self
            .undo_stack
            .pop_back()
            .ok_or_else(|| CutoutError::precondition("nothing to undo"))?;
        self.redo_stack.push(Snapshot {
            description: previous.description.clone(),
            layers: current.layers,
        });
        Ok(previous)
    }

    /// Step forward again after an undo
    pub fn redo(&mut self, current: Snapshot) -> Result<Snapshot> {
        let next = self
            .redo_stack
            .pop()
            .ok_or_else(|| CutoutError::precondition("nothing to redo"))?;
        self.undo_stack.push_back(Snapshot {
            description: next.description.clone(),
            layers: current.layers,
        });
        Ok(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|s| s.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|s| s.description.as_str())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Approximate pixel memory held by both stacks
    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(Snapshot::memory_bytes)
            .sum()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Compositor;
    use image::{Rgba, RgbaImage};

    fn layers_with(count: usize) -> Vec<Layer> {
        let mut compositor = Compositor::new(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        for i in 0..count {
            compositor.push_layer(format!("layer {i}"), RgbaImage::new(2, 2));
        }
        compositor.layers().to_vec()
    }

    #[test]
    fn test_undo_on_empty_history_is_precondition_failure() {
        let mut history = History::default();
        let err = history.undo(Snapshot::new("now", &layers_with(0))).unwrap_err();
        assert!(matches!(err, CutoutError::Precondition(_)));
        assert!(history.redo(Snapshot::new("now", &layers_with(0))).is_err());
    }

    #[test]
    fn test_undo_then_redo_restores_states() {
        let s0 = layers_with(0);
        let s1 = layers_with(1);
        let mut history = History::default();

        history.push(Snapshot::new("extract", &s0));
        let restored = history.undo(Snapshot::new("current", &s1)).unwrap();
        assert_eq!(restored.layers, s0);
        assert_eq!(history.redo_description(), Some("extract"));

        let again = history.redo(Snapshot::new("current", &s0)).unwrap();
        assert_eq!(again.layers, s1);
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_push_discards_redo_states() {
        let mut history = History::default();
        history.push(Snapshot::new("a", &layers_with(0)));
        history.undo(Snapshot::new("now", &layers_with(1))).unwrap();
        assert!(history.can_redo());

        history.push(Snapshot::new("b", &layers_with(0)));
        assert!(!history.can_redo());
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn test_depth_limit_drops_oldest() {
        let mut history = History::new(2);
        for name in ["a", "b", "c"] {
            history.push(Snapshot::new(name, &layers_with(0)));
        }
        assert_eq!(history.undo_count(), 2);
        assert_eq!(history.undo_description(), Some("c"));
        assert!(history.memory_usage() > 0);
    }
}
