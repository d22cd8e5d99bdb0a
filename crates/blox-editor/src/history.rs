//! Undo/redo stacks of recorded events.
//!
//! Events are recorded one by one as they fire; undo and redo operate on
//! whole groups. Popping the undo stack yields a group in reverse
//! chronological order and moves it onto the redo stack, so popping redo
//! yields it forward again.

use blox_core::events::Event;

#[derive(Debug, Clone)]
pub struct UndoStack {
    undo: Vec<Event>,
    redo: Vec<Event>,
    /// Maximum number of recorded events.
    max_depth: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl UndoStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Record a new user change. Clears redo.
    pub fn record(&mut self, event: Event) {
        self.undo.push(event);
        self.redo.clear();
        if self.undo.len() > self.max_depth {
            let excess = self.undo.len() - self.max_depth;
            self.undo.drain(..excess);
        }
    }

    /// Pop the newest group from the undo stack (or the redo stack when
    /// `redo`) and push it onto the other one. Events come back newest
    /// first for undo and oldest first for redo.
    pub fn pop_group(&mut self, redo: bool) -> Vec<Event> {
        let (input, output) = if redo {
            (&mut self.redo, &mut self.undo)
        } else {
            (&mut self.undo, &mut self.redo)
        };
        let Some(first) = input.pop() else {
            return Vec::new();
        };
        let mut events = vec![first];
        while let Some(top) = input.last()
            && events[0].group.is_some()
            && top.group == events[0].group
        {
            if let Some(event) = input.pop() {
                events.push(event);
            }
        }
        output.extend(events.iter().cloned());
        events
    }

    /// Forget every undo entry of `group`.
    pub fn discard_group(&mut self, group: &str) {
        self.undo.retain(|e| e.group.as_deref() != Some(group));
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
