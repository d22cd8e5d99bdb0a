//! Per-operation event bookkeeping.
//!
//! Every graph mutation takes a `&mut MutationContext`. The context decides
//! whether events are fired at all, which group they belong to, and whether
//! undo should record them, and it collects what was fired so the owner can
//! dispatch it afterwards.

use crate::events::{Event, EventKind};
use crate::id::Uid;

#[derive(Debug, Clone)]
pub struct MutationContext {
    workspace_id: Option<Uid>,
    group: Option<String>,
    record_undo: bool,
    enabled: bool,
    events: Vec<Event>,
}

impl Default for MutationContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MutationContext {
    pub fn new(workspace_id: Option<Uid>) -> Self {
        Self {
            workspace_id,
            group: None,
            record_undo: true,
            enabled: true,
            events: Vec::new(),
        }
    }

    /// A context that drops every event.
    pub fn silent() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// A fresh group name.
    pub fn new_group() -> String {
        Uid::generate().as_str().to_owned()
    }

    #[must_use]
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    #[must_use]
    pub fn with_record_undo(mut self, record_undo: bool) -> Self {
        self.record_undo = record_undo;
        self
    }

    pub fn workspace_id(&self) -> Option<Uid> {
        self.workspace_id
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn set_group(&mut self, group: Option<String>) {
        self.group = group;
    }

    pub fn record_undo(&self) -> bool {
        self.record_undo
    }

    pub fn set_record_undo(&mut self, record_undo: bool) {
        self.record_undo = record_undo;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fire an event with its type's default undo flag.
    pub fn fire(&mut self, kind: EventKind) {
        self.fire_event(Event::new(kind));
    }

    /// Stamp workspace, group and undo flag onto `event` and queue it.
    /// The event's own `record_undo = false` is never overridden to true.
    pub fn fire_event(&mut self, mut event: Event) {
        if !self.enabled {
            return;
        }
        event.workspace_id = self.workspace_id;
        event.group = self.group.clone();
        event.record_undo &= self.record_undo;
        self.events.push(event);
    }

    /// Run `f` with event firing disabled, restoring the previous state.
    pub fn with_events_disabled<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was_enabled = self.enabled;
        self.enabled = false;
        let result = f(self);
        self.enabled = was_enabled;
        result
    }

    /// Run `f` inside a group, opening a fresh one if none is set.
    pub fn in_group<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        if self.group.is_some() {
            return f(self);
        }
        self.group = Some(Self::new_group());
        let result = f(self);
        self.group = None;
        result
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
