//! In-flight live events
//!
//! Events between `start_event` and `stop_event` live in a slot arena. Each
//! start hands out a generational handle; cameras key their open footage
//! windows by that handle rather than by the public string id.

use crate::project::schema::EventRecord;
use std::collections::HashMap;

/// Slot handle of an in-flight event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    /// Start order, used to close events deterministically
    opened: u64,
    event: Option<EventRecord>,
}

#[derive(Debug, Default)]
pub struct PendingEvents {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<String, EventHandle>,
    next_open: u64,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an opened event
    ///
    /// Re-opening an id that is still pending replaces its record and keeps
    /// the existing handle.
    pub fn insert(&mut self, event: EventRecord) -> EventHandle {
        self.next_open += 1;

        if let Some(&handle) = self.by_id.get(&event.id) {
            let slot = &mut self.slots[handle.index as usize];
            slot.opened = self.next_open;
            slot.event = Some(event);
            return handle;
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        let handle = EventHandle {
            index,
            generation: slot.generation,
        };
        slot.opened = self.next_open;
        self.by_id.insert(event.id.clone(), handle);
        slot.event = Some(event);
        handle
    }

    pub fn handle(&self, id: &str) -> Option<EventHandle> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, handle: EventHandle) -> Option<&EventRecord> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.event.as_ref())
    }

    /// Remove an event by id, freeing its slot
    pub fn take(&mut self, id: &str) -> Option<(EventHandle, EventRecord)> {
        let handle = self.by_id.remove(id)?;
        let slot = &mut self.slots[handle.index as usize];
        let event = slot.event.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some((handle, event))
    }

    /// Ids of every pending event, oldest start first
    pub fn open_ids(&self) -> Vec<String> {
        let mut open: Vec<(u64, &str)> = self
            .slots
            .iter()
            .filter_map(|slot| slot.event.as_ref().map(|e| (slot.opened, e.id.as_str())))
            .collect();
        open.sort_unstable_by_key(|(opened, _)| *opened);
        open.into_iter().map(|(_, id)| id.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::schema::EventKind;
    use chrono::Utc;

    fn event(id: &str) -> EventRecord {
        EventRecord::new(id.to_string(), EventKind::ImportantMoment, 0.0, Utc::now())
    }

    #[test]
    fn test_take_removes_exactly_once() {
        let mut pending = PendingEvents::new();
        let handle = pending.insert(event("a"));

        assert_eq!(pending.handle("a"), Some(handle));
        assert!(pending.get(handle).is_some());

        let (taken, record) = pending.take("a").unwrap();
        assert_eq!(taken, handle);
        assert_eq!(record.id, "a");
        assert!(pending.take("a").is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_slot_reuse_invalidates_old_handle() {
        let mut pending = PendingEvents::new();
        let first = pending.insert(event("a"));
        pending.take("a");

        let second = pending.insert(event("b"));
        assert_ne!(first, second);
        assert!(pending.get(first).is_none());
        assert_eq!(pending.get(second).map(|e| e.id.as_str()), Some("b"));
    }

    #[test]
    fn test_reopen_keeps_handle() {
        let mut pending = PendingEvents::new();
        let handle = pending.insert(event("a"));
        pending.insert(event("b"));
        let again = pending.insert(event("a"));

        assert_eq!(handle, again);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.open_ids(), vec!["b".to_string(), "a".to_string()]);
    }
}
