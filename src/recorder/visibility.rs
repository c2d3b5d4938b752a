//! Subject registry and per-camera visibility cache
//!
//! Subjects are the players and actors that footage windows are tagged with.
//! The geometric test lives behind [`crate::capture::VisibilityProbe`]; this
//! module only remembers the last frame at which each subject was seen.

use std::collections::{BTreeSet, HashMap};

pub type SubjectId = String;

/// Stable handle returned on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectHandle(usize);

#[derive(Debug, Clone)]
struct Subject {
    name: String,
    /// Unknown until the game assigns one; unidentified subjects are skipped
    id: Option<SubjectId>,
}

/// Registered subjects, identified or not
#[derive(Debug, Clone, Default)]
pub struct SubjectRegistry {
    subjects: Vec<Option<Subject>>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>) -> SubjectHandle {
        let handle = SubjectHandle(self.subjects.len());
        self.subjects.push(Some(Subject {
            name: name.into(),
            id: None,
        }));
        handle
    }

    pub fn unregister(&mut self, handle: SubjectHandle) -> bool {
        self.subjects
            .get_mut(handle.0)
            .and_then(Option::take)
            .is_some()
    }

    /// Assign the subject's identity. Returns false for unknown handles.
    pub fn set_id(&mut self, handle: SubjectHandle, id: impl Into<SubjectId>) -> bool {
        match self.subjects.get_mut(handle.0) {
            Some(Some(subject)) => {
                let id = id.into();
                tracing::debug!("Subject id {} set for {}", id, subject.name);
                subject.id = Some(id);
                true
            }
            _ => false,
        }
    }

    pub fn id(&self, handle: SubjectHandle) -> Option<&str> {
        self.subjects
            .get(handle.0)
            .and_then(Option::as_ref)
            .and_then(|s| s.id.as_deref())
    }

    /// Ids of every registered subject that has one
    pub fn identified(&self) -> impl Iterator<Item = &str> {
        self.subjects
            .iter()
            .flatten()
            .filter_map(|s| s.id.as_deref())
    }

    pub fn len(&self) -> usize {
        self.subjects.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last frame each subject was seen on one camera
#[derive(Debug, Clone, Default)]
pub struct VisibilityCache {
    last_seen: HashMap<SubjectId, u64>,
}

impl VisibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting at `frame`
    pub fn mark(&mut self, subject: &str, frame: u64) {
        match self.last_seen.get_mut(subject) {
            Some(seen) => *seen = frame,
            None => {
                self.last_seen.insert(subject.to_string(), frame);
            }
        }
    }

    pub fn last_seen(&self, subject: &str) -> Option<u64> {
        self.last_seen.get(subject).copied()
    }

    /// Every subject seen at or after `frame`
    pub fn visible_since(&self, frame: u64) -> BTreeSet<SubjectId> {
        self.last_seen
            .iter()
            .filter(|(_, &seen)| seen >= frame)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_since() {
        let mut cache = VisibilityCache::new();
        cache.mark("p1", 10);
        cache.mark("p2", 25);
        cache.mark("p3", 40);

        let since: Vec<_> = cache.visible_since(25).into_iter().collect();
        assert_eq!(since, vec!["p2".to_string(), "p3".to_string()]);
        assert!(cache.visible_since(41).is_empty());
        assert_eq!(cache.visible_since(0).len(), 3);
    }

    #[test]
    fn test_mark_overwrites() {
        let mut cache = VisibilityCache::new();
        cache.mark("p1", 3);
        cache.mark("p1", 9);
        assert_eq!(cache.last_seen("p1"), Some(9));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_registry_skips_unidentified() {
        let mut registry = SubjectRegistry::new();
        let a = registry.register("alice");
        let b = registry.register("bob");
        registry.register("npc");

        assert_eq!(registry.identified().count(), 0);
        assert!(registry.set_id(a, "user-a"));
        assert!(registry.set_id(b, "user-b"));

        let ids: Vec<&str> = registry.identified().collect();
        assert_eq!(ids, vec!["user-a", "user-b"]);

        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert!(!registry.set_id(a, "again"));
        assert_eq!(registry.id(b), Some("user-b"));
        assert_eq!(registry.len(), 2);
    }
}
