use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// ordered set of event ids; iteration follows id order, which is
/// declaration order, so every recursion over a set is deterministic
pub type EventSet = BTreeSet<EventId>;

pub(crate) static EMPTY_SET: EventSet = EventSet::new();

/// interned event identifier, an index into the owning graph's arena
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct EventId(u32);

impl EventId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// flat arena of event names; ids are handed out in insertion order
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Events {
    names: Vec<String>,
    by_name: std::collections::BTreeMap<String, EventId>,
}

impl Events {
    /// get-or-insert an event name
    pub fn intern(&mut self, name: &str) -> EventId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = EventId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<EventId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: EventId) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EventId> + '_ {
        (0..self.names.len() as u32).map(EventId)
    }

    pub fn all(&self) -> EventSet {
        self.iter().collect()
    }
}

/// total binary relation over events, stored as a dense adjacency table;
/// sources without an entry map to the empty set
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Relation {
    targets: Vec<EventSet>,
}

impl Relation {
    pub fn new(len: usize) -> Self {
        Self {
            targets: vec![EventSet::new(); len],
        }
    }

    pub fn insert(&mut self, src: EventId, dst: EventId) {
        self.targets[src.index()].insert(dst);
    }

    pub fn targets(&self, src: EventId) -> &EventSet {
        self.targets.get(src.index()).unwrap_or(&EMPTY_SET)
    }

    /// swap sources and targets
    pub fn inverse(&self) -> Self {
        let mut inv = Self::new(self.targets.len());
        for (src, ts) in self.iter() {
            for &t in ts {
                inv.insert(t, src);
            }
        }
        inv
    }

    /// union of all target sets
    pub fn target_union(&self) -> EventSet {
        self.targets.iter().flatten().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventId, &EventSet)> + '_ {
        self.targets
            .iter()
            .enumerate()
            .map(|(i, ts)| (EventId(i as u32), ts))
    }

    pub fn is_empty(&self) -> bool {
        self.targets.iter().all(BTreeSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut evs = Events::default();
        let a = evs.intern("A");
        let b = evs.intern("B");
        assert_ne!(a, b);
        assert_eq!(evs.intern("A"), a);
        assert_eq!(evs.len(), 2);
        assert_eq!(evs.name(b), "B");
        assert_eq!(evs.lookup("B"), Some(b));
        assert_eq!(evs.lookup("C"), None);
    }

    #[test]
    fn ids_keep_declaration_order() {
        let mut evs = Events::default();
        let ids: Vec<_> = ["Z", "M", "A"].iter().map(|n| evs.intern(n)).collect();
        let iterated: Vec<_> = evs.iter().collect();
        assert_eq!(ids, iterated);
    }

    #[test]
    fn relation_inverse_and_union() {
        let mut evs = Events::default();
        let a = evs.intern("A");
        let b = evs.intern("B");
        let c = evs.intern("C");
        let mut rel = Relation::new(evs.len());
        rel.insert(a, b);
        rel.insert(a, c);
        rel.insert(b, c);
        assert!(rel.targets(c).is_empty());
        assert_eq!(rel.target_union(), [b, c].into_iter().collect::<EventSet>());
        let inv = rel.inverse();
        assert_eq!(inv.targets(c), &[a, b].into_iter().collect::<EventSet>());
        assert_eq!(inv.targets(b), &[a].into_iter().collect::<EventSet>());
        assert!(inv.targets(a).is_empty());
    }
}
