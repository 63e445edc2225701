use crate::event::EMPTY_SET;
use crate::{EventId, EventSet, Events, Relation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// dynamic state of a graph: which events have run (and still matter to a
/// condition), are part of the process, and owe a future run.
///
/// the triple is totally ordered so it can double as a search cache key.
#[derive(
    Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord,
)]
pub struct Marking {
    pub executed: EventSet,
    pub included: EventSet,
    pub pending: EventSet,
}

/// a nested graph executing one shared event in its own marking
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SubProcess {
    pub graph: Graph,
    /// id of the shared event in the sub-process graph's own arena
    pub local: EventId,
}

// NOTE: the relation tables and maps are fixed at construction time and
// validated there; after `build` only the marking (and the markings of
// nested sub-process graphs) may change.

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Graph {
    pub(crate) events: Events,
    pub(crate) labels: BTreeSet<String>,
    pub(crate) label_map: Vec<String>,
    pub(crate) label_map_inv: BTreeMap<String, EventSet>,
    pub(crate) role_map: Vec<String>,

    /// conditions_for[e] holds the events e needs executed or excluded
    pub(crate) conditions_for: Relation,
    /// milestones_for[e] holds the events whose pending status blocks e
    pub(crate) milestones_for: Relation,
    /// response_to[e] holds the events made pending when e fires
    pub(crate) response_to: Relation,
    pub(crate) excludes_to: Relation,
    pub(crate) includes_to: Relation,

    // derived at construction: events that condition anything (only these
    // dirty `executed`), and the reverse views of the effect relations
    pub(crate) conditions: EventSet,
    pub(crate) includes_for: Relation,
    pub(crate) excludes_for: Relation,
    pub(crate) response_for: Relation,

    pub(crate) initial_marking: Marking,
    pub marking: Marking,

    pub(crate) sub_processes: BTreeMap<EventId, SubProcess>,
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate event '{0}'")]
    DuplicateEvent(String),

    #[error("{relation} relation references unknown event '{event}'")]
    UnknownRelationEvent {
        relation: &'static str,
        event: String,
    },

    #[error("initial marking references unknown event '{0}'")]
    UnknownMarkingEvent(String),

    #[error("sub-process attached to unknown event '{0}'")]
    UnknownSubProcessEvent(String),

    #[error("sub-process attached to '{0}' does not declare the event itself")]
    SubProcessMissingEvent(String),
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    /// look up an event by name
    pub fn event(&self, name: &str) -> Option<EventId> {
        self.events.lookup(name)
    }

    pub fn event_name(&self, e: EventId) -> &str {
        self.events.name(e)
    }

    pub fn label(&self, e: EventId) -> &str {
        &self.label_map[e.index()]
    }

    pub fn role(&self, e: EventId) -> &str {
        &self.role_map[e.index()]
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// all events carrying the given label
    pub fn events_with_label(&self, label: &str) -> &EventSet {
        self.label_map_inv.get(label).unwrap_or(&EMPTY_SET)
    }

    pub fn conditions_for(&self, e: EventId) -> &EventSet {
        self.conditions_for.targets(e)
    }

    pub fn milestones_for(&self, e: EventId) -> &EventSet {
        self.milestones_for.targets(e)
    }

    pub fn response_to(&self, e: EventId) -> &EventSet {
        self.response_to.targets(e)
    }

    pub fn excludes_to(&self, e: EventId) -> &EventSet {
        self.excludes_to.targets(e)
    }

    pub fn includes_to(&self, e: EventId) -> &EventSet {
        self.includes_to.targets(e)
    }

    pub fn initial_marking(&self) -> &Marking {
        &self.initial_marking
    }

    pub fn sub_process(&self, e: EventId) -> Option<&SubProcess> {
        self.sub_processes.get(&e)
    }
}

#[derive(Debug)]
struct EventDecl {
    name: String,
    label: String,
    role: String,
}

/// assembles and validates a [`Graph`]; every structural inconsistency is
/// reported as a [`GraphError`] instead of surfacing later mid-search
#[derive(Debug, Default)]
pub struct GraphBuilder {
    events: Vec<EventDecl>,
    conditions: Vec<(String, String)>,
    milestones: Vec<(String, String)>,
    responses: Vec<(String, String)>,
    excludes: Vec<(String, String)>,
    includes: Vec<(String, String)>,
    executed: Vec<String>,
    included: Vec<String>,
    pending: Vec<String>,
    include_all: bool,
    sub_processes: Vec<(String, Graph)>,
}

impl GraphBuilder {
    /// declare an event; its label defaults to its name, its role to ""
    pub fn event(self, name: &str) -> Self {
        self.labeled_event(name, name, "")
    }

    pub fn labeled_event(mut self, name: &str, label: &str, role: &str) -> Self {
        self.events.push(EventDecl {
            name: name.to_string(),
            label: label.to_string(),
            role: role.to_string(),
        });
        self
    }

    /// `src` must be executed (or excluded) before `dst` may fire
    pub fn condition(mut self, src: &str, dst: &str) -> Self {
        self.conditions.push((src.to_string(), dst.to_string()));
        self
    }

    /// while `src` is included and pending, `dst` may not fire
    pub fn milestone(mut self, src: &str, dst: &str) -> Self {
        self.milestones.push((src.to_string(), dst.to_string()));
        self
    }

    /// firing `src` makes `dst` pending
    pub fn response(mut self, src: &str, dst: &str) -> Self {
        self.responses.push((src.to_string(), dst.to_string()));
        self
    }

    /// firing `src` removes `dst` from the included set
    pub fn exclude(mut self, src: &str, dst: &str) -> Self {
        self.excludes.push((src.to_string(), dst.to_string()));
        self
    }

    /// firing `src` adds `dst` to the included set
    pub fn include(mut self, src: &str, dst: &str) -> Self {
        self.includes.push((src.to_string(), dst.to_string()));
        self
    }

    pub fn executed(mut self, name: &str) -> Self {
        self.executed.push(name.to_string());
        self
    }

    pub fn included(mut self, name: &str) -> Self {
        self.included.push(name.to_string());
        self
    }

    pub fn pending(mut self, name: &str) -> Self {
        self.pending.push(name.to_string());
        self
    }

    /// start with every declared event included
    pub fn include_all(mut self) -> Self {
        self.include_all = true;
        self
    }

    /// attach a sub-process graph to the named event; the sub-process must
    /// declare an event of the same name
    pub fn sub_process(mut self, name: &str, graph: Graph) -> Self {
        self.sub_processes.push((name.to_string(), graph));
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        let mut events = Events::default();
        let mut label_map = Vec::with_capacity(self.events.len());
        let mut role_map = Vec::with_capacity(self.events.len());
        let mut labels = BTreeSet::new();
        let mut label_map_inv: BTreeMap<String, EventSet> = BTreeMap::new();
        for decl in &self.events {
            if events.lookup(&decl.name).is_some() {
                return Err(GraphError::DuplicateEvent(decl.name.clone()));
            }
            let id = events.intern(&decl.name);
            labels.insert(decl.label.clone());
            label_map_inv
                .entry(decl.label.clone())
                .or_default()
                .insert(id);
            label_map.push(decl.label.clone());
            role_map.push(decl.role.clone());
        }
        let n = events.len();

        let resolve = |relation: &'static str, name: &str| {
            events
                .lookup(name)
                .ok_or_else(|| GraphError::UnknownRelationEvent {
                    relation,
                    event: name.to_string(),
                })
        };
        // conditions and milestones are stored keyed by the constrained
        // event, responses and in/excludes keyed by the firing event
        let mut conditions_for = Relation::new(n);
        for (src, dst) in &self.conditions {
            conditions_for.insert(resolve("condition", dst)?, resolve("condition", src)?);
        }
        let mut milestones_for = Relation::new(n);
        for (src, dst) in &self.milestones {
            milestones_for.insert(resolve("milestone", dst)?, resolve("milestone", src)?);
        }
        let mut response_to = Relation::new(n);
        for (src, dst) in &self.responses {
            response_to.insert(resolve("response", src)?, resolve("response", dst)?);
        }
        let mut excludes_to = Relation::new(n);
        for (src, dst) in &self.excludes {
            excludes_to.insert(resolve("exclude", src)?, resolve("exclude", dst)?);
        }
        let mut includes_to = Relation::new(n);
        for (src, dst) in &self.includes {
            includes_to.insert(resolve("include", src)?, resolve("include", dst)?);
        }

        let mut marking = Marking::default();
        if self.include_all {
            marking.included = events.all();
        }
        for (names, set) in [
            (&self.executed, &mut marking.executed),
            (&self.included, &mut marking.included),
            (&self.pending, &mut marking.pending),
        ] {
            for name in names {
                set.insert(
                    events
                        .lookup(name)
                        .ok_or_else(|| GraphError::UnknownMarkingEvent(name.clone()))?,
                );
            }
        }

        let mut sub_processes = BTreeMap::new();
        for (name, sub) in self.sub_processes {
            let id = events
                .lookup(&name)
                .ok_or_else(|| GraphError::UnknownSubProcessEvent(name.clone()))?;
            let local = sub
                .event(&name)
                .ok_or(GraphError::SubProcessMissingEvent(name))?;
            sub_processes.insert(id, SubProcess { graph: sub, local });
        }

        Ok(Graph {
            conditions: conditions_for.target_union(),
            includes_for: includes_to.inverse(),
            excludes_for: excludes_to.inverse(),
            response_for: response_to.inverse(),
            events,
            labels,
            label_map,
            label_map_inv,
            role_map,
            conditions_for,
            milestones_for,
            response_to,
            excludes_to,
            includes_to,
            initial_marking: marking.clone(),
            marking,
            sub_processes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_resolves_relations_and_marking() {
        let g = Graph::builder()
            .event("A")
            .labeled_event("B", "review", "manager")
            .condition("A", "B")
            .response("A", "B")
            .include_all()
            .pending("B")
            .build()
            .unwrap();
        let a = g.event("A").unwrap();
        let b = g.event("B").unwrap();
        assert_eq!(g.label(a), "A");
        assert_eq!(g.label(b), "review");
        assert_eq!(g.role(b), "manager");
        assert_eq!(g.conditions_for(b), &[a].into_iter().collect::<EventSet>());
        assert_eq!(g.response_to(a), &[b].into_iter().collect::<EventSet>());
        assert_eq!(g.marking.included, g.events().all());
        assert_eq!(g.marking.pending, [b].into_iter().collect::<EventSet>());
        assert!(g.marking.executed.is_empty());
        // A conditions something, B does not
        assert_eq!(g.conditions, [a].into_iter().collect::<EventSet>());
        assert_eq!(
            g.events_with_label("review"),
            &[b].into_iter().collect::<EventSet>()
        );
        assert!(g.events_with_label("nope").is_empty());
    }

    #[test]
    fn unknown_relation_event_is_rejected() {
        let err = Graph::builder()
            .event("A")
            .response("A", "B")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownRelationEvent {
                relation: "response",
                event: "B".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_event_is_rejected() {
        let err = Graph::builder().event("A").event("A").build().unwrap_err();
        assert_eq!(err, GraphError::DuplicateEvent("A".to_string()));
    }

    #[test]
    fn unknown_marking_event_is_rejected() {
        let err = Graph::builder().event("A").pending("P").build().unwrap_err();
        assert_eq!(err, GraphError::UnknownMarkingEvent("P".to_string()));
    }

    #[test]
    fn sub_process_must_declare_shared_event() {
        let sub = Graph::builder().event("X").include_all().build().unwrap();
        let err = Graph::builder()
            .event("S")
            .include_all()
            .sub_process("S", sub)
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::SubProcessMissingEvent("S".to_string()));
    }

    #[test]
    fn reverse_relations_are_derived() {
        let g = Graph::builder()
            .event("A")
            .event("B")
            .event("C")
            .exclude("A", "C")
            .exclude("B", "C")
            .include("A", "B")
            .response("C", "A")
            .include_all()
            .build()
            .unwrap();
        let a = g.event("A").unwrap();
        let b = g.event("B").unwrap();
        let c = g.event("C").unwrap();
        assert_eq!(
            g.excludes_for.targets(c),
            &[a, b].into_iter().collect::<EventSet>()
        );
        assert_eq!(
            g.includes_for.targets(b),
            &[a].into_iter().collect::<EventSet>()
        );
        assert_eq!(
            g.response_for.targets(a),
            &[c].into_iter().collect::<EventSet>()
        );
    }
}
