use crate::{Alignment, Graph, GraphBuilder, GraphError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// NOTE: this is the canonical interchange mapping; every set encodes as an
// array and is lifted back to a set on parse, only `trace` keys stay
// ordered. avoid changing the field names, they are the data format.

/// marking of a graph document, keyed by event name
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MarkingDoc {
    #[serde(default)]
    pub executed: BTreeSet<String>,
    #[serde(default)]
    pub included: BTreeSet<String>,
    #[serde(default)]
    pub pending: BTreeSet<String>,
}

/// serialisable mirror of a [`Graph`]; building it re-validates, so a
/// parsed document can never produce a structurally broken graph
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct GraphDoc {
    pub events: BTreeSet<String>,
    /// labels default to the event name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub label_map: BTreeMap<String, String>,
    /// roles default to ""
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_map: BTreeMap<String, String>,
    /// constrained event -> its conditions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions_for: BTreeMap<String, BTreeSet<String>>,
    /// constrained event -> its milestones
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub milestones_for: BTreeMap<String, BTreeSet<String>>,
    /// firing event -> events made pending
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_to: BTreeMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub excludes_to: BTreeMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub includes_to: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub marking: MarkingDoc,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_process_map: BTreeMap<String, GraphDoc>,
}

impl GraphDoc {
    /// validate and build; the document's marking becomes both the current
    /// and the initial marking of the graph
    pub fn build(&self) -> Result<Graph, GraphError> {
        let mut b = Graph::builder();
        for name in &self.events {
            let label = self.label_map.get(name).cloned();
            let role = self.role_map.get(name).cloned();
            b = b.labeled_event(
                name,
                label.as_deref().unwrap_or(name),
                role.as_deref().unwrap_or(""),
            );
        }
        b = rel(b, &self.conditions_for, |b, src, dst| b.condition(src, dst), true);
        b = rel(b, &self.milestones_for, |b, src, dst| b.milestone(src, dst), true);
        b = rel(b, &self.response_to, |b, src, dst| b.response(src, dst), false);
        b = rel(b, &self.excludes_to, |b, src, dst| b.exclude(src, dst), false);
        b = rel(b, &self.includes_to, |b, src, dst| b.include(src, dst), false);
        for name in &self.marking.executed {
            b = b.executed(name);
        }
        for name in &self.marking.included {
            b = b.included(name);
        }
        for name in &self.marking.pending {
            b = b.pending(name);
        }
        for (name, sub) in &self.sub_process_map {
            b = b.sub_process(name, sub.build()?);
        }
        b.build()
    }
}

// keyed-by-target relations hand the key in as `dst`
fn rel(
    mut b: GraphBuilder,
    table: &BTreeMap<String, BTreeSet<String>>,
    add: impl Fn(GraphBuilder, &str, &str) -> GraphBuilder,
    key_is_target: bool,
) -> GraphBuilder {
    for (key, others) in table {
        for other in others {
            b = if key_is_target {
                add(b, other, key)
            } else {
                add(b, key, other)
            };
        }
    }
    b
}

impl From<&Graph> for GraphDoc {
    fn from(g: &Graph) -> Self {
        let name = |e| g.event_name(e).to_string();
        let table = |r: &crate::Relation| {
            r.iter()
                .filter(|(_, ts)| !ts.is_empty())
                .map(|(src, ts)| (name(src), ts.iter().map(|&t| name(t)).collect()))
                .collect::<BTreeMap<String, BTreeSet<String>>>()
        };
        Self {
            events: g.events().iter().map(name).collect(),
            label_map: g
                .events()
                .iter()
                .filter(|&e| g.label(e) != g.event_name(e))
                .map(|e| (name(e), g.label(e).to_string()))
                .collect(),
            role_map: g
                .events()
                .iter()
                .filter(|&e| !g.role(e).is_empty())
                .map(|e| (name(e), g.role(e).to_string()))
                .collect(),
            conditions_for: table(&g.conditions_for),
            milestones_for: table(&g.milestones_for),
            response_to: table(&g.response_to),
            excludes_to: table(&g.excludes_to),
            includes_to: table(&g.includes_to),
            marking: MarkingDoc {
                executed: g.marking.executed.iter().map(|&e| name(e)).collect(),
                included: g.marking.included.iter().map(|&e| name(e)).collect(),
                pending: g.marking.pending.iter().map(|&e| name(e)).collect(),
            },
            sub_process_map: g
                .sub_processes
                .iter()
                .map(|(&e, sp)| (name(e), GraphDoc::from(&sp.graph)))
                .collect(),
        }
    }
}

/// alignment result keyed by event name; an infeasible alignment carries
/// `cost: null`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AlignmentDoc {
    pub cost: Option<f64>,
    pub trace: Vec<String>,
}

impl AlignmentDoc {
    pub fn new(a: &Alignment, g: &Graph) -> Self {
        Self {
            cost: a.cost.is_finite().then_some(a.cost),
            trace: a
                .trace
                .iter()
                .map(|&e| g.event_name(e).to_string())
                .collect(),
        }
    }
}
