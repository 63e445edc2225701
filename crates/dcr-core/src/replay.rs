use crate::{EventId, EventSet, Graph, Marking};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "tracing")]
use tracing::{event, Level};

/// one observed step of a role-typed trace
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RoleEvent {
    pub role: String,
    pub activity: String,
}

impl RoleEvent {
    pub fn new(role: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            activity: activity.into(),
        }
    }
}

/// does the trace correspond to some accepting run of the graph?
///
/// unknown activities are skipped (open world); a known activity that no
/// `(label, role)` pair matches rejects the trace. the marking is left
/// untouched.
pub fn replay_trace(g: &mut Graph, trace: &[RoleEvent]) -> bool {
    let (head, tail) = match trace.split_first() {
        None => return g.is_accepting(),
        Some(x) => x,
    };
    if !g.labels.contains(&head.activity) {
        return replay_trace(g, tail);
    }
    for e in candidates(g, head) {
        let saved = match fire_scoped(g, e) {
            Some(m) => m,
            None => continue,
        };
        let accepted = replay_trace(g, tail);
        restore_scoped(g, e, saved);
        if accepted {
            return true;
        }
    }
    false
}

fn candidates(g: &Graph, step: &RoleEvent) -> Vec<EventId> {
    g.events_with_label(&step.activity)
        .iter()
        .copied()
        .filter(|&e| g.role(e) == step.role)
        .collect()
}

/// fire `e` in its scope (the sub-process group marking when it has one),
/// handing back the scope's prior marking; `None` if it is not enabled there
fn fire_scoped(g: &mut Graph, e: EventId) -> Option<Marking> {
    if g.sub_processes.contains_key(&e) {
        let sp = g.sub_processes.get_mut(&e).unwrap();
        if !sp.graph.is_enabled(sp.local) {
            return None;
        }
        let saved = sp.graph.marking.clone();
        let local = sp.local;
        sp.graph.execute(local);
        Some(saved)
    } else {
        if !g.is_enabled(e) {
            return None;
        }
        let saved = g.marking.clone();
        g.execute(e);
        Some(saved)
    }
}

fn restore_scoped(g: &mut Graph, e: EventId, saved: Marking) {
    match g.sub_processes.get_mut(&e) {
        Some(sp) => sp.graph.marking = saved,
        None => g.marking = saved,
    }
}

/// replay many traces, one cloned graph per worker
pub fn replay_log(g: &Graph, log: &[Vec<RoleEvent>]) -> Vec<bool> {
    log.par_iter()
        .map(|trace| replay_trace(&mut g.clone(), trace))
        .collect()
}

/// per-cell counter over (source event, target event) pairs
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FuzzyRelation {
    cells: Vec<BTreeMap<EventId, u64>>,
}

impl FuzzyRelation {
    fn new(len: usize) -> Self {
        Self {
            cells: vec![BTreeMap::new(); len],
        }
    }

    fn add(&mut self, src: EventId, dst: EventId, n: u64) {
        *self.cells[src.index()].entry(dst).or_default() += n;
    }

    pub fn get(&self, src: EventId, dst: EventId) -> u64 {
        self.cells
            .get(src.index())
            .and_then(|row| row.get(&dst))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().flat_map(BTreeMap::values).sum()
    }

    /// cell-wise addition
    fn merge(&mut self, other: &Self) {
        for (src, row) in other.cells.iter().enumerate() {
            for (&dst, &n) in row {
                *self.cells[src].entry(dst).or_default() += n;
            }
        }
    }
}

/// one counter matrix per relation table of the graph
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RelationCounts {
    pub conditions_for: FuzzyRelation,
    pub milestones_for: FuzzyRelation,
    pub response_to: FuzzyRelation,
    pub excludes_to: FuzzyRelation,
    pub includes_to: FuzzyRelation,
}

impl RelationCounts {
    fn new(len: usize) -> Self {
        Self {
            conditions_for: FuzzyRelation::new(len),
            milestones_for: FuzzyRelation::new(len),
            response_to: FuzzyRelation::new(len),
            excludes_to: FuzzyRelation::new(len),
            includes_to: FuzzyRelation::new(len),
        }
    }

    fn merge(&mut self, other: &Self) {
        self.conditions_for.merge(&other.conditions_for);
        self.milestones_for.merge(&other.milestones_for);
        self.response_to.merge(&other.response_to);
        self.excludes_to.merge(&other.excludes_to);
        self.includes_to.merge(&other.includes_to);
    }

    pub fn total(&self) -> u64 {
        self.conditions_for.total()
            + self.milestones_for.total()
            + self.response_to.total()
            + self.excludes_to.total()
            + self.includes_to.total()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantifyResult {
    pub total_violations: u64,
    pub violations: RelationCounts,
    pub activations: RelationCounts,
}

// events executed since a given event was last included / last executed
#[derive(Clone, Debug)]
struct SinceState {
    since_in: Vec<EventSet>,
    since_ex: Vec<EventSet>,
}

/// score the trace against the graph, picking for every ambiguous activity
/// the resolution with the fewest relation violations; reports per-relation
/// violation and activation counts for that resolution
pub fn quantify_violations(g: &mut Graph, trace: &[RoleEvent]) -> QuantifyResult {
    let n = g.events.len();
    let mut since = SinceState {
        since_in: vec![EventSet::new(); n],
        since_ex: vec![EventSet::new(); n],
    };
    let (total_violations, violations, activations) = quantify_recur(g, trace, &mut since);
    QuantifyResult {
        total_violations,
        violations,
        activations,
    }
}

fn quantify_recur(
    g: &mut Graph,
    trace: &[RoleEvent],
    since: &mut SinceState,
) -> (u64, RelationCounts, RelationCounts) {
    let n = g.events.len();
    let (head, tail) = match trace.split_first() {
        None => {
            // work still owed at end of trace violates the responses that
            // requested it
            let mut v = RelationCounts::new(n);
            for &e in g.marking.pending.intersection(&g.marking.included) {
                for &o in g.response_for.targets(e) {
                    if since.since_ex[e.index()].contains(&o) {
                        v.response_to.add(o, e, 1);
                    }
                }
            }
            let total = v.total();
            return (total, v, RelationCounts::new(n));
        }
        Some(x) => x,
    };

    let cands = if g.labels.contains(&head.activity) {
        candidates(g, head)
    } else {
        Vec::new()
    };
    if cands.is_empty() {
        // best-effort scoring always continues; an unmatchable token
        // contributes nothing
        return quantify_recur(g, tail, since);
    }

    let mut best: Option<(u64, RelationCounts, RelationCounts)> = None;
    for e in cands {
        let saved_marking = g.marking.clone();
        let saved_since = since.clone();

        let mut v = RelationCounts::new(n);
        for &c in g.conditions_for.targets(e) {
            if g.marking.included.contains(&c) && !g.marking.executed.contains(&c) {
                v.conditions_for.add(e, c, 1);
            }
        }
        for &m in g.milestones_for.targets(e) {
            if g.marking.included.contains(&m) && g.marking.pending.contains(&m) {
                v.milestones_for.add(e, m, 1);
            }
        }
        if !g.marking.included.contains(&e) {
            for &o in g.excludes_for.targets(e) {
                if since.since_in[e.index()].contains(&o) {
                    v.excludes_to.add(o, e, 1);
                }
            }
        }

        // every relation edge leaving the tables at `e` is active right now
        let mut a = RelationCounts::new(n);
        for &t in g.conditions_for.targets(e) {
            a.conditions_for.add(e, t, 1);
        }
        for &t in g.milestones_for.targets(e) {
            a.milestones_for.add(e, t, 1);
        }
        for &t in g.response_to.targets(e) {
            a.response_to.add(e, t, 1);
        }
        for &t in g.excludes_to.targets(e) {
            a.excludes_to.add(e, t, 1);
        }
        for &t in g.includes_to.targets(e) {
            a.includes_to.add(e, t, 1);
        }

        g.execute(e);
        for &o in g.includes_to.targets(e) {
            since.since_in[o.index()].clear();
        }
        for o in g.events.iter() {
            since.since_ex[o.index()].insert(e);
            since.since_in[o.index()].insert(e);
        }
        since.since_ex[e.index()] = core::iter::once(e).collect();

        let (rec_total, rec_v, rec_a) = quantify_recur(g, tail, since);
        g.marking = saved_marking;
        *since = saved_since;

        let total = v.total() + rec_total;
        if best.as_ref().map(|(bt, ..)| total < *bt).unwrap_or(true) {
            v.merge(&rec_v);
            a.merge(&rec_a);
            best = Some((total, v, a));
        }
    }
    #[cfg(feature = "tracing")]
    event!(
        Level::TRACE,
        "resolved '{}' with {} violations",
        head.activity,
        best.as_ref().unwrap().0
    );
    best.unwrap()
}

/// quantify many traces, one cloned graph per worker
pub fn quantify_log(g: &Graph, log: &[Vec<RoleEvent>]) -> Vec<QuantifyResult> {
    log.par_iter()
        .map(|trace| quantify_violations(&mut g.clone(), trace))
        .collect()
}
