use crate::{EventId, EventSet, Graph, Marking};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "tracing")]
use tracing::{event, Level};

pub const INFINITE_COST: f64 = f64::INFINITY;

/// a single move of the aligner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignMove<'a> {
    /// fire an enabled event whose label matches the next trace token
    Consume(EventId),
    /// fire an enabled event without consuming a token
    ModelSkip(EventId),
    /// drop the next trace token unmatched
    TraceSkip(&'a str),
}

/// pricing seam for the aligner; closures implement it directly
pub trait CostModel {
    fn cost(&self, mv: AlignMove<'_>) -> f64;
}

impl<F: Fn(AlignMove<'_>) -> f64> CostModel for F {
    fn cost(&self, mv: AlignMove<'_>) -> f64 {
        self(mv)
    }
}

/// every move costs one
#[derive(Clone, Copy, Debug, Default)]
pub struct UnitCosts;

impl CostModel for UnitCosts {
    fn cost(&self, _mv: AlignMove<'_>) -> f64 {
        1.0
    }
}

/// cheapest way to bend an observed trace into an accepting run; `trace`
/// lists the fired events (consume and model-skip moves)
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    pub cost: f64,
    pub trace: Vec<EventId>,
}

impl Alignment {
    /// no alignment within the given bounds
    pub fn infeasible() -> Self {
        Self {
            cost: INFINITE_COST,
            trace: Vec::new(),
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.cost.is_finite()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AlignOptions {
    pub depth_limit: Option<usize>,
    pub pruning: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            depth_limit: None,
            pruning: true,
        }
    }
}

/// compute a minimum-cost alignment of `trace` against the graph.
///
/// without a depth limit the search starts from the cost of skipping every
/// token and then aligning the empty trace, and tightens that bound as
/// cheaper alignments turn up; with a depth limit, the limit doubles as the
/// initial bound and an infeasible result only means "not within the
/// limit". `context` labels are off-limits to the reachability oracle.
pub fn align<C: CostModel>(
    g: &mut Graph,
    trace: &[String],
    context: &BTreeSet<String>,
    cost: &C,
    opts: AlignOptions,
) -> Alignment {
    let max_cost = match opts.depth_limit {
        Some(d) => d as f64,
        None => {
            let empty = Search {
                cost,
                context,
                depth_limit: usize::MAX,
                pruning: opts.pruning,
                max_cost: INFINITE_COST,
                memo: BTreeMap::new(),
            }
            .run(g, &[], 0.0, 0);
            trace
                .iter()
                .map(|t| cost.cost(AlignMove::TraceSkip(t)))
                .sum::<f64>()
                + empty.cost
        }
    };
    Search {
        cost,
        context,
        depth_limit: opts.depth_limit.unwrap_or(usize::MAX),
        pruning: opts.pruning,
        max_cost,
        memo: BTreeMap::new(),
    }
    .run(g, trace, 0.0, 0)
}

struct Search<'a, C> {
    cost: &'a C,
    context: &'a BTreeSet<String>,
    depth_limit: usize,
    pruning: bool,
    /// incumbent bound; branches running past it are abandoned
    max_cost: f64,
    /// remaining trace length -> marking -> cheapest running cost seen
    memo: BTreeMap<usize, BTreeMap<Marking, f64>>,
}

impl<C: CostModel> Search<'_, C> {
    fn run(&mut self, g: &mut Graph, trace: &[String], cur_cost: f64, depth: usize) -> Alignment {
        if cur_cost > self.max_cost || depth >= self.depth_limit {
            return Alignment::infeasible();
        }
        if trace.is_empty() && g.is_accepting() {
            return Alignment {
                cost: cur_cost,
                trace: Vec::new(),
            };
        }
        {
            let seen = self.memo.entry(trace.len()).or_default();
            if let Some(&c) = seen.get(&g.marking) {
                if cur_cost >= c {
                    return Alignment::infeasible();
                }
            }
            seen.insert(g.marking.clone(), cur_cost);
        }

        let mut best = Alignment::infeasible();

        if let Some((head, tail)) = trace.split_first() {
            // consume moves first, they tighten the bound fastest
            let matching: Vec<EventId> = g
                .events_with_label(head)
                .iter()
                .copied()
                .filter(|&e| g.is_enabled(e))
                .collect();
            for e in matching {
                let step = cur_cost + self.cost.cost(AlignMove::Consume(e));
                let saved = g.marking.clone();
                g.execute(e);
                let sub = self.run(g, tail, step, depth + 1);
                g.marking = saved;
                self.note(&mut best, sub, Some(e));
            }
            let step = cur_cost + self.cost.cost(AlignMove::TraceSkip(head));
            let sub = self.run(g, tail, step, depth + 1);
            self.note(&mut best, sub, None);
        }

        // before any finite bound exists, a reachability check cuts off
        // branches that cannot consume the next token or reach acceptance;
        // once a bound is active the cost cut-off prunes on its own
        if self.pruning && self.max_cost.is_infinite() && self.pruned(g, trace) {
            #[cfg(feature = "tracing")]
            event!(Level::TRACE, depth, "unreachable branch pruned");
            return best;
        }

        let enabled: Vec<EventId> = g.enabled().into_iter().collect();
        for e in enabled {
            let step = cur_cost + self.cost.cost(AlignMove::ModelSkip(e));
            let saved = g.marking.clone();
            g.execute(e);
            let sub = self.run(g, trace, step, depth + 1);
            g.marking = saved;
            self.note(&mut best, sub, Some(e));
        }

        best
    }

    fn note(&mut self, best: &mut Alignment, sub: Alignment, fired: Option<EventId>) {
        if sub.cost < best.cost {
            let mut trace = sub.trace;
            if let Some(e) = fired {
                trace.insert(0, e);
            }
            *best = Alignment {
                cost: sub.cost,
                trace,
            };
            if best.cost < self.max_cost {
                #[cfg(feature = "tracing")]
                event!(Level::TRACE, cost = best.cost, "alignment bound tightened");
                self.max_cost = best.cost;
            }
        }
    }

    fn pruned(&self, g: &Graph, trace: &[String]) -> bool {
        let oracle = Reachability {
            g,
            context: self.context,
        };
        match trace.first() {
            Some(head) => !g
                .events_with_label(head)
                .iter()
                .any(|&e| oracle.can_be_executed(e)),
            None => {
                let mut blocked = g.marking.pending.intersection(&g.marking.included);
                blocked.any(|&p| !oracle.can_be_executed_or_excluded(p))
            }
        }
    }
}

/// over-approximating reachability over the four relations: "false" is
/// definite, "true" may still be unreachable. `context` labels may not be
/// re-fired except as the queried event itself.
pub(crate) struct Reachability<'a> {
    pub(crate) g: &'a Graph,
    pub(crate) context: &'a BTreeSet<String>,
}

// in-progress sets, one per sub-oracle, breaking recursion through cycles
// in the relations. ids are pushed before descending and popped once the
// subtree returns, so a guard hit always means a cycle on the current path
// and never a sibling branch having visited the same event
#[derive(Default)]
struct InProgress {
    excl: EventSet,
    exec: EventSet,
    incl: EventSet,
}

impl Reachability<'_> {
    /// can some future run, avoiding `context` labels, end with `e` firing?
    pub(crate) fn can_be_executed(&self, e: EventId) -> bool {
        self.enter_exec(e, e, &mut InProgress::default())
    }

    /// can `e` either fire or drop out of the included set in the future?
    pub(crate) fn can_be_executed_or_excluded(&self, e: EventId) -> bool {
        self.enter_exec(e, e, &mut InProgress::default())
            || self.enter_excl(e, e, &mut InProgress::default())
    }

    fn enter_exec(&self, origin: EventId, e: EventId, ip: &mut InProgress) -> bool {
        if !ip.exec.insert(e) {
            return false;
        }
        let ok = self.exec_recur(origin, e, ip);
        ip.exec.remove(&e);
        ok
    }

    fn enter_excl(&self, origin: EventId, e: EventId, ip: &mut InProgress) -> bool {
        if !ip.excl.insert(e) {
            return false;
        }
        let ok = self.excl_recur(origin, e, ip);
        ip.excl.remove(&e);
        ok
    }

    fn enter_incl(&self, origin: EventId, e: EventId, ip: &mut InProgress) -> bool {
        if !ip.incl.insert(e) {
            return false;
        }
        let ok = self.incl_recur(origin, e, ip);
        ip.incl.remove(&e);
        ok
    }

    fn exec_recur(&self, origin: EventId, e: EventId, ip: &mut InProgress) -> bool {
        if e != origin && self.context.contains(self.g.label(e)) {
            return false;
        }
        if self.g.is_enabled(e) {
            return true;
        }
        let m = &self.g.marking;
        for &c in self.g.conditions_for.targets(e) {
            if m.included.contains(&c)
                && !m.executed.contains(&c)
                && !self.clearable(origin, c, ip)
            {
                return false;
            }
        }
        for &ms in self.g.milestones_for.targets(e) {
            if m.included.contains(&ms)
                && m.pending.contains(&ms)
                && !self.clearable(origin, ms, ip)
            {
                return false;
            }
        }
        if !m.included.contains(&e) {
            return self.enter_incl(origin, e, ip);
        }
        true
    }

    // a blocking event stops blocking once executed or excluded
    fn clearable(&self, origin: EventId, c: EventId, ip: &mut InProgress) -> bool {
        self.enter_exec(origin, c, ip) || self.enter_excl(origin, c, ip)
    }

    fn excl_recur(&self, origin: EventId, e: EventId, ip: &mut InProgress) -> bool {
        self.g
            .excludes_for
            .targets(e)
            .iter()
            .any(|&x| self.enter_exec(origin, x, ip))
    }

    fn incl_recur(&self, origin: EventId, e: EventId, ip: &mut InProgress) -> bool {
        self.g
            .includes_for
            .targets(e)
            .iter()
            .any(|&i| self.enter_exec(origin, i, ip))
    }
}
