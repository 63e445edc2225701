use crate::{EventId, EventSet, Graph, Marking};

impl Graph {
    /// enabledness in the graph's own marking
    pub fn is_enabled(&self, e: EventId) -> bool {
        self.is_enabled_in(e, &self.marking)
    }

    /// enabledness against a caller-supplied marking; events carried by a
    /// sub-process are judged in the group marking of that sub-process,
    /// which the caller resolves
    pub fn is_enabled_in(&self, e: EventId, scope: &Marking) -> bool {
        if !scope.included.contains(&e) {
            return false;
        }
        for &c in self.conditions_for.targets(e) {
            if scope.included.contains(&c) && !scope.executed.contains(&c) {
                return false;
            }
        }
        for &m in self.milestones_for.targets(e) {
            if scope.included.contains(&m) && scope.pending.contains(&m) {
                return false;
            }
        }
        true
    }

    /// all currently enabled events
    pub fn enabled(&self) -> EventSet {
        self.events.iter().filter(|&e| self.is_enabled(e)).collect()
    }

    /// fire `e`, updating the marking.
    ///
    /// inclusion is applied after exclusion, so a self-effecting event that
    /// both excludes and includes itself ends up included.
    pub fn execute(&mut self, e: EventId) {
        // events conditioning nothing never need their execution recorded
        if self.conditions.contains(&e) {
            self.marking.executed.insert(e);
        }
        self.marking.pending.remove(&e);
        for &r in self.response_to.targets(e) {
            self.marking.pending.insert(r);
        }
        for &x in self.excludes_to.targets(e) {
            self.marking.included.remove(&x);
        }
        for &i in self.includes_to.targets(e) {
            self.marking.included.insert(i);
        }
    }

    /// a marking accepts when no included event still owes a run
    pub fn is_accepting(&self) -> bool {
        self.marking.pending.is_disjoint(&self.marking.included)
    }

    /// run `f` against a scratch copy of the marking; the original marking
    /// is restored on every exit path before the result is returned
    pub fn with_scratch_marking<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.marking.clone();
        let ret = f(self);
        self.marking = saved;
        ret
    }

    /// restore the marking the graph was built with, recursively for
    /// sub-processes
    pub fn reset_marking(&mut self) {
        self.marking = self.initial_marking.clone();
        for sp in self.sub_processes.values_mut() {
            sp.graph.reset_marking();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition_graph() -> Graph {
        Graph::builder()
            .event("A")
            .event("B")
            .condition("A", "B")
            .include_all()
            .build()
            .unwrap()
    }

    #[test]
    fn condition_blocks_until_source_runs() {
        let mut g = condition_graph();
        let a = g.event("A").unwrap();
        let b = g.event("B").unwrap();
        assert!(g.is_enabled(a));
        assert!(!g.is_enabled(b));
        g.execute(a);
        assert!(g.is_enabled(b));
    }

    #[test]
    fn excluded_condition_does_not_block() {
        let mut g = Graph::builder()
            .event("A")
            .event("B")
            .event("X")
            .condition("A", "B")
            .exclude("X", "A")
            .include_all()
            .build()
            .unwrap();
        let b = g.event("B").unwrap();
        let x = g.event("X").unwrap();
        assert!(!g.is_enabled(b));
        g.execute(x);
        assert!(g.is_enabled(b));
    }

    #[test]
    fn milestone_blocks_while_pending() {
        let mut g = Graph::builder()
            .event("A")
            .event("B")
            .event("X")
            .milestone("B", "A")
            .exclude("X", "B")
            .include_all()
            .pending("B")
            .build()
            .unwrap();
        let a = g.event("A").unwrap();
        assert!(!g.is_enabled(a));
        g.execute(g.event("X").unwrap());
        assert!(g.is_enabled(a));
    }

    #[test]
    fn include_wins_over_self_exclude() {
        let mut g = Graph::builder()
            .event("A")
            .exclude("A", "A")
            .include("A", "A")
            .include_all()
            .build()
            .unwrap();
        let a = g.event("A").unwrap();
        g.execute(a);
        assert!(g.marking.included.contains(&a));
    }

    #[test]
    fn execute_updates_pending_and_included() {
        let mut g = Graph::builder()
            .event("A")
            .event("B")
            .event("C")
            .response("A", "B")
            .exclude("A", "C")
            .include_all()
            .pending("A")
            .build()
            .unwrap();
        let a = g.event("A").unwrap();
        let b = g.event("B").unwrap();
        let c = g.event("C").unwrap();
        g.execute(a);
        assert!(!g.marking.pending.contains(&a));
        assert!(g.marking.pending.contains(&b));
        assert!(!g.marking.included.contains(&c));
        // nothing conditions on A, so its execution is not recorded
        assert!(!g.marking.executed.contains(&a));
    }

    #[test]
    fn executed_only_dirtied_for_condition_sources() {
        let mut g = condition_graph();
        let a = g.event("A").unwrap();
        let b = g.event("B").unwrap();
        g.execute(a);
        assert!(g.marking.executed.contains(&a));
        g.execute(b);
        assert!(!g.marking.executed.contains(&b));
    }

    #[test]
    fn enabled_set_agrees_with_predicate() {
        let mut g = Graph::builder()
            .event("A")
            .event("B")
            .event("C")
            .condition("A", "B")
            .include_all()
            .build()
            .unwrap();
        for _ in 0..2 {
            let en = g.enabled();
            for e in g.events().iter() {
                assert_eq!(en.contains(&e), g.is_enabled(e));
            }
            g.execute(g.event("A").unwrap());
        }
    }

    #[test]
    fn accepting_ignores_excluded_pending() {
        let mut g = Graph::builder()
            .event("A")
            .event("B")
            .exclude("A", "B")
            .include_all()
            .pending("B")
            .build()
            .unwrap();
        assert!(!g.is_accepting());
        g.execute(g.event("A").unwrap());
        assert!(g.is_accepting());
    }

    #[test]
    fn scratch_marking_restores_on_all_paths() {
        let mut g = condition_graph();
        let a = g.event("A").unwrap();
        let before = g.marking.clone();
        let seen: bool = g.with_scratch_marking(|g| {
            g.execute(a);
            g.marking.executed.contains(&a)
        });
        assert!(seen);
        assert_eq!(g.marking, before);
        // nesting keeps the outer snapshot intact as well
        g.with_scratch_marking(|g| {
            g.execute(a);
            let mid = g.marking.clone();
            g.with_scratch_marking(|g| {
                g.marking.pending.insert(a);
            });
            assert_eq!(g.marking, mid);
        });
        assert_eq!(g.marking, before);
    }

    #[test]
    fn reset_restores_initial_marking() {
        let mut g = condition_graph();
        g.execute(g.event("A").unwrap());
        assert_ne!(&g.marking, g.initial_marking());
        g.reset_marking();
        assert_eq!(&g.marking, g.initial_marking());
    }
}
