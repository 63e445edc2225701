// SPDX-License-Identifier: MIT OR Apache-2.0
// the escaping helpers were taken from `petgraph`
// ref = https://github.com/petgraph/petgraph/blob/9ff688872b467d3e1b5adef19f5c52f519d3279c/src/dot.rs

use crate::{EventId, Graph, Relation};
use core::fmt::{self, Formatter, Result, Write};

/// A formatter which can format a graph and its marking into the .dot
/// format, useful for debugging and visualization
pub struct Dot<'a>(pub &'a Graph);

impl Dot<'_> {
    fn node_fmt(&self, f: &mut Formatter<'_>, e: EventId) -> Result {
        let g = self.0;
        let mut style = String::new();
        if !g.marking.included.contains(&e) {
            style.push_str(",dashed");
        }
        if g.marking.executed.contains(&e) {
            style.push_str(",filled");
        }
        if g.marking.pending.contains(&e) {
            style.push_str(",bold");
        }
        writeln!(
            f,
            "  \"{}\" [label=\"{}\\l{}\\l\"{}];",
            Escaped(g.event_name(e)),
            Escaped(g.label(e)),
            Escaped(g.role(e)),
            if style.is_empty() {
                String::new()
            } else {
                format!(" style=\"{}\"", &style[1..])
            },
        )
    }

    fn edges_fmt(
        &self,
        f: &mut Formatter<'_>,
        rel: &Relation,
        attrs: &str,
        key_is_target: bool,
    ) -> Result {
        let g = self.0;
        for (key, others) in rel.iter() {
            for &other in others {
                let (src, dst) = if key_is_target {
                    (other, key)
                } else {
                    (key, other)
                };
                writeln!(
                    f,
                    "  \"{}\" -> \"{}\" [{}];",
                    Escaped(g.event_name(src)),
                    Escaped(g.event_name(dst)),
                    attrs,
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Dot<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let g = self.0;
        writeln!(f, "digraph {{")?;

        for e in g.events().iter() {
            self.node_fmt(f, e)?;
        }

        self.edges_fmt(f, &g.conditions_for, "color=orange arrowhead=dot", true)?;
        self.edges_fmt(f, &g.milestones_for, "color=purple arrowhead=diamond", true)?;
        self.edges_fmt(f, &g.response_to, "color=blue arrowhead=normal", false)?;
        self.edges_fmt(f, &g.excludes_to, "color=red label=\"%\"", false)?;
        self.edges_fmt(f, &g.includes_to, "color=green label=\"+\"", false)?;

        // sub-processes render as clusters of their own events
        for (&e, sp) in &g.sub_processes {
            writeln!(
                f,
                "  subgraph \"cluster_{}\" {{",
                Escaped(g.event_name(e))
            )?;
            for sub_ev in sp.graph.events().iter() {
                writeln!(f, "  \"{}\";", Escaped(sp.graph.event_name(sub_ev)))?;
            }
            writeln!(f, "  }}")?;
        }

        writeln!(f, "}}")
    }
}

/// Escape for Graphviz
struct Escaper<W>(W);

impl<W> fmt::Write for Escaper<W>
where
    W: fmt::Write,
{
    fn write_str(&mut self, s: &str) -> Result {
        for c in s.chars() {
            self.write_char(c)?;
        }
        Ok(())
    }

    fn write_char(&mut self, c: char) -> Result {
        match c {
            '"' | '\\' => self.0.write_char('\\')?,
            // \l is for left justified linebreak
            '\n' => return self.0.write_str("\\l"),
            _ => {}
        }
        self.0.write_char(c)
    }
}

/// Pass Display formatting through a simple escaping filter
struct Escaped<T>(T);

impl<T> fmt::Display for Escaped<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if f.alternate() {
            writeln!(&mut Escaper(f), "{:#}", &self.0)
        } else {
            write!(&mut Escaper(f), "{}", &self.0)
        }
    }
}
