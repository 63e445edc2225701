use ansi_term::Colour;
use dcr_core::{
    align, replay_log, replay_trace, quantify_violations, AlignOptions, AlignmentDoc, Dot,
    Graph, GraphDoc, RoleEvent, UnitCosts,
};
use std::collections::BTreeSet;
use std::io::Write;

struct Context {
    path: Option<String>,
    g: Graph,
}

fn parse_steps(s: &str) -> Vec<RoleEvent> {
    s.split_whitespace()
        .map(|tok| match tok.split_once(':') {
            Some((role, activity)) => RoleEvent::new(role, activity),
            None => RoleEvent::new("", tok),
        })
        .collect()
}

fn load_graph(path: &str) -> anyhow::Result<Graph> {
    if path.ends_with(".json") {
        let f = std::io::BufReader::new(std::fs::File::open(path)?);
        let doc: GraphDoc = serde_json::from_reader(f)?;
        Ok(doc.build()?)
    } else {
        let f = std::io::BufReader::new(std::fs::File::open(path)?);
        let fz = zstd::stream::read::Decoder::new(f)?;
        Ok(bincode::deserialize_from(fz)?)
    }
}

impl Context {
    fn event_names(&self, ids: impl IntoIterator<Item = dcr_core::EventId>) -> Vec<&str> {
        ids.into_iter().map(|e| self.g.event_name(e)).collect()
    }

    fn fullic(&mut self, line: &str) -> anyhow::Result<bool> {
        Ok(if line == "*dot" {
            print!("{}", Dot(&self.g));
            true
        } else if line == "*reset" {
            self.g.reset_marking();
            true
        } else if line == "*marking" {
            let m = &self.g.marking;
            for (tag, set) in [
                ("executed", &m.executed),
                ("included", &m.included),
                ("pending", &m.pending),
            ] {
                println!(
                    "{:>9}: {}",
                    tag,
                    self.event_names(set.iter().copied()).join(" ")
                );
            }
            true
        } else if line == "w" {
            if let Some(path) = &self.path {
                let f = std::fs::File::create(path)?;
                let mut fz = zstd::stream::write::Encoder::new(f, 20)?;
                bincode::serialize_into(&mut fz, &self.g)?;
                fz.finish()?.sync_all()?;
                true
            } else {
                anyhow::bail!("no file path is associated with this session");
            }
        } else {
            false
        })
    }

    fn rick(&mut self, line: &str) -> anyhow::Result<()> {
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        match cmd {
            "e" => {
                println!("{}", self.event_names(self.g.enabled()).join(" "));
            }
            "a" => {
                println!("{}", self.g.is_accepting());
            }
            "x" => {
                let e = self
                    .g
                    .event(rest)
                    .ok_or_else(|| anyhow::anyhow!("unknown event '{}'", rest))?;
                if !self.g.is_enabled(e) {
                    anyhow::bail!("event '{}' is not enabled", rest);
                }
                self.g.execute(e);
            }
            "r" => {
                let trace = parse_steps(rest);
                println!("{}", replay_trace(&mut self.g, &trace));
            }
            "rl" => {
                let f = std::io::BufReader::new(std::fs::File::open(rest)?);
                let log: Vec<Vec<RoleEvent>> = serde_json::from_reader(f)?;
                for (trace, accepted) in log.iter().zip(replay_log(&self.g, &log)) {
                    println!("{} {:?}", accepted, trace);
                }
            }
            "v" => {
                let trace = parse_steps(rest);
                let res = quantify_violations(&mut self.g, &trace);
                println!("total: {}", res.total_violations);
                for (tag, fr) in [
                    ("condition", &res.violations.conditions_for),
                    ("milestone", &res.violations.milestones_for),
                    ("response", &res.violations.response_to),
                    ("exclude", &res.violations.excludes_to),
                ] {
                    if fr.total() > 0 {
                        println!("{:>9}: {}", tag, fr.total());
                    }
                }
            }
            "al" => {
                let trace: Vec<String> =
                    rest.split_whitespace().map(str::to_string).collect();
                let found = align(
                    &mut self.g,
                    &trace,
                    &BTreeSet::new(),
                    &UnitCosts,
                    AlignOptions::default(),
                );
                println!(
                    "{}",
                    serde_json::to_string(&AlignmentDoc::new(&found, &self.g))?
                );
            }
            _ => anyhow::bail!("unknown command '{}'", cmd),
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "tracing_")]
    tracing_subscriber::fmt::init();

    let arg = std::env::args().nth(1);
    let mut ctx = Context {
        path: None,
        g: if let Some(arg) = &arg {
            if arg == "--help" {
                println!("USAGE: dcr-sim [GRAPH_FILE[.json]]");
                return Ok(());
            } else if std::path::Path::new(arg).exists() {
                load_graph(arg)?
            } else {
                GraphDoc::default().build()?
            }
        } else {
            GraphDoc::default().build()?
        },
    };
    ctx.path = arg.filter(|a| !a.ends_with(".json"));

    let is_atty = atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout);
    let mut stdout = std::io::stdout();
    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        if is_atty {
            write!(&mut stdout, ":")?;
            stdout.flush()?;
        }
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        line.truncate(line.trim_end_matches(&['\r', '\n'][..]).len());
        if ctx.fullic(&line)? {
            continue;
        } else if line == "q!" {
            break;
        } else if line.is_empty() {
            continue;
        }

        if let Err(e) = ctx.rick(&line) {
            eprintln!("{} {}", Colour::Red.paint("E:"), e);
        }
    }

    Ok(())
}
