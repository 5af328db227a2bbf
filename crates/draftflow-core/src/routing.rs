//! Declarative routing table.
//!
//! Every edge out of a phase is declared up front. Conditional edges name
//! their possible branches statically and pick one with a pure function
//! of the session and theme config; a route function returning an
//! undeclared label is a wiring bug and fails the walk. The table is
//! validated once at pipeline build, not discovered during traversal.

use std::collections::BTreeMap;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use draftflow_types::config::ThemeConfig;
use draftflow_types::error::EngineError;
use draftflow_types::session::Session;

use crate::phase::{PhaseKind, PhaseRegistry};

/// Terminal routing target: the walk ends, the session completes.
pub const COMPLETE: &str = "complete";

/// Pure branch selector for a conditional edge.
pub type RouteFn = Arc<dyn Fn(&Session, &ThemeConfig) -> &'static str + Send + Sync>;

enum Edge {
    Static(String),
    Conditional {
        select: RouteFn,
        branches: BTreeMap<String, String>,
    },
}

/// One routing step: the chosen target plus the branch label that chose
/// it (static edges have no label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStep {
    pub target: String,
    pub label: Option<String>,
}

#[derive(Default)]
pub struct RoutingTable {
    edges: BTreeMap<String, Edge>,
}

impl RoutingTable {
    pub fn add_static(&mut self, from: &str, to: &str) {
        self.edges.insert(from.to_string(), Edge::Static(to.to_string()));
    }

    pub fn add_conditional(
        &mut self,
        from: &str,
        select: RouteFn,
        branches: &[(&str, &str)],
    ) {
        self.edges.insert(
            from.to_string(),
            Edge::Conditional {
                select,
                branches: branches
                    .iter()
                    .map(|(label, to)| (label.to_string(), to.to_string()))
                    .collect(),
            },
        );
    }

    /// Resolve the step out of `from` for the session's current state.
    pub fn next(
        &self,
        from: &str,
        session: &Session,
        config: &ThemeConfig,
    ) -> Result<RouteStep, EngineError> {
        match self.edges.get(from) {
            Some(Edge::Static(to)) => Ok(RouteStep {
                target: to.clone(),
                label: None,
            }),
            Some(Edge::Conditional { select, branches }) => {
                let label = select(session, config);
                let target = branches.get(label).ok_or_else(|| {
                    EngineError::Terminal(format!(
                        "route out of '{from}' chose undeclared branch '{label}'"
                    ))
                })?;
                Ok(RouteStep {
                    target: target.clone(),
                    label: Some(label.to_string()),
                })
            }
            None => Err(EngineError::Terminal(format!(
                "phase '{from}' has no outgoing edge"
            ))),
        }
    }

    /// Check the table against the phase registry: every edge endpoint is
    /// a known phase (or the terminal target), every non-terminal phase
    /// has an outgoing edge, and the terminal target and every checkpoint
    /// phase are reachable from the entry. Cycles are allowed; the
    /// revision loop is one.
    pub fn validate(&self, phases: &PhaseRegistry, entry: &str) -> Result<(), EngineError> {
        let wiring = |detail: String| EngineError::Terminal(format!("routing table: {detail}"));

        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: BTreeMap<String, NodeIndex> = BTreeMap::new();
        for name in phases.names().chain(std::iter::once(COMPLETE)) {
            nodes.insert(name.to_string(), graph.add_node(name.to_string()));
        }

        for (from, edge) in &self.edges {
            if !nodes.contains_key(from) {
                return Err(wiring(format!("edge out of unknown phase '{from}'")));
            }
            let targets: Vec<&String> = match edge {
                Edge::Static(to) => vec![to],
                Edge::Conditional { branches, .. } => branches.values().collect(),
            };
            for to in targets {
                let Some(&to_ix) = nodes.get(to) else {
                    return Err(wiring(format!("edge '{from}' -> unknown target '{to}'")));
                };
                graph.add_edge(nodes[from], to_ix, ());
            }
        }

        for name in phases.names() {
            if !self.edges.contains_key(name) {
                return Err(wiring(format!("phase '{name}' has no outgoing edge")));
            }
        }

        let Some(&entry_ix) = nodes.get(entry) else {
            return Err(wiring(format!("entry phase '{entry}' is not registered")));
        };
        let mut dfs = Dfs::new(&graph, entry_ix);
        let mut reached = std::collections::BTreeSet::new();
        while let Some(ix) = dfs.next(&graph) {
            reached.insert(graph[ix].clone());
        }
        if !reached.contains(COMPLETE) {
            return Err(wiring(format!(
                "terminal target '{COMPLETE}' is unreachable from '{entry}'"
            )));
        }
        for def in phases.defs() {
            if matches!(def.kind, PhaseKind::Checkpoint(_)) && !reached.contains(&def.name) {
                return Err(wiring(format!(
                    "checkpoint phase '{}' is unreachable from '{entry}'",
                    def.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseKind;
    use chrono::Utc;
    use draftflow_types::session::{Artifact, SessionStatus};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn blank_session() -> Session {
        Session {
            id: Uuid::now_v7(),
            theme: "editorial".to_string(),
            status: SessionStatus::Processing,
            current_phase: "a".to_string(),
            fields: HashMap::new(),
            pending_checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn two_phase_registry() -> PhaseRegistry {
        let mut phases = PhaseRegistry::default();
        phases.register("a", PhaseKind::Intake);
        phases.register("b", PhaseKind::Generate(Artifact::Outline));
        phases
    }

    #[test]
    fn static_edge_resolves_without_label() {
        let mut table = RoutingTable::default();
        table.add_static("a", "b");
        let config = ThemeConfig::named("editorial");
        let step = table.next("a", &blank_session(), &config).unwrap();
        assert_eq!(step, RouteStep { target: "b".to_string(), label: None });
    }

    #[test]
    fn conditional_edge_reports_label() {
        let mut table = RoutingTable::default();
        table.add_conditional(
            "a",
            Arc::new(|_, _| "forward"),
            &[("forward", "b"), ("back", "a")],
        );
        let config = ThemeConfig::named("editorial");
        let step = table.next("a", &blank_session(), &config).unwrap();
        assert_eq!(step.target, "b");
        assert_eq!(step.label.as_deref(), Some("forward"));
    }

    #[test]
    fn undeclared_branch_is_a_wiring_error() {
        let mut table = RoutingTable::default();
        table.add_conditional("a", Arc::new(|_, _| "sideways"), &[("forward", "b")]);
        let config = ThemeConfig::named("editorial");
        assert!(matches!(
            table.next("a", &blank_session(), &config),
            Err(EngineError::Terminal(_))
        ));
    }

    #[test]
    fn validate_rejects_unknown_target() {
        let mut table = RoutingTable::default();
        table.add_static("a", "nowhere");
        table.add_static("b", COMPLETE);
        assert!(table.validate(&two_phase_registry(), "a").is_err());
    }

    #[test]
    fn validate_rejects_dangling_phase() {
        let mut table = RoutingTable::default();
        table.add_static("a", COMPLETE);
        // "b" has no outgoing edge.
        assert!(table.validate(&two_phase_registry(), "a").is_err());
    }

    #[test]
    fn validate_requires_reachable_completion() {
        let mut table = RoutingTable::default();
        // A loop that never reaches the terminal target.
        table.add_static("a", "b");
        table.add_static("b", "a");
        assert!(table.validate(&two_phase_registry(), "a").is_err());
    }

    #[test]
    fn validate_requires_reachable_checkpoints() {
        let mut phases = PhaseRegistry::default();
        phases.register("a", PhaseKind::Intake);
        phases.register("review", PhaseKind::Checkpoint(Artifact::Outline));
        let mut table = RoutingTable::default();
        // "review" routes onward but nothing routes into it.
        table.add_static("a", COMPLETE);
        table.add_static("review", COMPLETE);
        assert!(table.validate(&phases, "a").is_err());
    }

    #[test]
    fn validate_allows_bounded_cycles() {
        let mut table = RoutingTable::default();
        table.add_static("a", "b");
        table.add_conditional(
            "b",
            Arc::new(|_, _| "done"),
            &[("revise", "a"), ("done", COMPLETE)],
        );
        table.validate(&two_phase_registry(), "a").unwrap();
    }
}
