//! 可达图导出：把探索结果转换为对外的 JSON 结构。
//!
//! 状态按编号顺序输出，每个状态带有全部库所（含 0）的标识快照；
//! 边以 `T<序号>` 命名，标签取迁移标签，没有标签时取迁移名。
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::ReachabilityGraph;
use crate::net::ids::{StateId, TransitionId};
use crate::net::index_vec::Idx;
use crate::net::{Net, Weight};

pub const DEFAULT_GENERATED_WITH: &str = "pn-reach breadth-first explorer";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateIdScheme {
    /// `S0`, `S1`, ...
    #[default]
    Sequential,
    /// 标识字符串，例如 `p1:1_p2:3`；空标识为 `empty`。
    Marking,
}

impl FromStr for StateIdScheme {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(StateIdScheme::Sequential),
            "marking" => Ok(StateIdScheme::Marking),
            other => Err(ExportError::UnknownScheme(other.to_owned())),
        }
    }
}

impl fmt::Display for StateIdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateIdScheme::Sequential => write!(f, "sequential"),
            StateIdScheme::Marking => write!(f, "marking"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("edge {edge} references missing state {state}")]
    MissingState { edge: usize, state: StateId },
    #[error("edge {edge} references unknown transition {transition}")]
    MissingTransition {
        edge: usize,
        transition: TransitionId,
    },
    #[error("state {state} has {actual} places but the net has {expected}")]
    MarkingSize {
        state: StateId,
        expected: usize,
        actual: usize,
    },
    #[error("states {first} and {second} share the id `{id}`")]
    DuplicateStateId {
        id: String,
        first: StateId,
        second: StateId,
    },
    #[error("unknown state id scheme `{0}` (expected `sequential` or `marking`)")]
    UnknownScheme(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedState {
    pub id: String,
    pub marking: IndexMap<String, Weight>,
    pub is_initial: bool,
    pub is_terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportStats {
    pub total_states: usize,
    pub total_transitions: usize,
    pub generated_at: String,
    pub generated_with: String,
    pub truncated: bool,
    pub terminal_states: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub states: Vec<ExportedState>,
    pub transitions: Vec<ExportedEdge>,
    pub stats: ExportStats,
}

impl GraphExport {
    pub fn state(&self, id: &str) -> Option<&ExportedState> {
        self.states.iter().find(|state| state.id == id)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub struct Exporter<'net> {
    net: &'net Net,
    scheme: StateIdScheme,
    generated_with: String,
    timestamp: Option<String>,
}

impl<'net> Exporter<'net> {
    pub fn new(net: &'net Net) -> Self {
        Self {
            net,
            scheme: StateIdScheme::default(),
            generated_with: DEFAULT_GENERATED_WITH.to_owned(),
            timestamp: None,
        }
    }

    pub fn with_scheme(mut self, scheme: StateIdScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_generated_with(mut self, generated_with: impl Into<String>) -> Self {
        self.generated_with = generated_with.into();
        self
    }

    /// 固定 `generated_at`，默认取导出时刻（UTC）。
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn export(&self, graph: &ReachabilityGraph) -> Result<GraphExport, ExportError> {
        let net = self.net;
        let place_names = net
            .places()
            .iter()
            .map(|place| place.name.as_str())
            .collect::<Vec<_>>();

        let mut ids: Vec<String> = Vec::with_capacity(graph.state_count());
        let mut seen: FxHashMap<String, StateId> = FxHashMap::default();
        let mut states = Vec::with_capacity(graph.state_count());
        for node in graph.states() {
            if node.marking.len() != place_names.len() {
                return Err(ExportError::MarkingSize {
                    state: node.id,
                    expected: place_names.len(),
                    actual: node.marking.len(),
                });
            }
            let id = match self.scheme {
                StateIdScheme::Sequential => node.id.to_string(),
                StateIdScheme::Marking => node.key.render(|place| place_names[place.index()]),
            };
            if let Some(&first) = seen.get(&id) {
                return Err(ExportError::DuplicateStateId {
                    id,
                    first,
                    second: node.id,
                });
            }
            seen.insert(id.clone(), node.id);
            let marking = node
                .marking
                .iter()
                .map(|(place, tokens)| (place_names[place.index()].to_owned(), tokens))
                .collect::<IndexMap<_, _>>();
            states.push(ExportedState {
                id: id.clone(),
                marking,
                is_initial: graph.is_initial(node.id),
                is_terminal: graph.is_terminal(node.id),
            });
            ids.push(id);
        }

        let state_id = |edge: usize, state: StateId| {
            ids.get(state.index())
                .cloned()
                .ok_or(ExportError::MissingState { edge, state })
        };

        let transitions = graph
            .edges()
            .map(|edge| {
                let transition =
                    net.transition(edge.transition)
                        .ok_or(ExportError::MissingTransition {
                            edge: edge.index,
                            transition: edge.transition,
                        })?;
                Ok(ExportedEdge {
                    id: format!("T{}", edge.index),
                    source: state_id(edge.index, edge.source)?,
                    target: state_id(edge.index, edge.target)?,
                    label: transition.display_label().to_owned(),
                })
            })
            .collect::<Result<Vec<_>, ExportError>>()?;

        let stats = ExportStats {
            total_states: states.len(),
            total_transitions: transitions.len(),
            generated_at: self
                .timestamp
                .clone()
                .unwrap_or_else(|| Utc::now().format(TIMESTAMP_FORMAT).to_string()),
            generated_with: self.generated_with.clone(),
            truncated: graph.is_truncated(),
            terminal_states: graph.deadlocks().len(),
        };

        log::debug!(
            "exported {} states and {} edges ({} ids)",
            stats.total_states,
            stats.total_transitions,
            self.scheme
        );

        Ok(GraphExport {
            states,
            transitions,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ExplorationConfig, Explorer, reachability_graph};
    use crate::net::Transition;

    fn choice_net() -> (Net, crate::net::Marking) {
        let mut builder = Net::builder();
        builder
            .place("start")
            .place("left")
            .place("right")
            .transition(Transition::with_label("go_left", "Go left"))
            .transition(Transition::new("go_right"))
            .arc("start", "go_left", 1)
            .arc("go_left", "left", 1)
            .arc("start", "go_right", 1)
            .arc("go_right", "right", 2);
        let net = builder.build().unwrap();
        let initial = net.marking([("start", 1)]).unwrap();
        (net, initial)
    }

    #[test]
    fn sequential_export_lists_every_place() {
        let (net, initial) = choice_net();
        let graph = reachability_graph(&net, &initial).unwrap();
        let export = Exporter::new(&net)
            .with_timestamp("2024-01-01 00:00:00")
            .export(&graph)
            .unwrap();

        assert_eq!(export.states.len(), 3);
        let s0 = &export.states[0];
        assert_eq!(s0.id, "S0");
        assert!(s0.is_initial && !s0.is_terminal);
        assert_eq!(
            s0.marking.iter().map(|(k, v)| (k.as_str(), *v)).collect::<Vec<_>>(),
            vec![("start", 1), ("left", 0), ("right", 0)]
        );
        assert!(export.states[1].is_terminal && export.states[2].is_terminal);

        let labels = export
            .transitions
            .iter()
            .map(|t| (t.id.as_str(), t.source.as_str(), t.target.as_str(), t.label.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec![("T0", "S0", "S1", "Go left"), ("T1", "S0", "S2", "go_right")]
        );
        assert_eq!(export.stats.terminal_states, 2);
        assert_eq!(export.stats.generated_at, "2024-01-01 00:00:00");
        assert_eq!(export.stats.generated_with, DEFAULT_GENERATED_WITH);
        assert!(!export.stats.truncated);
    }

    #[test]
    fn marking_ids_are_rendered_from_nonzero_places() {
        let (net, initial) = choice_net();
        let graph = reachability_graph(&net, &initial).unwrap();
        let export = Exporter::new(&net)
            .with_scheme(StateIdScheme::Marking)
            .export(&graph)
            .unwrap();
        let ids = export.states.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["start:1", "left:1", "right:2"]);
        assert_eq!(export.transitions[1].target, "right:2");
    }

    #[test]
    fn marking_ids_stay_distinct_when_names_contain_separators() {
        let mut builder = Net::builder();
        builder
            .place("a")
            .place("b")
            .place("a:1_b")
            .transition(Transition::new("split"))
            .arc("a:1_b", "split", 1)
            .arc("split", "a", 1)
            .arc("split", "b", 1);
        let net = builder.build().unwrap();
        let initial = net.marking([("a:1_b", 1)]).unwrap();
        let graph = reachability_graph(&net, &initial).unwrap();
        let export = Exporter::new(&net)
            .with_scheme(StateIdScheme::Marking)
            .export(&graph)
            .unwrap();
        let ids = export.states.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec![r"a\:1_b:1", "a:1_b:1"]);
        assert_eq!(export.transitions[0].source, r"a\:1_b:1");
        assert_eq!(export.transitions[0].target, "a:1_b:1");
    }

    #[test]
    fn json_uses_camel_case_state_flags() {
        let (net, initial) = choice_net();
        let graph = Explorer::new(&net)
            .with_config(ExplorationConfig::with_state_limit(2))
            .explore(&initial)
            .unwrap();
        let export = Exporter::new(&net).export(&graph).unwrap();
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["states"][0]["isInitial"], true);
        assert_eq!(value["states"][0]["isTerminal"], false);
        assert_eq!(value["stats"]["truncated"], true);
        assert_eq!(value["stats"]["total_states"], 2);
    }

    #[test]
    fn scheme_parses_case_insensitively() {
        assert_eq!("Marking".parse::<StateIdScheme>().unwrap(), StateIdScheme::Marking);
        assert_eq!(" sequential ".parse::<StateIdScheme>().unwrap(), StateIdScheme::Sequential);
        assert!(matches!(
            "hash".parse::<StateIdScheme>(),
            Err(ExportError::UnknownScheme(s)) if s == "hash"
        ));
    }
}
