//! 可达图构造：从初始标识出发的广度优先状态空间探索。
//!
//! 访问表以标识的规范键为索引，是判断“标识是否已出现”的唯一依据；
//! 状态编号按 BFS 首次发现顺序分配，边按发现顺序记录且从不合并。
use std::collections::VecDeque;
use std::collections::hash_map::Entry;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;

use petgraph::Direction;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::net::ids::{StateId, TransitionId};
use crate::net::index_vec::Idx;
use crate::net::structure::{Marking, MarkingKey};
use crate::net::{FireError, Net};

/// 状态数达到上限后仍有新标识待加入；结果为带截断标记的部分可达图。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("exploration stopped after reaching the limit of {limit} states")]
pub struct ExplorationLimitExceeded {
    pub limit: usize,
}

#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("firing rule violated during exploration: {0}")]
    Fire(#[from] FireError),
    #[error("exploration cancelled after {states} states")]
    Cancelled { states: usize },
    #[error("initial marking has {actual} places but the net has {expected}")]
    MarkingSize { expected: usize, actual: usize },
}

#[derive(Debug, Clone)]
pub struct StateNode {
    pub id: StateId,
    pub marking: Marking,
    pub key: MarkingKey,
    /// BFS 树中的父状态与所发生的迁移；初始状态为 `None`。
    pub parent: Option<(StateId, TransitionId)>,
    /// 是否已处理完全部可发生迁移。截断时前沿上的状态为 `false`。
    pub expanded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEdge {
    pub transition: TransitionId,
}

/// One recorded firing, in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRecord {
    pub index: usize,
    pub source: StateId,
    pub transition: TransitionId,
    pub target: StateId,
}

/// 默认状态上限，与配置文件的缺省值一致。
pub const DEFAULT_STATE_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorationConfig {
    /// 最多探索的状态数量。None 表示不设上限。
    pub state_limit: Option<NonZeroUsize>,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self::with_state_limit(DEFAULT_STATE_LIMIT)
    }
}

impl ExplorationConfig {
    /// `0` 表示不设上限。
    pub fn with_state_limit(limit: usize) -> Self {
        Self {
            state_limit: NonZeroUsize::new(limit),
        }
    }

    pub fn unlimited() -> Self {
        Self { state_limit: None }
    }
}

#[derive(Debug)]
pub struct ReachabilityGraph {
    graph: DiGraph<StateNode, StateEdge>,
    markings: FxHashMap<MarkingKey, StateId>,
    deadlocks: Vec<StateId>,
    truncation: Option<ExplorationLimitExceeded>,
}

fn node(id: StateId) -> NodeIndex {
    NodeIndex::new(id.index())
}

impl ReachabilityGraph {
    pub fn initial(&self) -> StateId {
        StateId::INITIAL
    }

    pub fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// States in discovery order.
    pub fn states(&self) -> impl ExactSizeIterator<Item = &StateNode> {
        self.graph.raw_nodes().iter().map(|node| &node.weight)
    }

    /// Firings in discovery order.
    pub fn edges(&self) -> impl ExactSizeIterator<Item = EdgeRecord> + '_ {
        self.graph
            .raw_edges()
            .iter()
            .enumerate()
            .map(|(index, edge)| EdgeRecord {
                index,
                source: StateId::from_usize(edge.source().index()),
                transition: edge.weight.transition,
                target: StateId::from_usize(edge.target().index()),
            })
    }

    pub fn state(&self, id: StateId) -> Option<&StateNode> {
        self.graph.node_weight(node(id))
    }

    pub fn out_degree(&self, id: StateId) -> usize {
        self.graph
            .edges_directed(node(id), Direction::Outgoing)
            .count()
    }

    pub fn is_initial(&self, id: StateId) -> bool {
        id.is_initial() && id.index() < self.state_count()
    }

    /// Expanded states without enabled transitions.
    pub fn is_terminal(&self, id: StateId) -> bool {
        self.deadlocks.binary_search(&id).is_ok()
    }

    pub fn deadlocks(&self) -> &[StateId] {
        &self.deadlocks
    }

    pub fn state_of(&self, marking: &Marking) -> Option<StateId> {
        self.markings.get(&marking.canonical_key()).copied()
    }

    pub fn truncation(&self) -> Option<ExplorationLimitExceeded> {
        self.truncation
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    /// Rejects partial graphs.
    pub fn into_complete(self) -> Result<Self, ExplorationLimitExceeded> {
        match self.truncation {
            Some(limit) => Err(limit),
            None => Ok(self),
        }
    }

    /// 沿 BFS 父指针回溯得到从初始标识到 `id` 的最短发生序列。
    pub fn shortest_trace(&self, id: StateId) -> Option<Vec<TransitionId>> {
        let mut trace = Vec::new();
        let mut current = self.state(id)?;
        while let Some((parent, transition)) = current.parent {
            trace.push(transition);
            current = self.state(parent)?;
        }
        trace.reverse();
        Some(trace)
    }

    pub fn dot(&self, net: &Net) -> String {
        fn escape(s: &str) -> String {
            s.replace('\\', "\\\\").replace('"', "\\\"")
        }

        let edge_attr = |_, edge: petgraph::graph::EdgeReference<'_, StateEdge>| -> String {
            let label = net
                .transition(edge.weight().transition)
                .map(|t| t.display_label())
                .unwrap_or("?");
            format!("label=\"{}\"", escape(label))
        };

        let node_attr = |_, (idx, state): (NodeIndex, &StateNode)| -> String {
            let marking = state
                .key
                .render(|place| net.places()[place].name.as_str());
            let mut attrs = format!("label=\"{}\\n{}\"", state.id, escape(&marking));
            let id = StateId::from_usize(idx.index());
            if id.is_initial() {
                attrs.push_str(", penwidth=2");
            }
            if self.is_terminal(id) {
                attrs.push_str(", style=filled, fillcolor=\"#ffcdd2\"");
            } else if !state.expanded {
                attrs.push_str(", style=dashed");
            }
            attrs
        };

        format!(
            "{:?}",
            Dot::with_attr_getters(
                &self.graph,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &edge_attr,
                &node_attr
            )
        )
    }

    pub fn write_dot<P: AsRef<Path>>(&self, net: &Net, path: P) -> std::io::Result<()> {
        let dot = self.dot(net);
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, dot)
    }
}

/// 广度优先探索器。每次运行独占前沿、访问表与输出图。
pub struct Explorer<'net> {
    net: &'net Net,
    config: ExplorationConfig,
    cancel: Option<CancellationToken>,
}

impl<'net> Explorer<'net> {
    pub fn new(net: &'net Net) -> Self {
        Self {
            net,
            config: ExplorationConfig::default(),
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: ExplorationConfig) -> Self {
        self.config = config;
        self
    }

    /// The token is checked before each dequeue.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn explore(&self, initial: &Marking) -> Result<ReachabilityGraph, ExploreError> {
        let net = self.net;
        if initial.len() != net.places_len() {
            return Err(ExploreError::MarkingSize {
                expected: net.places_len(),
                actual: initial.len(),
            });
        }

        let mut graph: DiGraph<StateNode, StateEdge> = DiGraph::new();
        let mut markings: FxHashMap<MarkingKey, StateId> = FxHashMap::default();
        let mut queue: VecDeque<StateId> = VecDeque::new();
        let mut truncation = None;
        let limit = self.config.state_limit.map(NonZeroUsize::get);

        log::debug!(
            "exploring state space: {} places, {} transitions, limit {:?}",
            net.places_len(),
            net.transitions_len(),
            limit
        );

        let initial_key = initial.canonical_key();
        graph.add_node(StateNode {
            id: StateId::INITIAL,
            marking: initial.clone(),
            key: initial_key.clone(),
            parent: None,
            expanded: false,
        });
        markings.insert(initial_key, StateId::INITIAL);
        queue.push_back(StateId::INITIAL);

        'bfs: while let Some(state_id) = queue.pop_front() {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    return Err(ExploreError::Cancelled {
                        states: graph.node_count(),
                    });
                }
            }

            let current = graph[node(state_id)].marking.clone();
            for transition in net.enabled_transitions(&current) {
                let next = net.fire(&current, transition)?;
                let key = next.canonical_key();

                let target = match markings.entry(key) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        if let Some(limit) = limit {
                            if graph.node_count() >= limit {
                                truncation = Some(ExplorationLimitExceeded { limit });
                                break 'bfs;
                            }
                        }
                        let id = StateId::from_usize(graph.node_count());
                        graph.add_node(StateNode {
                            id,
                            marking: next,
                            key: entry.key().clone(),
                            parent: Some((state_id, transition)),
                            expanded: false,
                        });
                        entry.insert(id);
                        queue.push_back(id);
                        id
                    }
                };

                graph.add_edge(node(state_id), node(target), StateEdge { transition });
            }
            graph[node(state_id)].expanded = true;
        }

        let deadlocks = graph
            .node_indices()
            .filter(|&idx| {
                graph[idx].expanded
                    && graph
                        .edges_directed(idx, Direction::Outgoing)
                        .next()
                        .is_none()
            })
            .map(|idx| StateId::from_usize(idx.index()))
            .collect::<Vec<_>>();

        match truncation {
            Some(limit) => log::warn!(
                "{}; {} states, {} edges recorded",
                limit,
                graph.node_count(),
                graph.edge_count()
            ),
            None => log::debug!(
                "state space complete: {} states, {} edges, {} deadlocks",
                graph.node_count(),
                graph.edge_count(),
                deadlocks.len()
            ),
        }

        Ok(ReachabilityGraph {
            graph,
            markings,
            deadlocks,
            truncation,
        })
    }
}

/// 以默认配置构造可达图。
pub fn reachability_graph(net: &Net, initial: &Marking) -> Result<ReachabilityGraph, ExploreError> {
    Explorer::new(net).explore(initial)
}
