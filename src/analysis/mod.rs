//! 状态空间分析。
pub mod reachability;

pub use reachability::{
    DEFAULT_STATE_LIMIT, EdgeRecord, ExplorationConfig, ExplorationLimitExceeded, ExploreError,
    Explorer, ReachabilityGraph, StateEdge, StateNode, reachability_graph,
};
