//! P/T Petri 网可达图引擎。
//!
//! * [`net`]：网结构、标识与发生规则，以及 PNML/JSON/RON 导入；
//! * [`analysis`]：广度优先的状态空间探索；
//! * [`export`]：可达图的 JSON 导出；
//! * [`web`]：HTTP 服务（`pn-web`）。
#![warn(non_snake_case)]

pub mod analysis;
pub mod config;
pub mod export;
pub mod net;
pub mod options;
pub mod report;
pub mod web;

pub use analysis::{ExplorationConfig, ExplorationLimitExceeded, Explorer, ReachabilityGraph};
pub use export::{Exporter, GraphExport, StateIdScheme};
pub use net::{Marking, Net, ParsedNet};
