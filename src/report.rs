use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::analysis::ReachabilityGraph;
use crate::net::{Net, Weight};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockState {
    pub state_id: String,
    pub marking: Vec<(String, Weight)>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockTrace {
    /// 从初始标识出发的最短迁移序列（迁移标签）。
    pub steps: Vec<String>,
    pub final_state: Option<DeadlockState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSpaceInfo {
    pub total_states: usize,
    pub total_transitions: usize,
    pub truncated: bool,
}

/// 终止状态报告：列出可达图中所有没有后继的已展开状态及其见证路径。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockReport {
    pub net_name: String,
    pub has_deadlock: bool,
    pub deadlock_count: usize,
    pub deadlock_states: Vec<DeadlockState>,
    pub traces: Vec<DeadlockTrace>,
    pub analysis_time: Duration,
    pub state_space_info: Option<StateSpaceInfo>,
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "终止状态分析报告")?;
        writeln!(f, "网: {}", self.net_name)?;
        writeln!(f, "分析时间: {:?}", self.analysis_time)?;
        writeln!(f, "是否存在终止状态: {}", self.has_deadlock)?;

        if self.has_deadlock {
            writeln!(f, "\n发现 {} 个终止状态:", self.deadlock_count)?;
            for (i, trace) in self.traces.iter().enumerate() {
                writeln!(f, "\n终止状态 #{}", i + 1)?;
                if let Some(state) = &trace.final_state {
                    writeln!(f, "状态ID: {}", state.state_id)?;
                    writeln!(f, "描述: {}", state.description)?;
                    if !state.marking.is_empty() {
                        writeln!(f, "标识:")?;
                        for (place, tokens) in &state.marking {
                            writeln!(f, "  {}: {}", place, tokens)?;
                        }
                    }
                }
                if trace.steps.is_empty() {
                    writeln!(f, "路径: <初始标识>")?;
                } else {
                    writeln!(f, "路径: {}", trace.steps.join(" -> "))?;
                }
            }
        }

        if let Some(space_info) = &self.state_space_info {
            writeln!(f, "\n状态空间信息:")?;
            writeln!(f, "总状态数: {}", space_info.total_states)?;
            writeln!(f, "总转换数: {}", space_info.total_transitions)?;
            if space_info.truncated {
                writeln!(f, "（已达到状态上限，结果不完整）")?;
            }
        }

        Ok(())
    }
}

impl DeadlockReport {
    pub fn new(net_name: impl Into<String>) -> Self {
        Self {
            net_name: net_name.into(),
            has_deadlock: false,
            deadlock_count: 0,
            deadlock_states: Vec::new(),
            traces: Vec::new(),
            analysis_time: Duration::default(),
            state_space_info: None,
        }
    }

    pub fn from_graph(
        net_name: impl Into<String>,
        net: &Net,
        graph: &ReachabilityGraph,
        analysis_time: Duration,
    ) -> Self {
        let mut report = Self::new(net_name);
        report.analysis_time = analysis_time;
        report.state_space_info = Some(StateSpaceInfo {
            total_states: graph.state_count(),
            total_transitions: graph.edge_count(),
            truncated: graph.is_truncated(),
        });

        for &id in graph.deadlocks() {
            let Some(node) = graph.state(id) else {
                continue;
            };
            let marking = node
                .marking
                .iter()
                .filter(|&(_, tokens)| tokens > 0)
                .map(|(place, tokens)| (net.places()[place].name.clone(), tokens))
                .collect::<Vec<_>>();
            let description = if marking.is_empty() {
                "所有库所为空，没有可发生的迁移".to_owned()
            } else {
                "没有可发生的迁移".to_owned()
            };
            let state = DeadlockState {
                state_id: id.to_string(),
                marking,
                description,
            };
            let steps = graph
                .shortest_trace(id)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|t| net.transition(t).map(|t| t.display_label().to_owned()))
                .collect();
            report.deadlock_states.push(state.clone());
            report.traces.push(DeadlockTrace {
                steps,
                final_state: Some(state),
            });
        }
        report.deadlock_count = report.deadlock_states.len();
        report.has_deadlock = report.deadlock_count > 0;
        report
    }

    /// 写出文本报告，并在旁边写一份 `<path>.json`。
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_string())?;

        let mut json_path = path.as_os_str().to_owned();
        json_path.push(".json");
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(json_path, json)
    }
}
