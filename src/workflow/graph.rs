//! 工作流依赖图
//!
//! 显式、可检查的数据结构：节点表 + 顺序边 + 条件边。
//! 入度来自顺序边；条件边的回跳不计入入度（回跳目标由路由直接调度）。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::case::CaseState;
use crate::workflow::node::CapabilityNode;
use crate::workflow::types::*;

pub type RouterFn = dyn Fn(&CaseState) -> Decision + Send + Sync;

/// 条件边：`from` 执行后由 router 选择去向
pub struct ConditionalEdge {
    pub from: NodeId,
    pub router: Arc<RouterFn>,
    pub branches: HashMap<DecisionKind, Target>,
}

impl ConditionalEdge {
    pub fn decide(&self, state: &CaseState) -> Decision {
        (self.router)(state)
    }

    pub fn target(&self, kind: DecisionKind) -> Option<&Target> {
        self.branches.get(&kind)
    }
}

impl fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("from", &self.from)
            .field("branches", &self.branches)
            .finish()
    }
}

/// 工作流依赖图
pub struct WorkflowGraph {
    pub(crate) name: String,
    /// 注册顺序即展示顺序
    pub(crate) nodes: Vec<(NodeId, Arc<dyn CapabilityNode>)>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) conditional: Option<ConditionalEdge>,
    pub(crate) entry: NodeId,
    /// 每执行一次即推进迭代计数的节点（修订节点）
    pub(crate) iteration_node: Option<NodeId>,
    pub(crate) max_iterations: u32,
}

impl WorkflowGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn CapabilityNode>> {
        self.nodes
            .iter()
            .find(|(node_id, _)| node_id == id)
            .map(|(_, node)| node)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn conditional(&self) -> Option<&ConditionalEdge> {
        self.conditional.as_ref()
    }

    pub fn conditional_from(&self, id: &str) -> Option<&ConditionalEdge> {
        self.conditional.as_ref().filter(|c| c.from == id)
    }

    pub fn iteration_node(&self) -> Option<&str> {
        self.iteration_node.as_deref()
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// 顺序后继，按边的声明顺序
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// 顺序前驱；多于一个即为汇合点
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from.as_str())
            .collect()
    }

    /// 入度表：节点 -> 顺序前驱数
    pub fn in_degree(&self) -> HashMap<&str, usize> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|(id, _)| (id.as_str(), 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
        }
        in_degree
    }

    /// 检查入口、边端点、条件分支都指向已注册节点
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if !self.contains(&self.entry) {
            return Err(WorkflowError::UnknownNode(self.entry.clone()));
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !self.contains(end) {
                    return Err(WorkflowError::UnknownNode(end.clone()));
                }
            }
        }
        if let Some(node) = &self.iteration_node {
            if !self.contains(node) {
                return Err(WorkflowError::UnknownNode(node.clone()));
            }
        }
        if let Some(cond) = &self.conditional {
            if !self.contains(&cond.from) {
                return Err(WorkflowError::UnknownNode(cond.from.clone()));
            }
            for kind in [DecisionKind::Terminate, DecisionKind::Retry] {
                match cond.target(kind) {
                    None => {
                        return Err(WorkflowError::MissingBranch {
                            from: cond.from.clone(),
                            kind,
                        })
                    }
                    Some(Target::Node(id)) if !self.contains(id) => {
                        return Err(WorkflowError::UnknownNode(id.clone()))
                    }
                    Some(_) => {}
                }
            }
        }
        if self.max_iterations == 0 {
            return Err(WorkflowError::InvalidConfiguration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("name", &self.name)
            .field("nodes", &self.node_names())
            .field("edges", &self.edges)
            .field("conditional", &self.conditional)
            .field("entry", &self.entry)
            .field("iteration_node", &self.iteration_node)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
