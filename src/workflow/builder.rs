//! 工作流构建器
//!
//! 提供流畅的API来声明节点、顺序边（含扇出/汇合）与一条条件回跳边

use std::collections::HashMap;
use std::sync::Arc;

use crate::case::CaseState;
use crate::workflow::graph::{ConditionalEdge, WorkflowGraph};
use crate::workflow::node::CapabilityNode;
use crate::workflow::router::MAX_ITERATIONS;
use crate::workflow::types::*;

/// 工作流构建器
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<(NodeId, Arc<dyn CapabilityNode>)>,
    edges: Vec<Edge>,
    conditional: Option<ConditionalEdge>,
    entry: Option<NodeId>,
    iteration_node: Option<NodeId>,
    max_iterations: u32,
    /// 构建过程中遇到的第一个错误，build 时返回
    error: Option<WorkflowError>,
}

impl WorkflowBuilder {
    /// 创建新的工作流构建器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            conditional: None,
            entry: None,
            iteration_node: None,
            max_iterations: MAX_ITERATIONS,
            error: None,
        }
    }

    fn fail(&mut self, err: WorkflowError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// 注册节点
    pub fn register(self, id: impl Into<NodeId>, node: impl CapabilityNode + 'static) -> Self {
        self.register_arc(id, Arc::new(node))
    }

    /// 注册已共享的节点
    pub fn register_arc(mut self, id: impl Into<NodeId>, node: Arc<dyn CapabilityNode>) -> Self {
        let id = id.into();
        if self.nodes.iter().any(|(existing, _)| existing == &id) {
            self.fail(WorkflowError::DuplicateNode(id));
        } else {
            self.nodes.push((id, node));
        }
        self
    }

    /// 设置入口节点
    pub fn entry(mut self, id: impl Into<NodeId>) -> Self {
        self.entry = Some(id.into());
        self
    }

    /// 设置顺序依赖；同一 from 多条边即扇出，同一 to 多条边即汇合
    pub fn edge(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        let edge = Edge {
            from: from.into(),
            to: to.into(),
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        self
    }

    /// 设置条件边：from 执行后调用 router，按判定种类查 branches 决定去向
    pub fn conditional_edge<R, I>(mut self, from: impl Into<NodeId>, router: R, branches: I) -> Self
    where
        R: Fn(&CaseState) -> Decision + Send + Sync + 'static,
        I: IntoIterator<Item = (DecisionKind, Target)>,
    {
        let from = from.into();
        if let Some(existing) = &self.conditional {
            let err = WorkflowError::DuplicateConditional(existing.from.clone());
            self.fail(err);
            return self;
        }
        self.conditional = Some(ConditionalEdge {
            from,
            router: Arc::new(router),
            branches: branches.into_iter().collect::<HashMap<_, _>>(),
        });
        self
    }

    /// 设置修订节点：每执行一次迭代计数 +1
    pub fn iteration_node(mut self, id: impl Into<NodeId>) -> Self {
        self.iteration_node = Some(id.into());
        self
    }

    /// 设置迭代上限（限制在 1..=[`MAX_ITERATIONS`]）
    pub fn max_iterations(mut self, limit: u32) -> Self {
        self.max_iterations = limit.clamp(1, MAX_ITERATIONS);
        self
    }

    /// 构建并校验工作流图
    pub fn build(self) -> Result<WorkflowGraph, WorkflowError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let entry = self.entry.ok_or(WorkflowError::EntryNotSet)?;

        let graph = WorkflowGraph {
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
            conditional: self.conditional,
            entry,
            iteration_node: self.iteration_node,
            max_iterations: self.max_iterations,
        };
        graph.validate()?;
        Ok(graph)
    }
}
