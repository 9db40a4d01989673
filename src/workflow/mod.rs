pub mod builder;
pub mod engine;
pub mod graph;
pub mod node;
pub mod router;
pub mod types;

pub use builder::WorkflowBuilder;
pub use engine::WorkflowEngine;
pub use graph::{ConditionalEdge, WorkflowGraph};
pub use node::{CapabilityNode, FnNode, NodeError, NodeOutcome};
pub use router::{QualityGateRouter, MAX_ITERATIONS};
pub use types::*;
