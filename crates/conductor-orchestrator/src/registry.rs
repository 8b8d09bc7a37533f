use crate::config::EngineConfig;
use crate::node::{Node, NodeName};
use crate::nodes::{
    ClarifierNode, EvaluatorNode, FinalizerNode, PlannerNode, SummarizerNode, WorkerNode,
};
use conductor_agent::ReasoningProvider;
use conductor_core::{ConductorError, ConductorResult};
use conductor_security::SafetyClassifier;
use conductor_tools::ToolExecutor;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// NodeProviders
// ---------------------------------------------------------------------------

/// Which reasoning provider each node talks to: a default plus overrides.
#[derive(Clone)]
pub struct NodeProviders {
    default: Arc<dyn ReasoningProvider>,
    overrides: HashMap<NodeName, Arc<dyn ReasoningProvider>>,
}

impl NodeProviders {
    /// Every node uses `default`.
    pub fn new(default: Arc<dyn ReasoningProvider>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Gives `node` its own provider.
    pub fn with(mut self, node: NodeName, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.overrides.insert(node, provider);
        self
    }

    /// Provider for `node`.
    pub fn get(&self, node: NodeName) -> Arc<dyn ReasoningProvider> {
        self.overrides
            .get(&node)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}

// ---------------------------------------------------------------------------
// NodeRegistry
// ---------------------------------------------------------------------------

/// Exactly one node per [`NodeName`].
pub struct NodeRegistry {
    nodes: HashMap<NodeName, Arc<dyn Node>>,
}

impl NodeRegistry {
    /// Fails unless every node name is covered exactly once.
    pub fn build(nodes: Vec<Arc<dyn Node>>) -> ConductorResult<Self> {
        let mut map: HashMap<NodeName, Arc<dyn Node>> = HashMap::new();
        for node in nodes {
            let name = node.name();
            if map.insert(name, node).is_some() {
                return Err(ConductorError::Config(format!(
                    "Node {name} is registered twice"
                )));
            }
        }
        let missing: Vec<&str> = NodeName::ALL
            .iter()
            .filter(|n| !map.contains_key(n))
            .map(|n| n.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ConductorError::Config(format!(
                "Missing nodes: {}",
                missing.join(", ")
            )));
        }
        Ok(Self { nodes: map })
    }

    /// The standard node set.
    pub fn standard(
        providers: &NodeProviders,
        tools: ToolExecutor,
        classifier: Arc<SafetyClassifier>,
        config: &EngineConfig,
    ) -> ConductorResult<Self> {
        let attempts = config.parse_attempts;
        let nodes: Vec<Arc<dyn Node>> = vec![
            Arc::new(ClarifierNode::new(providers.get(NodeName::Clarifier), attempts)),
            Arc::new(PlannerNode::new(providers.get(NodeName::Planner), attempts)),
            Arc::new(WorkerNode::researcher(
                providers.get(NodeName::Researcher),
                tools.clone(),
                Arc::clone(&classifier),
                config.max_tool_rounds,
            )),
            Arc::new(WorkerNode::executor(
                providers.get(NodeName::Executor),
                tools,
                classifier,
                config.max_tool_rounds,
            )),
            Arc::new(SummarizerNode::new(providers.get(NodeName::Summarizer), attempts)),
            Arc::new(EvaluatorNode::new(providers.get(NodeName::Evaluator), attempts)),
            Arc::new(FinalizerNode::new(providers.get(NodeName::Finalizer), attempts)),
        ];
        Self::build(nodes)
    }

    /// Swaps in a different implementation for one node.
    pub fn replace(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(node.name(), node);
        self
    }

    /// The node registered as `name`.
    pub fn get(&self, name: NodeName) -> ConductorResult<&Arc<dyn Node>> {
        self.nodes
            .get(&name)
            .ok_or_else(|| ConductorError::Config(format!("Node {name} is not registered")))
    }
}
