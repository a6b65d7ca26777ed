//! The workflow graph: named nodes, edges with optional predicates, and a
//! sequential scheduler.
//!
//! The graph is a small explicit data structure, not a framework: a node
//! map plus an ordered edge list. After a node completes, the scheduler
//! takes the *first* edge out of it whose predicate passes (an edge without
//! a predicate always passes); with no matching edge the run terminates.
//! Parallelism lives inside nodes, never between them — a stage completes
//! fully before the next starts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::WorkflowError;

use super::state::RunState;

/// A named unit of work over the run state.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &mut RunState) -> Result<(), WorkflowError>;
}

/// Boolean routing predicate over the state bag.
pub type Predicate = fn(&RunState) -> bool;

/// Observer for node lifecycle events.
///
/// Streaming progress is deliberately out of scope; the graph is wired with
/// [`NoopObserver`] and the hook exists so that wiring is explicit.
pub trait Observer: Send + Sync {
    fn on_node_start(&self, _node: &str) {}
    fn on_node_complete(&self, _node: &str) {}
}

/// The default do-nothing observer.
pub struct NoopObserver;

impl Observer for NoopObserver {}

struct Edge {
    from: &'static str,
    to: &'static str,
    predicate: Option<Predicate>,
}

/// A compiled workflow graph.
pub struct Graph {
    nodes: HashMap<&'static str, Arc<dyn Node>>,
    edges: Vec<Edge>,
    entry: &'static str,
    exit: &'static str,
    observer: Arc<dyn Observer>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("exit", &self.exit)
            .finish()
    }
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Drive the graph from entry to exit, mutating `state` in place.
    pub async fn run(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let mut current = self.entry;
        loop {
            let node = self
                .nodes
                .get(current)
                .ok_or_else(|| WorkflowError::State(format!("graph has no node '{current}'")))?;

            self.observer.on_node_start(current);
            node.run(state).await?;
            self.observer.on_node_complete(current);
            debug!(node = current, "workflow node complete");

            if current == self.exit {
                return Ok(());
            }

            match self.next_node(current, state) {
                Some(next) => current = next,
                // No matching edge: the run terminates here.
                None => return Ok(()),
            }
        }
    }

    fn next_node(&self, from: &str, state: &RunState) -> Option<&'static str> {
        self.edges
            .iter()
            .filter(|e| e.from == from)
            .find(|e| e.predicate.map_or(true, |p| p(state)))
            .map(|e| e.to)
    }
}

/// Builder for [`Graph`]; `build` validates that every edge endpoint and
/// the entry/exit names refer to registered nodes.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<&'static str, Arc<dyn Node>>,
    edges: Vec<Edge>,
    entry: Option<&'static str>,
    exit: Option<&'static str>,
    observer: Option<Arc<dyn Observer>>,
}

impl GraphBuilder {
    pub fn add_node(mut self, name: &'static str, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(name, node);
        self
    }

    pub fn add_edge(mut self, from: &'static str, to: &'static str) -> Self {
        self.edges.push(Edge {
            from,
            to,
            predicate: None,
        });
        self
    }

    pub fn add_conditional_edge(
        mut self,
        from: &'static str,
        to: &'static str,
        predicate: Predicate,
    ) -> Self {
        self.edges.push(Edge {
            from,
            to,
            predicate: Some(predicate),
        });
        self
    }

    pub fn entry(mut self, name: &'static str) -> Self {
        self.entry = Some(name);
        self
    }

    pub fn exit(mut self, name: &'static str) -> Self {
        self.exit = Some(name);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<Graph, WorkflowError> {
        let entry = self
            .entry
            .ok_or_else(|| WorkflowError::State("graph entry node not set".into()))?;
        let exit = self
            .exit
            .ok_or_else(|| WorkflowError::State("graph exit node not set".into()))?;

        for name in [entry, exit] {
            if !self.nodes.contains_key(name) {
                return Err(WorkflowError::State(format!(
                    "graph references unknown node '{name}'"
                )));
            }
        }
        for edge in &self.edges {
            for name in [edge.from, edge.to] {
                if !self.nodes.contains_key(name) {
                    return Err(WorkflowError::State(format!(
                        "edge references unknown node '{name}'"
                    )));
                }
            }
        }

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            exit,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
        })
    }
}
