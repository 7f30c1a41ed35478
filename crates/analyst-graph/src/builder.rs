//! Graph construction
//!
//! [`build`] turns an [`ActiveSet`] into the fixed-shape DAG
//! `start → {active analysts} → barrier → risk → portfolio → end`.
//! The shape is not configurable beyond the choice of analysts, so a built
//! graph is acyclic by construction. [`CompiledGraph::validate`] exists for
//! graphs assembled by other means.

use analyst_core::{ActiveSet, GraphError, NodeId, Result};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// A vertex of the compiled graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertex {
    Start,
    Node(NodeId),
    Barrier,
    End,
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Start => f.write_str("__start__"),
            Vertex::Node(id) => write!(f, "{id}"),
            Vertex::Barrier => f.write_str("__barrier__"),
            Vertex::End => f.write_str("__end__"),
        }
    }
}

/// Directed edge `from → to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: Vertex,
    pub to: Vertex,
}

impl Edge {
    pub fn new(from: Vertex, to: Vertex) -> Self {
        Self { from, to }
    }
}

/// An immutable pipeline graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    active: ActiveSet,
    edges: Vec<Edge>,
}

/// Build the pipeline graph for the given analysts
///
/// An empty set is legal: the barrier then has no predecessors and the
/// run goes straight to the risk stage.
pub fn build(active: &ActiveSet) -> CompiledGraph {
    let mut edges = Vec::with_capacity(active.len() * 2 + 3);
    for id in active.ids() {
        edges.push(Edge::new(Vertex::Start, Vertex::Node(id)));
        edges.push(Edge::new(Vertex::Node(id), Vertex::Barrier));
    }
    edges.push(Edge::new(Vertex::Barrier, Vertex::Node(NodeId::Risk)));
    edges.push(Edge::new(
        Vertex::Node(NodeId::Risk),
        Vertex::Node(NodeId::Portfolio),
    ));
    edges.push(Edge::new(Vertex::Node(NodeId::Portfolio), Vertex::End));

    CompiledGraph {
        active: active.clone(),
        edges,
    }
}

impl CompiledGraph {
    /// Assemble a graph from raw parts without the shape guarantees of [`build`]
    pub fn from_parts(active: ActiveSet, edges: Vec<Edge>) -> Self {
        Self { active, edges }
    }

    /// Analysts of the fan-out stage, in selection order
    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn in_degree(&self, vertex: Vertex) -> usize {
        self.edges.iter().filter(|e| e.to == vertex).count()
    }

    pub fn out_degree(&self, vertex: Vertex) -> usize {
        self.edges.iter().filter(|e| e.from == vertex).count()
    }

    /// Direct successors of `vertex`, in edge order
    pub fn successors(&self, vertex: Vertex) -> impl Iterator<Item = Vertex> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.from == vertex)
            .map(|e| e.to)
    }

    /// Every vertex mentioned by the graph: start, analysts, barrier, tail, end
    pub fn vertices(&self) -> Vec<Vertex> {
        let mut vertices = vec![Vertex::Start];
        vertices.extend(self.active.ids().map(Vertex::Node));
        vertices.extend([
            Vertex::Barrier,
            Vertex::Node(NodeId::Risk),
            Vertex::Node(NodeId::Portfolio),
            Vertex::End,
        ]);
        vertices
    }

    /// Check the graph is a DAG over its own vertices
    ///
    /// Runs Kahn's algorithm; an edge touching an unknown vertex or a
    /// leftover vertex (a cycle) is an aggregation error.
    pub fn validate(&self) -> Result<()> {
        let vertices = self.vertices();
        let mut in_degree: HashMap<Vertex, usize> = vertices.iter().map(|v| (*v, 0)).collect();

        for edge in &self.edges {
            if !in_degree.contains_key(&edge.from) {
                return Err(GraphError::Aggregation(format!(
                    "edge {} -> {} starts at an unknown vertex",
                    edge.from, edge.to
                )));
            }
            match in_degree.get_mut(&edge.to) {
                Some(degree) => *degree += 1,
                None => {
                    return Err(GraphError::Aggregation(format!(
                        "edge {} -> {} ends at an unknown vertex",
                        edge.from, edge.to
                    )));
                }
            }
        }

        let mut ready: VecDeque<Vertex> = vertices
            .iter()
            .copied()
            .filter(|v| in_degree.get(v) == Some(&0))
            .collect();
        let mut visited = 0;

        while let Some(vertex) = ready.pop_front() {
            visited += 1;
            for next in self.successors(vertex) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(next);
                    }
                }
            }
        }

        if visited != vertices.len() {
            return Err(GraphError::Aggregation(format!(
                "graph contains a cycle ({} of {} vertices sorted)",
                visited,
                vertices.len()
            )));
        }
        Ok(())
    }

    /// Render as a Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD;\n");
        for edge in &self.edges {
            // The barrier is an implicit join, not a vertex of its own
            match (edge.from, edge.to) {
                (_, Vertex::Barrier) => {}
                (Vertex::Barrier, to) => {
                    if self.active.is_empty() {
                        out.push_str(&format!("\t{} --> {};\n", Vertex::Start, to));
                    } else {
                        for id in self.active.ids() {
                            out.push_str(&format!("\t{id} --> {to};\n"));
                        }
                    }
                }
                (from, to) => out.push_str(&format!("\t{from} --> {to};\n")),
            }
        }
        out
    }
}
