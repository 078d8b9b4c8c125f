#![forbid(unsafe_code)]

//! Shared data model for the FlowViz engine.
//!
//! Everything the parser produces and the downstream consumers (highlight
//! engine, self-test harness, viewer server) read lives here: the typed
//! graph records, the warning record, and the single fatal error type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default hard node limit; parsing fails outright above this.
pub const DEFAULT_MAX_NODES: usize = 1000;

/// Default advisory node limit; above this the viewer should simplify.
pub const DEFAULT_PREFERRED_MAX_NODES: usize = 300;

/// A single node of the parsed graph.
///
/// `id` is the unique, case-sensitive key (first mention wins). `label`
/// starts out equal to `id` and is replaced by any later non-empty
/// bracketed label. `line` is the 1-based source line of the first
/// mention. `group` is sticky: assigned at most once, never reassigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowNode {
    pub id: String,
    pub label: String,
    pub line: usize,
    pub group: Option<String>,
}

/// A directed edge between two node ids.
///
/// Edges are never deduplicated; parallel edges between the same pair
/// stay distinct entries in statement order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
    pub line: usize,
}

/// A non-fatal diagnostic attached to a successful parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
}

impl ParseWarning {
    #[must_use]
    pub fn at_line(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
            nodes: None,
        }
    }

    #[must_use]
    pub fn cycle(message: impl Into<String>, nodes: Vec<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
            nodes: Some(nodes),
        }
    }
}

/// Metadata block of a parse result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GraphMeta {
    pub orientation: String,
    pub preferred_max_nodes: usize,
    pub max_nodes: usize,
    pub warnings: Vec<ParseWarning>,
    /// Group name to sorted member ids. Groups opened but never joined
    /// map to an empty list.
    pub groups: BTreeMap<String, Vec<String>>,
    pub degrade: bool,
    pub overflow: bool,
}

/// A complete parse result: nodes in insertion order, edges in statement
/// order, plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    pub meta: GraphMeta,
}

impl FlowGraph {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|node| node.id == id)
    }

    /// Resolve a viewer search query: an exact id match or a substring of
    /// the display label. First match in node insertion order wins.
    #[must_use]
    pub fn find_node(&self, query: &str) -> Option<&FlowNode> {
        self.nodes
            .iter()
            .find(|node| node.id == query || node.label.contains(query))
    }
}

/// Stable machine-readable category of a fatal error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowMdErrorCode {
    Orientation,
    NodeLimit,
}

impl FlowMdErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Orientation => "flowmd/error/orientation",
            Self::NodeLimit => "flowmd/error/node-limit",
        }
    }
}

/// The only fatal error the engine produces. Everything else is a
/// [`ParseWarning`] inside a successful result.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum FlowMdError {
    #[error("FlowMD must start with graph/flowchart declaration (line {line})")]
    MissingOrientation { line: usize },
    #[error("Node count {count} exceeds hard limit {limit}")]
    NodeLimitExceeded { count: usize, limit: usize },
}

impl FlowMdError {
    #[must_use]
    pub const fn code(&self) -> FlowMdErrorCode {
        match self {
            Self::MissingOrientation { .. } => FlowMdErrorCode::Orientation,
            Self::NodeLimitExceeded { .. } => FlowMdErrorCode::NodeLimit,
        }
    }

    /// Source line the error points at, when it has one.
    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        match self {
            Self::MissingOrientation { line } => Some(*line),
            Self::NodeLimitExceeded { .. } => None,
        }
    }
}
