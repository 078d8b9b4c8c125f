use fv_core::{DEFAULT_MAX_NODES, DEFAULT_PREFERRED_MAX_NODES, FlowGraph, FlowMdError};

use crate::graph_builder::GraphBuilder;

/// Edge separator tokens, in precedence order.
///
/// The list order is the precedence: the first token *contained anywhere
/// in the line* wins, regardless of where it occurs textually. Some
/// tokens are substrings of others (`-->` contains `--`), so the more
/// specific arrow must be listed before the plain line.
const EDGE_SEPARATORS: [&str; 6] = ["-->", "--", "==>", "==", "-.->", "===>"];

/// Node-count limits applied to a single parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Hard limit; exceeding it fails the parse outright.
    pub max_nodes: usize,
    /// Advisory limit; exceeding it sets `meta.degrade`.
    pub preferred_max_nodes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            preferred_max_nodes: DEFAULT_PREFERRED_MAX_NODES,
        }
    }
}

/// One side of an edge statement, or a whole bare-node statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeToken {
    pub(crate) id: String,
    pub(crate) label: Option<String>,
}

/// A classified content line (everything after the orientation line).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    SubgraphOpen { name: String },
    SubgraphEnd,
    Edge { left: NodeToken, right: NodeToken },
    Node(NodeToken),
    Unrecognised,
}

/// Parse a FlowMD document with the default limits.
///
/// # Errors
///
/// Fails when the first content line is not a `graph`/`flowchart`
/// declaration, or when the finished graph exceeds the hard node limit.
pub fn parse(input: &str) -> Result<FlowGraph, FlowMdError> {
    parse_with_limits(input, ParseLimits::default())
}

/// Parse a FlowMD document with explicit limits.
///
/// # Errors
///
/// Same conditions as [`parse`], with the hard limit taken from `limits`.
pub fn parse_with_limits(input: &str, limits: ParseLimits) -> Result<FlowGraph, FlowMdError> {
    let mut builder = GraphBuilder::new(limits);
    let mut orientation_parsed = false;

    for (index, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("%%") {
            continue;
        }
        let line_no = index + 1;

        if !orientation_parsed {
            let orientation = parse_orientation(line)
                .ok_or(FlowMdError::MissingOrientation { line: line_no })?;
            builder.set_orientation(orientation);
            orientation_parsed = true;
            continue;
        }

        match classify(line) {
            Statement::SubgraphOpen { name } => builder.open_group(&name, line_no),
            Statement::SubgraphEnd => builder.close_group(),
            Statement::Edge { left, right } => {
                builder.ensure_node(&left.id, left.label.as_deref(), line_no);
                builder.ensure_node(&right.id, right.label.as_deref(), line_no);
                builder.push_edge(left.id, right.id, line_no);
            }
            Statement::Node(token) => {
                builder.ensure_node(&token.id, token.label.as_deref(), line_no);
            }
            Statement::Unrecognised => builder.warn_unrecognised(line_no),
        }
    }

    builder.finish()
}

/// Match `graph|flowchart [DIRECTION]`; the direction defaults to `TB`
/// and is upper-cased. Extra tokens after the direction are ignored.
fn parse_orientation(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let keyword = parts.next()?;
    if !keyword.eq_ignore_ascii_case("graph") && !keyword.eq_ignore_ascii_case("flowchart") {
        return None;
    }
    Some(
        parts
            .next()
            .map_or_else(|| "TB".to_string(), str::to_ascii_uppercase),
    )
}

fn classify(line: &str) -> Statement {
    let lower = line.to_ascii_lowercase();

    if lower.starts_with("subgraph") {
        let name = line
            .splitn(2, char::is_whitespace)
            .nth(1)
            .unwrap_or("")
            .trim();
        return Statement::SubgraphOpen {
            name: name.to_string(),
        };
    }

    if lower == "end" {
        return Statement::SubgraphEnd;
    }

    if let Some((left, right)) = split_edge(line) {
        return Statement::Edge { left, right };
    }

    let token = extract_token(line);
    if !token.id.is_empty() && !token.id.contains(char::is_whitespace) {
        return Statement::Node(token);
    }

    Statement::Unrecognised
}

/// Split an edge statement at the first occurrence of the winning
/// separator. Returns `None` when no separator is present.
fn split_edge(line: &str) -> Option<(NodeToken, NodeToken)> {
    for separator in EDGE_SEPARATORS {
        if let Some((lhs, rhs)) = line.split_once(separator) {
            return Some((extract_token(lhs), extract_token(rhs)));
        }
    }
    None
}

/// Extract `id[label]` from a raw token. The label starts after the first
/// `[` and runs to the last `]` of the remainder, so it may itself
/// contain brackets. Empty labels are discarded.
fn extract_token(raw: &str) -> NodeToken {
    let token = raw.trim();
    if token.contains('[') && token.contains(']') {
        if let Some((id_part, rest)) = token.split_once('[') {
            let label_part = match rest.rfind(']') {
                Some(pos) => &rest[..pos],
                None => rest,
            };
            let label = label_part.trim();
            return NodeToken {
                id: id_part.trim().to_string(),
                label: (!label.is_empty()).then(|| label.to_string()),
            };
        }
    }
    NodeToken {
        id: token.to_string(),
        label: None,
    }
}
