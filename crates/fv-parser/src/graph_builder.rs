use std::collections::BTreeMap;

use fv_core::{FlowEdge, FlowGraph, FlowMdError, FlowNode, GraphMeta, ParseWarning};
use rustc_hash::FxHashMap;

use crate::cycle_detect::detect_cycles;
use crate::flowmd_parser::ParseLimits;

/// Incremental owner of the node table, edge list, and group table while
/// a document is consumed statement by statement.
pub(crate) struct GraphBuilder {
    limits: ParseLimits,
    orientation: String,
    nodes: Vec<FlowNode>,
    index_by_id: FxHashMap<String, usize>,
    edges: Vec<FlowEdge>,
    /// Group names in registration order; membership is derived from the
    /// nodes at finish time.
    group_order: Vec<String>,
    current_group: Option<String>,
    warnings: Vec<ParseWarning>,
}

impl GraphBuilder {
    pub(crate) fn new(limits: ParseLimits) -> Self {
        Self {
            limits,
            orientation: "TB".to_string(),
            nodes: Vec::new(),
            index_by_id: FxHashMap::default(),
            edges: Vec::new(),
            group_order: Vec::new(),
            current_group: None,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn set_orientation(&mut self, orientation: String) {
        self.orientation = orientation;
    }

    /// Open a subgraph. An empty name warns and clears the active group;
    /// a non-empty name registers the group and replaces the active one
    /// (there is no nesting stack).
    pub(crate) fn open_group(&mut self, name: &str, line: usize) {
        if name.is_empty() {
            self.warnings
                .push(ParseWarning::at_line(line, "Empty subgraph name"));
            self.current_group = None;
        } else {
            if !self.group_order.iter().any(|existing| existing == name) {
                self.group_order.push(name.to_string());
            }
            self.current_group = Some(name.to_string());
        }
    }

    /// `end` clears the active group unconditionally, whatever the
    /// nesting depth of the input looked like.
    pub(crate) fn close_group(&mut self) {
        self.current_group = None;
    }

    pub(crate) fn warn_unrecognised(&mut self, line: usize) {
        self.warnings
            .push(ParseWarning::at_line(line, "Unrecognised statement"));
    }

    /// Intern a node by id. First mention fixes the id and line; a node
    /// without a group adopts the active one; a non-empty label always
    /// replaces the current one.
    pub(crate) fn ensure_node(&mut self, id: &str, label: Option<&str>, line: usize) {
        let index = match self.index_by_id.get(id) {
            Some(&index) => {
                let node = &mut self.nodes[index];
                if node.group.is_none() {
                    node.group = self.current_group.clone();
                }
                index
            }
            None => {
                let index = self.nodes.len();
                self.nodes.push(FlowNode {
                    id: id.to_string(),
                    label: id.to_string(),
                    line,
                    group: self.current_group.clone(),
                });
                self.index_by_id.insert(id.to_string(), index);
                index
            }
        };

        if let Some(label) = label {
            if !label.is_empty() {
                self.nodes[index].label = label.to_string();
            }
        }
    }

    pub(crate) fn push_edge(&mut self, source: String, target: String, line: usize) {
        self.edges.push(FlowEdge {
            source,
            target,
            line,
        });
    }

    /// Finish the parse: enforce the hard limit, run cycle detection,
    /// derive group membership, and assemble the result.
    pub(crate) fn finish(self) -> Result<FlowGraph, FlowMdError> {
        if self.nodes.len() > self.limits.max_nodes {
            return Err(FlowMdError::NodeLimitExceeded {
                count: self.nodes.len(),
                limit: self.limits.max_nodes,
            });
        }

        let mut warnings = self.warnings;
        for cycle in detect_cycles(&self.nodes, &self.edges) {
            let message = format!("Cycle detected: {}", cycle.join(" -> "));
            warnings.push(ParseWarning::cycle(message, cycle));
        }

        let mut groups: BTreeMap<String, Vec<String>> = self
            .group_order
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for node in &self.nodes {
            if let Some(group) = &node.group {
                if let Some(members) = groups.get_mut(group) {
                    members.push(node.id.clone());
                }
            }
        }
        for members in groups.values_mut() {
            members.sort_unstable();
        }

        let degrade = self.nodes.len() > self.limits.preferred_max_nodes;

        Ok(FlowGraph {
            nodes: self.nodes,
            edges: self.edges,
            meta: GraphMeta {
                orientation: self.orientation,
                preferred_max_nodes: self.limits.preferred_max_nodes,
                max_nodes: self.limits.max_nodes,
                warnings,
                groups,
                degrade,
                overflow: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mention_wins_for_id_and_line() {
        let mut builder = GraphBuilder::new(ParseLimits::default());
        builder.ensure_node("A", None, 2);
        builder.ensure_node("A", Some("Renamed"), 7);
        let graph = builder.finish().expect("finish");
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.nodes[0].line, 2);
        assert_eq!(graph.nodes[0].label, "Renamed");
    }

    #[test]
    fn groups_without_members_survive_to_meta() {
        let mut builder = GraphBuilder::new(ParseLimits::default());
        builder.open_group("Lonely", 2);
        builder.close_group();
        builder.ensure_node("outside", None, 4);
        let graph = builder.finish().expect("finish");
        assert_eq!(graph.meta.groups["Lonely"], Vec::<String>::new());
    }

    #[test]
    fn member_lists_are_sorted() {
        let mut builder = GraphBuilder::new(ParseLimits::default());
        builder.open_group("G", 2);
        builder.ensure_node("zeta", None, 3);
        builder.ensure_node("alpha", None, 4);
        let graph = builder.finish().expect("finish");
        assert_eq!(
            graph.meta.groups["G"],
            vec!["alpha".to_string(), "zeta".to_string()]
        );
    }
}
