use fv_core::{FlowEdge, FlowNode};
use rustc_hash::{FxHashMap, FxHashSet};

/// Find simple cycles in the finished graph.
///
/// Depth-first traversal from every not-yet-visited node in insertion
/// order, with an explicit frame stack so inputs at the hard node limit
/// cannot overflow the call stack. Successor lists keep edge insertion
/// order (parallel edges collapse), which makes the reported cycles
/// deterministic.
///
/// Each cycle is the path slice from the first occurrence of the
/// revisited node through the current node, closed by repeating the
/// revisited node. Cycles are deduplicated by their literal path key
/// (`a->b->a`); the same rotation entered at a different node produces a
/// different key on purpose.
pub(crate) fn detect_cycles(nodes: &[FlowNode], edges: &[FlowEdge]) -> Vec<Vec<String>> {
    let index_by_id: FxHashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id.as_str(), index))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut seen_pairs: FxHashSet<(usize, usize)> = FxHashSet::default();
    for edge in edges {
        if let (Some(&source), Some(&target)) = (
            index_by_id.get(edge.source.as_str()),
            index_by_id.get(edge.target.as_str()),
        ) {
            if seen_pairs.insert((source, target)) {
                successors[source].push(target);
            }
        }
    }

    let mut visited = vec![false; nodes.len()];
    let mut on_stack = vec![false; nodes.len()];
    let mut path: Vec<usize> = Vec::new();
    // (node, next successor slot) frames emulating the recursion.
    let mut frames: Vec<(usize, usize)> = Vec::new();
    let mut seen_keys: FxHashSet<String> = FxHashSet::default();
    let mut cycles: Vec<Vec<String>> = Vec::new();

    for start in 0..nodes.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        on_stack[start] = true;
        path.push(start);
        frames.push((start, 0));

        while let Some(frame) = frames.last_mut() {
            let (node, cursor) = *frame;
            if cursor < successors[node].len() {
                frame.1 += 1;
                let successor = successors[node][cursor];
                if !visited[successor] {
                    visited[successor] = true;
                    on_stack[successor] = true;
                    path.push(successor);
                    frames.push((successor, 0));
                } else if on_stack[successor] {
                    if let Some(position) = path.iter().position(|&entry| entry == successor) {
                        let mut cycle: Vec<String> = path[position..]
                            .iter()
                            .map(|&entry| nodes[entry].id.clone())
                            .collect();
                        cycle.push(nodes[successor].id.clone());
                        let key = cycle.join("->");
                        if seen_keys.insert(key) {
                            cycles.push(cycle);
                        }
                    }
                }
            } else {
                frames.pop();
                on_stack[node] = false;
                path.pop();
            }
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> FlowNode {
        FlowNode {
            id: id.to_string(),
            label: id.to_string(),
            line: 1,
            group: None,
        }
    }

    fn edge(source: &str, target: &str) -> FlowEdge {
        FlowEdge {
            source: source.to_string(),
            target: target.to_string(),
            line: 1,
        }
    }

    #[test]
    fn acyclic_graph_reports_nothing() {
        let nodes = [node("A"), node("B"), node("C")];
        let edges = [edge("A", "B"), edge("B", "C"), edge("A", "C")];
        assert!(detect_cycles(&nodes, &edges).is_empty());
    }

    #[test]
    fn two_node_cycle_is_closed_at_its_entry() {
        let nodes = [node("A"), node("B")];
        let edges = [edge("A", "B"), edge("B", "A")];
        let cycles = detect_cycles(&nodes, &edges);
        assert_eq!(cycles, vec![vec!["A", "B", "A"]]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let nodes = [node("A")];
        let edges = [edge("A", "A")];
        let cycles = detect_cycles(&nodes, &edges);
        assert_eq!(cycles, vec![vec!["A", "A"]]);
    }

    #[test]
    fn parallel_edges_report_one_cycle() {
        let nodes = [node("A"), node("B")];
        let edges = [edge("A", "B"), edge("A", "B"), edge("B", "A")];
        assert_eq!(detect_cycles(&nodes, &edges).len(), 1);
    }

    #[test]
    fn disjoint_cycles_are_all_found() {
        let nodes = [node("A"), node("B"), node("C"), node("D")];
        let edges = [
            edge("A", "B"),
            edge("B", "A"),
            edge("C", "D"),
            edge("D", "C"),
        ];
        let cycles = detect_cycles(&nodes, &edges);
        assert_eq!(cycles, vec![vec!["A", "B", "A"], vec!["C", "D", "C"]]);
    }

    #[test]
    fn entry_point_determines_the_path_key() {
        // D precedes the cycle in insertion order, so traversal enters at
        // B and the reported rotation starts there — literal keys are not
        // canonicalized.
        let nodes = [node("D"), node("A"), node("B"), node("C")];
        let edges = [
            edge("D", "B"),
            edge("A", "B"),
            edge("B", "C"),
            edge("C", "A"),
        ];
        let cycles = detect_cycles(&nodes, &edges);
        assert_eq!(cycles, vec![vec!["B", "C", "A", "B"]]);
    }

    #[test]
    fn shared_tail_does_not_duplicate_cycles() {
        let nodes = [node("A"), node("B"), node("C")];
        let edges = [
            edge("A", "B"),
            edge("B", "A"),
            edge("C", "B"),
        ];
        let cycles = detect_cycles(&nodes, &edges);
        assert_eq!(cycles, vec![vec!["A", "B", "A"]]);
    }

    #[test]
    fn overlapping_cycles_get_distinct_keys() {
        let nodes = [node("A"), node("B"), node("C")];
        let edges = [
            edge("A", "B"),
            edge("B", "C"),
            edge("C", "A"),
            edge("C", "B"),
        ];
        let cycles = detect_cycles(&nodes, &edges);
        assert_eq!(cycles, vec![vec!["A", "B", "C", "A"], vec!["B", "C", "B"]]);
    }
}
