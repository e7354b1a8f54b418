//! Dependency graph between calculated members.
//!
//! Self reference is legal MDX when evaluation moves to another cell
//! (`([Measures].[Foo], [Time].PrevMember)` terminates at the first
//! period), so cycles found here only mark members; the evaluator decides
//! at run time whether a cell really recurses into itself.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use super::CalculatedMember;
use crate::mdx::{Identifier, Segment};

/// Whether `id` names the member with `unique_name` (`[Dim].[Name]`) or is
/// its bare `[Name]`.
pub fn refers_to(id: &Identifier, unique_name: &str, name: &str) -> bool {
    match id.segments.as_slice() {
        [Segment::Name { text, .. }] => text.eq_ignore_ascii_case(name),
        _ => quoted(id).eq_ignore_ascii_case(unique_name),
    }
}

/// `id` with every name segment bracketed, keys as written.
pub fn quoted(id: &Identifier) -> String {
    id.segments
        .iter()
        .map(|s| match s {
            Segment::Name { text, .. } => format!("[{text}]"),
            key => key.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Groups of calculated members that reference each other, including
/// members that reference themselves.
pub fn find_cycles(members: &[CalculatedMember]) -> Vec<Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..members.len()).map(|i| graph.add_node(i)).collect();

    for (from, member) in members.iter().enumerate() {
        for id in member.formula.identifiers() {
            for (to, target) in members.iter().enumerate() {
                if refers_to(id, &target.unique_name, &target.name) {
                    graph.update_edge(nodes[from], nodes[to], ());
                }
            }
        }
    }

    tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| {
            // A single node is only a cycle if it has a self-loop
            if scc.len() == 1 {
                graph.find_edge(scc[0], scc[0]).is_some()
            } else {
                true
            }
        })
        .map(|scc| {
            let mut members: Vec<usize> = scc
                .into_iter()
                .filter_map(|idx| graph.node_weight(idx).copied())
                .collect();
            members.sort_unstable();
            members
        })
        .collect()
}
