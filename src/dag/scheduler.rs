// src/dag/scheduler.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::dag::graph::DagGraph;
use crate::errors::{HtgError, Result};
use crate::metagraph::Metagraph;

/// Compute the order in which the subgraphs of `mg` are submitted.
///
/// Every subgraph appears exactly once, and for every relation `(p, c)` the
/// parent `p` comes before the child `c`. Among subgraphs that are ready at
/// the same time, the one declared first in the metagraph wins, so the
/// result is reproducible for a given metagraph. Subgraphs without relations
/// are ready from the start and land in declaration order among the roots.
///
/// Fails with [`HtgError::UnknownSubgraphReference`] if a relation names an
/// undeclared subgraph, and with [`HtgError::CyclicDependency`] if the
/// relations contain a cycle.
pub fn schedule(mg: &Metagraph) -> Result<Vec<String>> {
    let graph = DagGraph::from_metagraph(mg)?;

    let mut remaining_deps: HashMap<&str, usize> = graph
        .subgraphs()
        .map(|name| (name, graph.dependencies_of(name).len()))
        .collect();

    // Min-heap on declaration index.
    let mut ready: BinaryHeap<Reverse<usize>> = mg
        .subgraphs()
        .iter()
        .enumerate()
        .filter(|(_, sg)| graph.dependencies_of(&sg.name).is_empty())
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(Reverse(idx)) = ready.pop() {
        let name = mg.subgraphs()[idx].name.as_str();
        order.push(name.to_string());

        for child in graph.dependents_of(name) {
            let Some(left) = remaining_deps.get_mut(child.as_str()) else {
                continue;
            };
            *left -= 1;
            if *left == 0 {
                if let Some(pos) = mg.position_of(child) {
                    ready.push(Reverse(pos));
                }
            }
        }
    }

    if order.len() < graph.len() {
        let members = cycle_members(mg);
        debug!(?members, scheduled = ?order, "scheduler: relation graph has a cycle");
        return Err(HtgError::CyclicDependency { members });
    }

    info!(htg = %mg.name(), schedule = ?order, "scheduled subgraph order");
    Ok(order)
}

/// Names of subgraphs that sit on a cycle, in declaration order.
fn cycle_members(mg: &Metagraph) -> Vec<String> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for sg in mg.subgraphs() {
        graph.add_node(sg.name.as_str());
    }
    for rel in mg.relations() {
        graph.add_edge(rel.parent.as_str(), rel.child.as_str(), ());
    }

    let mut members: Vec<&str> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .collect();

    members.sort_by_key(|name| mg.position_of(name));
    members.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metagraph::{Relation, SubGraph};

    fn metagraph(names: &[&str], relations: &[(&str, &str)]) -> Metagraph {
        Metagraph::new(
            "test-htg",
            names
                .iter()
                .map(|n| SubGraph::new(*n, 1.0, 256, 1, 1))
                .collect(),
            relations
                .iter()
                .map(|(p, c)| Relation::new(*p, *c))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn single_relation_is_parent_then_child() {
        let mg = metagraph(&["G1", "G2"], &[("G1", "G2")]);
        assert_eq!(schedule(&mg).unwrap(), vec!["G1", "G2"]);
    }

    #[test]
    fn chain_declared_backwards_is_still_ordered() {
        let mg = metagraph(&["C", "B", "A"], &[("A", "B"), ("B", "C")]);
        assert_eq!(schedule(&mg).unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn every_relation_is_honoured_not_just_the_first() {
        let mg = metagraph(
            &["A", "B", "C", "D"],
            &[("A", "B"), ("C", "D"), ("B", "D")],
        );
        let order = schedule(&mg).unwrap();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn fan_in_uses_declaration_order_for_ties() {
        let mg = metagraph(&["B", "A", "C"], &[("A", "C"), ("B", "C")]);
        assert_eq!(schedule(&mg).unwrap(), vec!["B", "A", "C"]);
    }

    #[test]
    fn isolated_subgraphs_are_scheduled() {
        let mg = metagraph(&["X", "A", "B"], &[("A", "B")]);
        assert_eq!(schedule(&mg).unwrap(), vec!["X", "A", "B"]);
    }

    #[test]
    fn duplicate_relations_do_not_stall_the_child() {
        let mg = metagraph(&["A", "B"], &[("A", "B"), ("A", "B")]);
        assert_eq!(schedule(&mg).unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let mg = metagraph(&["A", "B"], &[("A", "B"), ("B", "A")]);
        match schedule(&mg) {
            Err(HtgError::CyclicDependency { members }) => {
                assert_eq!(members, vec!["A", "B"]);
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mg = metagraph(&["A", "B"], &[("A", "A")]);
        match schedule(&mg) {
            Err(HtgError::CyclicDependency { members }) => assert_eq!(members, vec!["A"]),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn cycle_downstream_of_a_root_reports_only_the_cycle() {
        let mg = metagraph(
            &["root", "X", "Y"],
            &[("root", "X"), ("X", "Y"), ("Y", "X")],
        );
        match schedule(&mg) {
            Err(HtgError::CyclicDependency { members }) => assert_eq!(members, vec!["X", "Y"]),
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mg = metagraph(&["A"], &[("A", "Ghost")]);
        match schedule(&mg) {
            Err(HtgError::UnknownSubgraphReference { missing, .. }) => {
                assert_eq!(missing, "Ghost");
            }
            other => panic!("expected UnknownSubgraphReference, got {other:?}"),
        }
    }

    #[test]
    fn empty_metagraph_schedules_nothing() {
        let mg = metagraph(&[], &[]);
        assert!(schedule(&mg).unwrap().is_empty());
    }
}
