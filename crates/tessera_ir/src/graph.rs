//! Static dependency analysis of combinational logic.
//!
//! Builds a signal graph with an edge `a -> b` whenever a combinational
//! statement that drives `b` reads `a`, either in a value, a runtime address
//! or an enclosing switch condition. Strongly connected components of that
//! graph are candidate combinational loops. A cycle found here does not
//! guarantee the design oscillates; the settlement engine is the authority.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::arena::ArenaId;
use crate::fragment::{Driver, Fragment};
use crate::ids::SignalId;
use crate::stmt::Statement;

/// Builds the combinational read-to-drive graph. Node `i` is signal `i`.
pub fn comb_dependency_graph(fragment: &Fragment) -> DiGraph<SignalId, ()> {
    let mut graph = DiGraph::with_capacity(fragment.signals().len(), 0);
    for (id, _) in fragment.signals().iter() {
        graph.add_node(id);
    }
    let mut conditions = Vec::new();
    for stmt in fragment.comb_statements() {
        add_edges(&mut graph, stmt, &mut conditions);
    }
    graph
}

fn add_edges(graph: &mut DiGraph<SignalId, ()>, stmt: &Statement, conditions: &mut Vec<SignalId>) {
    let node = |id: SignalId| NodeIndex::new(id.index());
    match stmt {
        Statement::Assign { target, value } => {
            let mut reads = conditions.clone();
            target.for_each_read(&mut |id| reads.push(id));
            value.for_each_signal(&mut |id| reads.push(id));
            let mut driven = Vec::new();
            target.for_each_driven(&mut |id| driven.push(id));
            for dst in driven {
                for &src in &reads {
                    if graph.find_edge(node(src), node(dst)).is_none() {
                        graph.add_edge(node(src), node(dst), ());
                    }
                }
            }
        }
        Statement::Switch { test, cases } => {
            let depth = conditions.len();
            test.for_each_signal(&mut |id| conditions.push(id));
            for stmt in cases.iter().flat_map(|c| c.body.iter()) {
                add_edges(graph, stmt, conditions);
            }
            conditions.truncate(depth);
        }
        Statement::Sequence(stmts) => {
            for stmt in stmts {
                add_edges(graph, stmt, conditions);
            }
        }
    }
}

/// Groups of combinationally driven signals that depend on each other.
///
/// Each group is sorted by ID; groups are sorted by their first member.
pub fn combinational_cycles(fragment: &Fragment) -> Vec<Vec<SignalId>> {
    let graph = comb_dependency_graph(fragment);
    let mut cycles: Vec<Vec<SignalId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| match scc.as_slice() {
            [single] => graph.find_edge(*single, *single).is_some(),
            _ => true,
        })
        .map(|scc| {
            let mut ids: Vec<SignalId> = scc.into_iter().map(|n| graph[n]).collect();
            ids.sort_unstable();
            ids
        })
        .filter(|ids| {
            ids.iter()
                .all(|id| fragment.driver(*id) == Some(Driver::Comb))
        })
        .collect();
    cycles.sort();
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::fragment::FragmentBuilder;
    use crate::target::Target;
    use tessera_common::Shape;

    #[test]
    fn acyclic_design_has_no_cycles() {
        let mut b = FragmentBuilder::new();
        let a = b.signal("a", Shape::unsigned(4));
        let x = b.signal("x", Shape::unsigned(4));
        let y = b.signal("y", Shape::unsigned(4));
        b.comb(Statement::assign(x, Expr::from(a) + 1i64));
        b.comb(Statement::assign(y, Expr::from(x) + 1i64));
        let frag = b.build().unwrap();
        assert!(combinational_cycles(&frag).is_empty());
        let graph = comb_dependency_graph(&frag);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn finds_self_loop_and_ring() {
        let mut b = FragmentBuilder::new();
        let s = b.signal("s", Shape::unsigned(1));
        let p = b.signal("p", Shape::unsigned(1));
        let q = b.signal("q", Shape::unsigned(1));
        b.comb(Statement::assign(s, !Expr::from(s)));
        b.comb(Statement::assign(p, q));
        b.comb(Statement::assign(q, p));
        let frag = b.build().unwrap();
        assert_eq!(combinational_cycles(&frag), vec![vec![s], vec![p, q]]);
    }

    #[test]
    fn switch_conditions_count_as_reads() {
        let mut b = FragmentBuilder::new();
        let en = b.signal("en", Shape::unsigned(1));
        let y = b.signal("y", Shape::unsigned(1));
        b.comb(Statement::assign(en, y));
        b.comb(Statement::when(en, vec![Statement::assign(y, 1i64)]));
        let frag = b.build().unwrap();
        assert_eq!(combinational_cycles(&frag), vec![vec![en, y]]);
    }

    #[test]
    fn slice_writes_of_same_signal_form_a_loop() {
        let mut b = FragmentBuilder::new();
        let y = b.signal("y", Shape::unsigned(2));
        b.comb(Statement::assign(
            Target::from(y).bit(1),
            Expr::from(y).bit(0),
        ));
        let frag = b.build().unwrap();
        assert_eq!(combinational_cycles(&frag), vec![vec![y]]);
    }
}
