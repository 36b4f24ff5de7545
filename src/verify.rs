//! Consistency checks over a stored scope. The writer keeps these invariants
//! on its own; the checks exist to audit a store that other tools may have
//! touched, and to back the property tests.

use std::collections::HashSet;

use crate::construct::{NodeId, NodeRecord};
use crate::datatype::Instant;
use crate::error::{CanopyError, Result};

/// Checks the nested-set invariants of `nodes`, which must be ordered by `lft`:
/// ordered intervals, strict containment or disjointness, stored depth equal
/// to the number of containing nodes, and boundaries forming exactly `1..=2n`.
pub fn intervals(nodes: &[NodeRecord]) -> Result<()> {
    let mut boundaries = HashSet::with_capacity(nodes.len() * 2);
    let mut open: Vec<&NodeRecord> = Vec::new();
    for node in nodes {
        if node.lft >= node.rgt {
            return Err(violation(format!(
                "node {} has lft {} not below rgt {}",
                node.id, node.lft, node.rgt
            )));
        }
        for boundary in [node.lft, node.rgt] {
            if !boundaries.insert(boundary) {
                return Err(violation(format!(
                    "boundary {} of node {} is used twice",
                    boundary, node.id
                )));
            }
        }
        while open.last().is_some_and(|top| top.rgt < node.lft) {
            open.pop();
        }
        if let Some(top) = open.last() {
            if node.rgt >= top.rgt {
                return Err(violation(format!(
                    "node {} [{}, {}] overlaps node {} [{}, {}]",
                    node.id, node.lft, node.rgt, top.id, top.lft, top.rgt
                )));
            }
        }
        if node.depth != open.len() as i64 {
            return Err(violation(format!(
                "node {} has depth {} but {} containing nodes",
                node.id,
                node.depth,
                open.len()
            )));
        }
        open.push(node);
    }
    let expected = nodes.len() as i64 * 2;
    if let Some(outside) = boundaries.iter().find(|b| **b < 1 || **b > expected) {
        return Err(violation(format!(
            "boundary {} lies outside 1..={}",
            outside, expected
        )));
    }
    Ok(())
}

/// Checks that the validity intervals of every node are ordered and do not
/// overlap. `values` must be ordered by node and then by `valid_from`.
pub fn value_intervals(values: &[(NodeId, Instant, Instant)]) -> Result<()> {
    for (node, from, to) in values {
        if from >= to {
            return Err(violation(format!(
                "value of node {} is valid from {} to {}",
                node, from, to
            )));
        }
    }
    for pair in values.windows(2) {
        let (node, _, to) = pair[0];
        let (next_node, next_from, _) = pair[1];
        if node == next_node && next_from < to {
            return Err(violation(format!(
                "values of node {} overlap at {}",
                node, next_from
            )));
        }
    }
    Ok(())
}

fn violation(message: String) -> CanopyError {
    CanopyError::Invariant(message)
}
