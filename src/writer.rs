//! Tree writer: places nodes into the nested set.
//!
//! A node is always appended as the last child of its parent. The parent's
//! `Rgt` becomes the new node's `Lft`, and every boundary at or to the right
//! of it moves two steps to make room for the new `[Lft, Lft + 1]` pair. A
//! top-level node starts right after the largest `Rgt` of its scope.
//!
//! The functions here run against a connection that already holds the
//! store-wide write lock (an immediate transaction opened by the engine).

use rusqlite::Connection;
use tracing::debug;

use crate::construct::{DuplicateLabels, Key, NewBranch, Node, NodeId, Scope, ROOT};
use crate::datatype::{Instant, Scalar};
use crate::error::{CanopyError, Result};
use crate::persist;
use crate::validate;

pub fn insert_branch(
    connection: &Connection,
    data_set: i64,
    branch: &NewBranch,
    valid_from: Instant,
    duplicates: DuplicateLabels,
) -> Result<NodeId> {
    let tree_type = validate::positive(branch.tree_type, "tree_type_id")?;
    let parent = validate::non_negative(branch.parent, "parent_id")?;
    let depth = validate::non_negative(branch.depth, "depth")?;
    let named_parent = validate::non_negative(branch.named_parent, "named_parent_id")?;
    if let Some(unnamed_parent) = branch.unnamed_parent {
        validate::non_negative(unnamed_parent, "unnamed_parent_id")?;
    }
    let label = validate::label(branch.label.as_deref())?;
    if let Some(Scalar::PositiveInteger(n)) = &branch.value {
        validate::non_negative(*n, "value")?;
    }
    let scope = Scope { data_set, tree_type };

    let (within, lft) = if parent == ROOT {
        let lft = persist::max_rgt(connection, &scope)?.map_or(1, |rgt| rgt + 1);
        ((0, lft), lft)
    } else {
        let (parent_lft, parent_rgt) = persist::parent_bounds(connection, &scope, parent)?
            .ok_or_else(|| {
                CanopyError::NotFound(format!(
                    "parent_id ({}) does not exist in data set {} tree type {}",
                    parent, scope.data_set, scope.tree_type
                ))
            })?;
        // leaves are terminal
        if persist::has_value(connection, &scope, parent)? {
            return Err(CanopyError::Validation(format!(
                "parent_id ({}) is a leaf and cannot have children",
                parent
            )));
        }
        ((parent_lft, parent_rgt), parent_rgt)
    };

    if duplicates == DuplicateLabels::Reject {
        if let Some(label) = label {
            if persist::has_sibling_label(connection, &scope, within, label)? {
                return Err(CanopyError::DuplicateLabel {
                    parent: if parent == ROOT {
                        "the top level".to_string()
                    } else {
                        format!("parent {}", parent)
                    },
                    label: label.to_string(),
                });
            }
        }
    }

    if parent != ROOT {
        persist::open_gap(connection, &scope, lft)?;
    }

    let id = persist::add_node(
        connection,
        &scope,
        label,
        lft,
        depth,
        named_parent,
        branch.unnamed_parent,
    )?;
    if let Some(value) = &branch.value {
        persist::add_value(connection, &scope, id, value, valid_from)?;
    }
    debug!(id, tree_type, parent, lft, depth, leaf = branch.value.is_some(), "inserted node");
    Ok(id)
}

/// Walks `tree` depth first and inserts every entry, returning the number of
/// inserted nodes. The chain of ancestor ids is threaded through the walk.
pub fn insert_tree(
    connection: &Connection,
    data_set: i64,
    tree_type: i64,
    tree: &Node,
    valid_from: Instant,
    duplicates: DuplicateLabels,
) -> Result<usize> {
    let entries = match tree {
        Node::Branch(entries) => entries,
        Node::Leaf(_) => {
            return Err(CanopyError::Validation(
                "input must be a structured container".to_string(),
            ));
        }
    };
    let mut walk = Walk {
        connection,
        data_set,
        tree_type,
        valid_from,
        duplicates,
        inserted: 0,
    };
    let mut ancestors = Vec::new();
    walk.entries(entries, &mut ancestors)?;
    Ok(walk.inserted)
}

struct Walk<'c> {
    connection: &'c Connection,
    data_set: i64,
    tree_type: i64,
    valid_from: Instant,
    duplicates: DuplicateLabels,
    inserted: usize,
}

impl Walk<'_> {
    fn entries(&mut self, entries: &[(Key, Node)], ancestors: &mut Vec<NodeId>) -> Result<()> {
        let parent = ancestors.last().copied().unwrap_or(ROOT);
        let depth = ancestors.len() as i64;
        for (key, node) in entries {
            let label = match key {
                Key::Index(_) => None,
                Key::Name(name) => Some(name.clone()),
            };
            match node {
                Node::Branch(children) => {
                    let id = self.insert(NewBranch::under(self.tree_type, parent, depth, label, None))?;
                    ancestors.push(id);
                    self.entries(children, ancestors)?;
                    ancestors.pop();
                }
                Node::Leaf(raw) => {
                    let value = Scalar::classify(raw);
                    self.insert(NewBranch::under(self.tree_type, parent, depth, label, Some(value)))?;
                }
            }
        }
        Ok(())
    }
    fn insert(&mut self, branch: NewBranch) -> Result<NodeId> {
        let id = insert_branch(
            self.connection,
            self.data_set,
            &branch,
            self.valid_from,
            self.duplicates,
        )?;
        self.inserted += 1;
        Ok(id)
    }
}
