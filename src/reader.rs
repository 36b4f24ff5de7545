//! Tree reader: folds the flat rows of a tree query back into a nested
//! structure.
//!
//! Rows are processed deepest first, so by the time a branch row comes up all
//! of its children have been collected in a container registered under the
//! branch's `Lft`. The branch then moves that container into the one of its
//! own parent, found through `parent_lft`, or into the top level.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use seahash::SeaHasher;
use tracing::warn;

use crate::construct::{Container, DuplicateLabels, Folded, TreeKey, TreeRow};
use crate::error::{CanopyError, Result};

type LftHasher = BuildHasherDefault<SeaHasher>;

/// Depth descending, leaves before branches, label ascending (absent labels
/// first), then id.
pub fn fold_order(a: &TreeRow, b: &TreeRow) -> Ordering {
    b.depth
        .cmp(&a.depth)
        .then_with(|| a.is_branch.cmp(&b.is_branch))
        .then_with(|| a.label.cmp(&b.label))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_rows(rows: &mut [TreeRow]) {
    rows.sort_by(fold_order);
}

/// Folds rows sorted by [`fold_order`] into the nested tree.
pub fn fold(rows: &[TreeRow], duplicates: DuplicateLabels) -> Result<Container> {
    let mut top = Container::new();
    let mut pending: HashMap<i64, Container, LftHasher> = HashMap::default();
    for row in rows {
        let key = TreeKey::of(row.id, row.label.as_deref());
        match &row.value {
            Some(value) => {
                let target = match row.parent_lft {
                    Some(parent_lft) => pending.entry(parent_lft).or_default(),
                    None => &mut top,
                };
                place(target, key, Folded::Leaf(value.clone()), row, duplicates)?;
            }
            None => {
                // a branch whose children are all invalid at the instant
                // never got a container and vanishes
                let Some(children) = pending.remove(&row.lft) else {
                    continue;
                };
                let target = match row.parent_lft {
                    Some(parent_lft) => pending.entry(parent_lft).or_default(),
                    None => &mut top,
                };
                place(target, key, Folded::Branch(children), row, duplicates)?;
            }
        }
    }
    if !pending.is_empty() {
        warn!(orphans = pending.len(), "containers left without a parent row");
    }
    Ok(top)
}

fn place(
    target: &mut Container,
    key: TreeKey,
    entry: Folded,
    row: &TreeRow,
    duplicates: DuplicateLabels,
) -> Result<()> {
    if target.insert(key, entry).is_some() && duplicates == DuplicateLabels::Reject {
        let parent = match row.parent_lft {
            Some(parent_lft) => format!("the branch at lft {}", parent_lft),
            None => "the top level".to_string(),
        };
        return Err(CanopyError::DuplicateLabel {
            parent,
            label: row.label.clone().unwrap_or_default(),
        });
    }
    Ok(())
}
