// maps keep sorted keys so reconstructed trees compare and print deterministically
use std::collections::BTreeMap;

// used to print out readable forms of a construct
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

// our own stuff that we need
use crate::datatype::Scalar;
use crate::validate;

// ------------- Identities -------------
pub type NodeId = i64;
pub type DataSetId = i64;
pub type TreeTypeId = i64;

/// Parent reference of a top-level node.
pub const ROOT: NodeId = 0;

/// Every node and value row lives in exactly one (data set, tree type) scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Scope {
    pub data_set: DataSetId,
    pub tree_type: TreeTypeId,
}

// ------------- Input -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// Array position, stored as a branch without label.
    Index(u64),
    /// Map key, stored as the label of the branch.
    Name(String),
}
impl Key {
    /// Digit-only keys are positions, everything else is a name.
    pub fn from_text(text: &str) -> Key {
        if validate::is_digits(text) {
            if let Ok(index) = text.parse::<u64>() {
                return Key::Index(index);
            }
        }
        Key::Name(text.to_string())
    }
}
impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Key::from_text(text)
    }
}
impl From<u64> for Key {
    fn from(index: u64) -> Self {
        Key::Index(index)
    }
}

/// A nested structure to be stored: ordered entries of branches that end in
/// raw scalar text. The writer decides the stored kind of every leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Branch(Vec<(Key, Node)>),
    Leaf(String),
}
impl Node {
    pub fn branch<K: Into<Key>>(entries: impl IntoIterator<Item = (K, Node)>) -> Node {
        Node::Branch(entries.into_iter().map(|(k, n)| (k.into(), n)).collect())
    }
    pub fn leaf(text: impl Into<String>) -> Node {
        Node::Leaf(text.into())
    }
    /// Objects become named entries, arrays positional ones. Numbers and
    /// booleans are kept by their JSON text and `null` becomes empty text.
    pub fn from_json(value: &serde_json::Value) -> Node {
        use serde_json::Value;
        match value {
            Value::Object(map) => Node::Branch(
                map.iter()
                    .map(|(k, v)| (Key::from_text(k), Node::from_json(v)))
                    .collect(),
            ),
            Value::Array(items) => Node::Branch(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (Key::Index(i as u64), Node::from_json(v)))
                    .collect(),
            ),
            Value::String(s) => Node::Leaf(s.clone()),
            Value::Null => Node::Leaf(String::new()),
            other => Node::Leaf(other.to_string()),
        }
    }
}

/// Everything needed to place one node: the structural position plus an
/// optional leaf value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBranch {
    pub tree_type: TreeTypeId,
    pub parent: NodeId,
    pub label: Option<String>,
    pub depth: i64,
    pub named_parent: NodeId,
    pub unnamed_parent: Option<NodeId>,
    pub value: Option<Scalar>,
}
impl NewBranch {
    /// A node whose named and unnamed parents are both its structural parent,
    /// as produced when walking a nested structure.
    pub fn under(
        tree_type: TreeTypeId,
        parent: NodeId,
        depth: i64,
        label: Option<String>,
        value: Option<Scalar>,
    ) -> Self {
        Self {
            tree_type,
            parent,
            label,
            depth,
            named_parent: parent,
            unnamed_parent: Some(parent),
            value,
        }
    }
}

// ------------- Stored nodes -------------
/// Structural part of a stored node, as read back for verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub label: Option<String>,
    pub lft: i64,
    pub rgt: i64,
    pub depth: i64,
}

/// One row of the flattened tree query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeRow {
    pub id: NodeId,
    pub label: Option<String>,
    pub value: Option<Scalar>,
    pub parent_lft: Option<i64>,
    pub lft: i64,
    pub rgt: i64,
    pub depth: i64,
    pub is_branch: bool,
}

// ------------- Output -------------
/// Key of a reconstructed entry: the label, or the node id for positional
/// entries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TreeKey {
    Id(NodeId),
    Label(String),
}
impl TreeKey {
    pub fn of(id: NodeId, label: Option<&str>) -> Self {
        match label {
            Some(l) => TreeKey::Label(l.to_string()),
            None => TreeKey::Id(id),
        }
    }
}
impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TreeKey::Id(id) => write!(f, "{}", id),
            TreeKey::Label(l) => f.write_str(l),
        }
    }
}
impl Serialize for TreeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TreeKey::Id(id) => serializer.serialize_i64(*id),
            TreeKey::Label(l) => serializer.serialize_str(l),
        }
    }
}

pub type Container = BTreeMap<TreeKey, Folded>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Folded {
    Leaf(Scalar),
    Branch(Container),
}

/// Result of a tree read: the flat rows for display and the nested tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    pub rows: Vec<TreeRow>,
    pub tree: Container,
}

/// What to do when two siblings carry the same label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateLabels {
    /// Accept duplicates; the later entry wins when a tree is read.
    #[default]
    Overwrite,
    /// Refuse to insert a duplicate and fail a read that meets one.
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_from_text() {
        assert_eq!(Key::from_text("12"), Key::Index(12));
        assert_eq!(Key::from_text("a12"), Key::Name("a12".into()));
        assert_eq!(Key::from_text(""), Key::Name("".into()));
    }

    #[test]
    fn json_becomes_tagged_nodes() {
        let node = Node::from_json(&json!({"a": {"b": 1, "c": "x"}, "l": [true, null]}));
        let expected = Node::branch([
            (
                "a",
                Node::branch([("b", Node::leaf("1")), ("c", Node::leaf("x"))]),
            ),
            (
                "l",
                Node::branch([(0u64, Node::leaf("true")), (1u64, Node::leaf(""))]),
            ),
        ]);
        assert_eq!(node, expected);
    }

    #[test]
    fn tree_serializes_to_json() {
        let mut inner = Container::new();
        inner.insert(TreeKey::Label("b".into()), Folded::Leaf(Scalar::PositiveInteger(1)));
        inner.insert(TreeKey::Id(7), Folded::Leaf(Scalar::Text("x".into())));
        let mut tree = Container::new();
        tree.insert(TreeKey::Label("a".into()), Folded::Branch(inner));
        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(value, json!({"a": {"b": 1, "7": "x"}}));
    }
}
