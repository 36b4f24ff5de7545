//! Canopy – nested key/value structures stored as nested-set trees in SQLite.
//!
//! A structure such as `{"a": {"b": 1, "c": "x"}}` is flattened into rows of a
//! `Node` table, each carrying a pair of boundaries (`lft`, `rgt`) such that a
//! node contains another exactly when its interval contains the other's:
//! * A named entry becomes a node with a label, a positional entry a node
//!   without one.
//! * A leaf additionally gets a row in `NodeValue`, typed as text or as a
//!   positive integer, valid over `[valid_from, valid_to)`.
//!
//! Reading a tree is a single query that joins every node to its ancestors
//! and to the value valid at the query instant. The rows are then folded back
//! into nested containers, deepest first.
//!
//! ## Modules
//! * [`construct`] – identities, the tagged input [`construct::Node`], rows and
//!   the reconstructed tree.
//! * [`datatype`] – instants and typed leaf values.
//! * [`persist`] – SQLite schema and every statement the engine runs.
//! * [`writer`] – the insertion algorithm.
//! * [`reader`] – ordering and folding of tree rows.
//! * [`verify`] – invariant checks over a stored tree.
//! * [`engine`] – [`engine::Engine`], which ties the above to one connection.
//! * [`render`] – HTML table of tree rows.
//! * [`settings`] and [`server`] – configuration and the HTTP surface.
//!
//! ## Quick Start
//! ```
//! use canopy::construct::Node;
//! use canopy::engine::Engine;
//! use canopy::persist::{PersistenceMode, Persistor};
//! let persistor = Persistor::new(&PersistenceMode::InMemory).unwrap();
//! let mut engine = Engine::configure(persistor, 1, 1_000).unwrap();
//! let document = serde_json::json!({"a": {"b": 1, "c": "x"}});
//! engine.insert_tree(1, &Node::from_json(&document)).unwrap();
//! let snapshot = engine.get_tree(1).unwrap();
//! assert_eq!(serde_json::to_value(&snapshot.tree).unwrap(), document);
//! ```

pub mod construct;
pub mod datatype;
pub mod engine;
pub mod error;
pub mod persist;
pub mod reader;
pub mod render;
pub mod server;
pub mod settings;
pub mod validate;
pub mod verify;
pub mod writer;

pub use error::{CanopyError, Result};
