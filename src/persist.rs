// used for persistence
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::time::Duration;
use tracing::debug;

use crate::construct::{NodeId, NodeRecord, Scope, TreeRow};
use crate::datatype::{Instant, Scalar, END_OF_TIME};
use crate::error::{CanopyError, Result};

/// Wait applied until [`Persistor::with_busy_timeout`] says otherwise.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}
impl PersistenceMode {
    /// `:memory:` selects an in-memory database, anything else is a path.
    pub fn from_location(location: &str) -> Self {
        if location == ":memory:" {
            PersistenceMode::InMemory
        } else {
            PersistenceMode::File(location.to_string())
        }
    }
}

// ------------- Persistence -------------
/// Owns the one connection of an engine. The connection is closed when the
/// persistor is dropped.
pub struct Persistor {
    connection: Connection,
}
impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory(),
            PersistenceMode::File(path) => Connection::open(path),
        }
        .map_err(|e| CanopyError::Connection(format!("{:?}: {}", mode, e)))?;
        connection.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        let persistor = Persistor { connection };
        persistor.create_schema()?;
        Ok(persistor)
    }
    /// How long a writer waits for the store-wide write lock held by another
    /// connection before failing with a store error.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self> {
        self.connection.busy_timeout(timeout)?;
        Ok(self)
    }
    fn create_schema(&self) -> Result<()> {
        // Lft < Rgt holds row by row during shifts because Rgt is always
        // shifted before Lft.
        self.connection.execute_batch(
            "
            create table if not exists Node (
                Node_Identity integer not null primary key autoincrement,
                DataSet_Identity integer not null,
                TreeType_Identity integer not null,
                Label text null,
                Lft integer not null,
                Rgt integer not null,
                Depth integer not null,
                NamedParent_Identity integer not null,
                UnnamedParent_Identity integer null,
                constraint interval_is_ordered check (
                    Lft < Rgt
                )
            );
            create index if not exists Node_by_Scope on Node (
                DataSet_Identity,
                TreeType_Identity,
                Lft
            );
            create index if not exists Node_by_Label on Node (
                DataSet_Identity,
                TreeType_Identity,
                Label
            );
            create table if not exists NodeValue (
                DataSet_Identity integer not null,
                Node_Identity integer not null,
                TextValue text null,
                IntValue integer null,
                ValidFrom integer not null,
                ValidTo integer not null,
                constraint NodeValue_of_Node foreign key (
                    Node_Identity
                ) references Node(Node_Identity),
                constraint exactly_one_slot check (
                    (TextValue is null) <> (IntValue is null)
                ),
                constraint non_negative_IntValue check (
                    IntValue is null or IntValue >= 0
                ),
                constraint interval_is_ordered check (
                    ValidFrom < ValidTo
                )
            );
            create index if not exists NodeValue_by_Node on NodeValue (
                Node_Identity,
                ValidFrom
            );
            ",
        )?;
        Ok(())
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
    /// Begins a write transaction holding SQLite's database-wide write lock,
    /// which covers both the node and the value table until commit or drop.
    pub fn begin_exclusive(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

// ------------- Writes -------------
pub fn max_rgt(connection: &Connection, scope: &Scope) -> Result<Option<i64>> {
    let max = connection
        .prepare_cached(
            "
            select max(Rgt)
                from Node
                where DataSet_Identity = ?
                and TreeType_Identity = ?
        ",
        )?
        .query_row(params![scope.data_set, scope.tree_type], |r| r.get(0))?;
    Ok(max)
}

/// `(Lft, Rgt)` of `parent` when it exists in the scope.
pub fn parent_bounds(
    connection: &Connection,
    scope: &Scope,
    parent: NodeId,
) -> Result<Option<(i64, i64)>> {
    let bounds = connection
        .prepare_cached(
            "
            select Lft, Rgt
                from Node
                where Node_Identity = ?
                and DataSet_Identity = ?
                and TreeType_Identity = ?
        ",
        )?
        .query_row(params![parent, scope.data_set, scope.tree_type], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .optional()?;
    Ok(bounds)
}

/// Whether `node` carries a value row at any instant, which makes it a leaf.
pub fn has_value(connection: &Connection, scope: &Scope, node: NodeId) -> Result<bool> {
    let found = connection
        .prepare_cached(
            "
            select 1
                from NodeValue
                where Node_Identity = ?
                and DataSet_Identity = ?
                limit 1
        ",
        )?
        .query_row(params![node, scope.data_set], |r| r.get::<_, i64>(0))
        .optional()?;
    Ok(found.is_some())
}

/// Opens a gap of two boundaries at `at`, returning the number of shifted
/// (rgt, lft) boundaries.
pub fn open_gap(connection: &Connection, scope: &Scope, at: i64) -> Result<(usize, usize)> {
    let shifted_rgt = connection
        .prepare_cached(
            "
            update Node
                set Rgt = Rgt + 2
                where Rgt >= ?
                and DataSet_Identity = ?
                and TreeType_Identity = ?
        ",
        )?
        .execute(params![at, scope.data_set, scope.tree_type])?;
    let shifted_lft = connection
        .prepare_cached(
            "
            update Node
                set Lft = Lft + 2
                where Lft >= ?
                and DataSet_Identity = ?
                and TreeType_Identity = ?
        ",
        )?
        .execute(params![at, scope.data_set, scope.tree_type])?;
    debug!(at, shifted_rgt, shifted_lft, "opened gap");
    Ok((shifted_rgt, shifted_lft))
}

/// Whether a direct child of the node spanning `within` already carries
/// `label`. A direct child is contained in `within` with no other node of the
/// scope in between. The top level passes bounds that enclose the whole scope.
pub fn has_sibling_label(
    connection: &Connection,
    scope: &Scope,
    within: (i64, i64),
    label: &str,
) -> Result<bool> {
    let found = connection
        .prepare_cached(
            "
            select 1
                from Node n
                where n.DataSet_Identity = ?1
                and n.TreeType_Identity = ?2
                and n.Label = ?3
                and n.Lft > ?4
                and n.Rgt < ?5
                and not exists (
                    select 1
                        from Node m
                        where m.DataSet_Identity = n.DataSet_Identity
                        and m.TreeType_Identity = n.TreeType_Identity
                        and m.Lft > ?4
                        and m.Lft < n.Lft
                        and n.Rgt < m.Rgt
                )
                limit 1
        ",
        )?
        .query_row(
            params![scope.data_set, scope.tree_type, label, within.0, within.1],
            |r| r.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn add_node(
    connection: &Connection,
    scope: &Scope,
    label: Option<&str>,
    lft: i64,
    depth: i64,
    named_parent: NodeId,
    unnamed_parent: Option<NodeId>,
) -> Result<NodeId> {
    connection
        .prepare_cached(
            "
            insert into Node (
                DataSet_Identity,
                TreeType_Identity,
                Label,
                Lft,
                Rgt,
                Depth,
                NamedParent_Identity,
                UnnamedParent_Identity
            ) values (?, ?, ?, ?, ?, ?, ?, ?)
        ",
        )?
        .execute(params![
            scope.data_set,
            scope.tree_type,
            label,
            lft,
            lft + 1,
            depth,
            named_parent,
            unnamed_parent
        ])?;
    Ok(connection.last_insert_rowid())
}

pub fn add_value(
    connection: &Connection,
    scope: &Scope,
    node: NodeId,
    value: &Scalar,
    valid_from: Instant,
) -> Result<()> {
    connection
        .prepare_cached(
            "
            insert into NodeValue (
                DataSet_Identity,
                Node_Identity,
                TextValue,
                IntValue,
                ValidFrom,
                ValidTo
            ) values (?, ?, ?, ?, ?, ?)
        ",
        )?
        .execute(params![
            scope.data_set,
            node,
            value.text_slot(),
            value.int_slot(),
            valid_from,
            END_OF_TIME
        ])?;
    Ok(())
}

// ------------- Reads -------------
/// Every node of the scope with its ancestor count, the `Lft` of its nearest
/// ancestor and the value valid at `instant`. Branches without children and
/// without a value are left out.
pub fn tree_rows(connection: &Connection, scope: &Scope, instant: Instant) -> Result<Vec<TreeRow>> {
    let mut statement = connection.prepare_cached(
        "
        select node.Node_Identity,
                node.Label,
                v.TextValue,
                v.IntValue,
                max(parent.Lft) as ParentLft,
                node.Lft,
                node.Rgt,
                count(parent.Node_Identity) as Depth
            from Node node
            left join Node parent
            on parent.Lft < node.Lft
            and node.Lft < parent.Rgt
            and parent.DataSet_Identity = node.DataSet_Identity
            and parent.TreeType_Identity = node.TreeType_Identity
            left join NodeValue v
            on v.Node_Identity = node.Node_Identity
            and v.DataSet_Identity = node.DataSet_Identity
            and v.ValidFrom <= ?3
            and v.ValidTo > ?3
            where node.DataSet_Identity = ?1
            and node.TreeType_Identity = ?2
            and (node.Lft < node.Rgt - 1 or v.Node_Identity is not null)
            group by node.Node_Identity
    ",
    )?;
    let rows = statement.query_map(params![scope.data_set, scope.tree_type, instant], |row| {
        let value = Scalar::from_slots(row.get(2)?, row.get(3)?);
        Ok(TreeRow {
            id: row.get(0)?,
            label: row.get(1)?,
            is_branch: value.is_none(),
            value,
            parent_lft: row.get(4)?,
            lft: row.get(5)?,
            rgt: row.get(6)?,
            depth: row.get(7)?,
        })
    })?;
    let mut collected = Vec::new();
    for row in rows {
        collected.push(row?);
    }
    Ok(collected)
}

/// All nodes of the scope ordered by `Lft`.
pub fn all_nodes(connection: &Connection, scope: &Scope) -> Result<Vec<NodeRecord>> {
    let mut statement = connection.prepare_cached(
        "
        select Node_Identity, Label, Lft, Rgt, Depth
            from Node
            where DataSet_Identity = ?
            and TreeType_Identity = ?
            order by Lft
    ",
    )?;
    let nodes = statement.query_map(params![scope.data_set, scope.tree_type], |row| {
        Ok(NodeRecord {
            id: row.get(0)?,
            label: row.get(1)?,
            lft: row.get(2)?,
            rgt: row.get(3)?,
            depth: row.get(4)?,
        })
    })?;
    let mut collected = Vec::new();
    for node in nodes {
        collected.push(node?);
    }
    Ok(collected)
}

/// Validity intervals of all values in the scope, ordered by node and start.
pub fn value_intervals(
    connection: &Connection,
    scope: &Scope,
) -> Result<Vec<(NodeId, Instant, Instant)>> {
    let mut statement = connection.prepare_cached(
        "
        select v.Node_Identity, v.ValidFrom, v.ValidTo
            from NodeValue v
            join Node n
            on n.Node_Identity = v.Node_Identity
            where n.DataSet_Identity = ?
            and n.TreeType_Identity = ?
            order by v.Node_Identity, v.ValidFrom
    ",
    )?;
    let intervals = statement.query_map(params![scope.data_set, scope.tree_type], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    let mut collected = Vec::new();
    for interval in intervals {
        collected.push(interval?);
    }
    Ok(collected)
}

/// Number of node and value rows in a scope.
pub fn row_counts(connection: &Connection, scope: &Scope) -> Result<(i64, i64)> {
    let nodes = connection
        .prepare_cached(
            "
            select count(*)
                from Node
                where DataSet_Identity = ?
                and TreeType_Identity = ?
        ",
        )?
        .query_row(params![scope.data_set, scope.tree_type], |r| r.get(0))?;
    let values = connection
        .prepare_cached(
            "
            select count(*)
                from NodeValue v
                join Node n
                on n.Node_Identity = v.Node_Identity
                where n.DataSet_Identity = ?
                and n.TreeType_Identity = ?
        ",
        )?
        .query_row(params![scope.data_set, scope.tree_type], |r| r.get(0))?;
    Ok((nodes, values))
}

/// Inserts a value row with explicit bounds. Only reachable from tests that
/// need to build stores the writer itself never produces.
#[cfg(test)]
pub(crate) fn add_value_interval(
    connection: &Connection,
    node: NodeId,
    data_set: i64,
    text: &str,
    valid_from: Instant,
    valid_to: Instant,
) -> Result<()> {
    connection.execute(
        "insert into NodeValue (DataSet_Identity, Node_Identity, TextValue, IntValue, ValidFrom, ValidTo) values (?, ?, ?, null, ?, ?)",
        params![data_set, node, text, valid_from, valid_to],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope { data_set: 1, tree_type: 1 }
    }

    #[test]
    fn schema_is_idempotent() {
        let persistor = Persistor::new(&PersistenceMode::InMemory).expect("db");
        persistor.create_schema().expect("second schema pass");
        assert_eq!(row_counts(persistor.connection(), &scope()).unwrap(), (0, 0));
    }

    #[test]
    fn empty_scope_has_no_max_rgt() {
        let persistor = Persistor::new(&PersistenceMode::InMemory).expect("db");
        assert_eq!(max_rgt(persistor.connection(), &scope()).unwrap(), None);
        assert_eq!(parent_bounds(persistor.connection(), &scope(), 1).unwrap(), None);
    }

    #[test]
    fn value_slots_are_exclusive() {
        let persistor = Persistor::new(&PersistenceMode::InMemory).expect("db");
        let conn = persistor.connection();
        let id = add_node(conn, &scope(), Some("a"), 1, 0, 0, Some(0)).unwrap();
        let both = conn.execute(
            "insert into NodeValue (DataSet_Identity, Node_Identity, TextValue, IntValue, ValidFrom, ValidTo) values (1, ?, 'x', 1, 1, 2)",
            params![id],
        );
        assert!(both.is_err());
        let neither = conn.execute(
            "insert into NodeValue (DataSet_Identity, Node_Identity, TextValue, IntValue, ValidFrom, ValidTo) values (1, ?, null, null, 1, 2)",
            params![id],
        );
        assert!(neither.is_err());
    }

    #[test]
    fn gap_shifts_rgt_before_lft() {
        let persistor = Persistor::new(&PersistenceMode::InMemory).expect("db");
        let conn = persistor.connection();
        // a [1, 4] holds b [2, 3]; c [5, 6] sits to the right
        add_node(conn, &scope(), Some("a"), 1, 0, 0, Some(0)).unwrap();
        conn.execute("update Node set Rgt = 4 where Label = 'a'", []).unwrap();
        add_node(conn, &scope(), Some("b"), 2, 1, 1, Some(1)).unwrap();
        add_node(conn, &scope(), Some("c"), 5, 0, 0, Some(0)).unwrap();
        assert_eq!(open_gap(conn, &scope(), 4).unwrap(), (2, 1));
        let nodes = all_nodes(conn, &scope()).unwrap();
        let bounds: Vec<(i64, i64)> = nodes.iter().map(|n| (n.lft, n.rgt)).collect();
        assert_eq!(bounds, vec![(1, 6), (2, 3), (7, 8)]);
    }
}
