use std::collections::HashMap;

use canopy::construct::{NewBranch, NodeId};
use canopy::datatype::Scalar;
use canopy::engine::Engine;
use canopy::persist::{PersistenceMode, Persistor};

// small deterministic generator so failures reproduce
struct Lcg(u64);
impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) % bound as u64) as usize
    }
}

fn stored(engine: &Engine) -> Vec<(NodeId, i64, i64, i64)> {
    let connection = engine.persistor().connection();
    let mut statement = connection
        .prepare("select Node_Identity, Lft, Rgt, Depth from Node order by Lft")
        .unwrap();
    statement
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

#[test]
fn random_inserts_keep_the_nested_set_invariants() {
    let persistor = Persistor::new(&PersistenceMode::InMemory).expect("db");
    let mut engine = Engine::configure(persistor, 1, 100).expect("engine");
    let mut rng = Lcg(42);
    // branches that may receive children, with their depth
    let mut branches: Vec<(NodeId, i64)> = Vec::new();
    let mut parents: HashMap<NodeId, NodeId> = HashMap::new();

    for i in 0..120 {
        let (parent, depth) = if branches.is_empty() || rng.next(6) == 0 {
            (0, 0)
        } else {
            let (id, depth) = branches[rng.next(branches.len())];
            (id, depth + 1)
        };
        let leaf = rng.next(3) == 0;
        let label = if rng.next(4) == 0 { None } else { Some(format!("n{}", i)) };
        let value = leaf.then(|| Scalar::classify(&i.to_string()));
        let id = engine
            .insert_branch(&NewBranch::under(1, parent, depth, label, value))
            .expect("insert");
        if !leaf {
            branches.push((id, depth));
        }
        parents.insert(id, parent);
    }
    engine.verify(1).expect("consistent");

    let nodes = stored(&engine);
    assert_eq!(nodes.len(), 120);
    let by_id: HashMap<NodeId, (i64, i64)> = nodes.iter().map(|(id, l, r, _)| (*id, (*l, *r))).collect();
    for (id, lft, rgt, depth) in &nodes {
        // containment by interval agrees with the recorded parent chain
        let containing = nodes.iter().filter(|(_, l, r, _)| l < lft && rgt < r).count() as i64;
        assert_eq!(containing, *depth, "depth of node {}", id);
        let mut ancestor = parents[id];
        while ancestor != 0 {
            let (a_lft, a_rgt) = by_id[&ancestor];
            assert!(a_lft < *lft && *rgt < a_rgt, "node {} escapes ancestor {}", id, ancestor);
            ancestor = parents[&ancestor];
        }
    }
}

#[test]
fn computed_depth_matches_stored_depth() {
    let persistor = Persistor::new(&PersistenceMode::InMemory).expect("db");
    let mut engine = Engine::configure(persistor, 1, 100).expect("engine");
    let document = serde_json::json!({
        "a": {"b": {"c": {"d": "deep"}}, "e": "shallow"},
        "f": [["x", {"g": "y"}]]
    });
    engine
        .insert_tree(1, &canopy::construct::Node::from_json(&document))
        .unwrap();
    let snapshot = engine.get_tree(1).unwrap();
    let depths: HashMap<NodeId, i64> = stored(&engine).into_iter().map(|(id, _, _, d)| (id, d)).collect();
    for row in &snapshot.rows {
        assert_eq!(row.depth, depths[&row.id], "row {:?}", row);
    }
    assert_eq!(snapshot.rows.iter().map(|r| r.depth).max(), Some(3));
}
