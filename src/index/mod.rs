//! Index Node Model
//!
//! B-tree branch and leaf nodes, sort-ordered by a comparator associated
//! with an index identifier. The comparator is a property of the index id,
//! never of the node: nodes referenced from a parent carry an *unresolved*
//! summary (`{id, leaf, first, rhs, size}`) with enough information to
//! locate and range-check without fetching, and the same serialized bytes
//! can back multiple logical positions.
//!
//! Persisted forms:
//! - branch: `{"children": [{"id", "leaf", "first", "rhs", "size"}, ...]}`
//! - leaf:   `{"flakes": [...]}`

pub mod range;
pub mod resolver;

pub use range::{scan_range, FlakeRange};
pub use resolver::{IndexResolver, ResolverCacheKey};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sentinel id of a node that resolves in place without storage I/O.
pub const EMPTY_NODE_ID: &str = "empty";

/// The four ledger indexes. Each owns a flake sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// subject, predicate, object
    Spot,
    /// predicate, object, subject
    Post,
    /// object, predicate, subject
    Opst,
    /// transaction, subject, predicate, object
    Tspo,
}

impl IndexType {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexType::Spot => "spot",
            IndexType::Post => "post",
            IndexType::Opst => "opst",
            IndexType::Tspo => "tspo",
        }
    }

    pub fn all() -> [IndexType; 4] {
        [IndexType::Spot, IndexType::Post, IndexType::Opst, IndexType::Tspo]
    }

    /// Total order this index keeps its flakes in.
    pub fn compare(self, a: &Flake, b: &Flake) -> Ordering {
        match self {
            IndexType::Spot => a
                .s
                .cmp(&b.s)
                .then_with(|| a.p.cmp(&b.p))
                .then_with(|| a.o.compare(&b.o))
                .then_with(|| a.t.cmp(&b.t)),
            IndexType::Post => a
                .p
                .cmp(&b.p)
                .then_with(|| a.o.compare(&b.o))
                .then_with(|| a.s.cmp(&b.s))
                .then_with(|| a.t.cmp(&b.t)),
            IndexType::Opst => a
                .o
                .compare(&b.o)
                .then_with(|| a.p.cmp(&b.p))
                .then_with(|| a.s.cmp(&b.s))
                .then_with(|| a.t.cmp(&b.t)),
            IndexType::Tspo => a
                .t
                .cmp(&b.t)
                .then_with(|| a.s.cmp(&b.s))
                .then_with(|| a.p.cmp(&b.p))
                .then_with(|| a.o.compare(&b.o)),
        }
    }
}

/// Object position of a flake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlakeObject {
    Long(i64),
    Double(f64),
    Text(String),
    Boolean(bool),
    Null,
}

impl FlakeObject {
    /// Total order across object types: rank by variant, then by value.
    /// Doubles use IEEE total ordering so the comparator is never partial.
    pub fn compare(&self, other: &FlakeObject) -> Ordering {
        fn rank(obj: &FlakeObject) -> u8 {
            match obj {
                FlakeObject::Null => 0,
                FlakeObject::Boolean(_) => 1,
                FlakeObject::Long(_) => 2,
                FlakeObject::Double(_) => 3,
                FlakeObject::Text(_) => 4,
            }
        }
        match (self, other) {
            (FlakeObject::Long(a), FlakeObject::Long(b)) => a.cmp(b),
            (FlakeObject::Double(a), FlakeObject::Double(b)) => a.total_cmp(b),
            (FlakeObject::Long(a), FlakeObject::Double(b)) => (*a as f64).total_cmp(b),
            (FlakeObject::Double(a), FlakeObject::Long(b)) => a.total_cmp(&(*b as f64)),
            (FlakeObject::Text(a), FlakeObject::Text(b)) => a.cmp(b),
            (FlakeObject::Boolean(a), FlakeObject::Boolean(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

/// One ledger triple with its transaction metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flake {
    /// Subject id
    pub s: i64,
    /// Predicate id
    pub p: i64,
    /// Object value
    pub o: FlakeObject,
    /// Datatype id
    #[serde(default)]
    pub dt: i64,
    /// Transaction
    pub t: i64,
    /// Assertion (true) or retraction (false)
    pub op: bool,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<serde_json::Value>,
}

/// Unresolved pointer to a child node, carried inside a parent branch. Holds
/// enough to locate and range-check the subtree without fetching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildPointer {
    /// Storage path of the serialized node
    pub id: String,
    /// Whether the referenced node is a leaf
    #[serde(default)]
    pub leaf: bool,
    /// Lower bound: `first` <= every key in the subtree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<Flake>,
    /// Exclusive upper bound: every key < `rhs` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhs: Option<Flake>,
    /// Subtree size estimate in flakes
    #[serde(default)]
    pub size: u64,
}

impl ChildPointer {
    pub fn is_empty_sentinel(&self) -> bool {
        self.id == EMPTY_NODE_ID
    }

    /// Range-check a flake against `first`/`rhs` without resolving.
    pub fn covers(&self, index: IndexType, flake: &Flake) -> bool {
        let after_first = match &self.first {
            Some(first) => index.compare(first, flake) != Ordering::Greater,
            None => true,
        };
        let before_rhs = match &self.rhs {
            Some(rhs) => index.compare(flake, rhs) == Ordering::Less,
            None => true,
        };
        after_first && before_rhs
    }
}

/// Persisted form of a branch node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchData {
    pub children: Vec<ChildPointer>,
}

/// Persisted form of a leaf node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafData {
    pub flakes: Vec<Flake>,
}

/// A materialized branch: children sorted by `first` under the index
/// comparator. Metadata comes from the parent's pointer, not from the
/// serialized bytes.
#[derive(Debug, Clone)]
pub struct ResolvedBranch {
    pub id: String,
    pub index: IndexType,
    pub first: Option<Flake>,
    pub rhs: Option<Flake>,
    pub children: Vec<ChildPointer>,
}

/// A materialized leaf: flakes sorted under the index comparator.
#[derive(Debug, Clone)]
pub struct ResolvedLeaf {
    pub id: String,
    pub index: IndexType,
    pub first: Option<Flake>,
    pub rhs: Option<Flake>,
    pub flakes: Vec<Flake>,
}

/// A realized index node.
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    Branch(ResolvedBranch),
    Leaf(ResolvedLeaf),
}

impl ResolvedNode {
    pub fn id(&self) -> &str {
        match self {
            ResolvedNode::Branch(b) => &b.id,
            ResolvedNode::Leaf(l) => &l.id,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ResolvedNode::Leaf(_))
    }

    /// Number of directly held entries (children or flakes).
    pub fn len(&self) -> usize {
        match self {
            ResolvedNode::Branch(b) => b.children.len(),
            ResolvedNode::Leaf(l) => l.flakes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flake(s: i64, p: i64, o: i64, t: i64) -> Flake {
        Flake { s, p, o: FlakeObject::Long(o), dt: 0, t, op: true, m: None }
    }

    #[test]
    fn test_spot_and_post_orders_differ() {
        let a = flake(1, 9, 5, 0);
        let b = flake(2, 3, 4, 0);
        assert_eq!(IndexType::Spot.compare(&a, &b), Ordering::Less);
        assert_eq!(IndexType::Post.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_tspo_orders_by_transaction_first() {
        let early = flake(9, 9, 9, 1);
        let late = flake(1, 1, 1, 2);
        assert_eq!(IndexType::Tspo.compare(&early, &late), Ordering::Less);
    }

    #[test]
    fn test_object_total_order_across_types() {
        let long = FlakeObject::Long(5);
        let double = FlakeObject::Double(5.5);
        let text = FlakeObject::Text("a".to_string());
        assert_eq!(long.compare(&double), Ordering::Less);
        assert_eq!(double.compare(&text), Ordering::Less);
        assert_eq!(FlakeObject::Null.compare(&long), Ordering::Less);
    }

    #[test]
    fn test_pointer_covers_range() {
        let ptr = ChildPointer {
            id: "a/main/index/spot/x.json".to_string(),
            leaf: true,
            first: Some(flake(10, 0, 0, 0)),
            rhs: Some(flake(20, 0, 0, 0)),
            size: 2,
        };
        assert!(ptr.covers(IndexType::Spot, &flake(10, 0, 0, 0)));
        assert!(ptr.covers(IndexType::Spot, &flake(15, 1, 1, 1)));
        assert!(!ptr.covers(IndexType::Spot, &flake(20, 0, 0, 0)));
        assert!(!ptr.covers(IndexType::Spot, &flake(9, 9, 9, 9)));
    }

    #[test]
    fn test_branch_serde_shape() {
        let data = BranchData {
            children: vec![ChildPointer {
                id: "n1".to_string(),
                leaf: true,
                first: Some(flake(1, 1, 1, 1)),
                rhs: None,
                size: 1,
            }],
        };
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("children").is_some());
        let back: BranchData = serde_json::from_value(json).unwrap();
        assert_eq!(back.children.len(), 1);
        assert_eq!(back.children[0].id, "n1");
    }
}
