//! Index Range Scan
//!
//! Walks an index tree from a root pointer down to its leaves and yields
//! the flakes inside a half-open `[first, rhs)` range under the index
//! comparator. Subtrees whose pointer range cannot intersect the requested
//! range are skipped without resolving them.

use crate::error::Result;
use crate::index::{ChildPointer, Flake, IndexResolver, IndexType, ResolvedNode};
use std::cmp::Ordering;

/// Half-open flake range under one index's comparator.
#[derive(Debug, Clone, Default)]
pub struct FlakeRange {
    /// Inclusive lower bound; `None` scans from the start
    pub first: Option<Flake>,
    /// Exclusive upper bound; `None` scans to the end
    pub rhs: Option<Flake>,
}

impl FlakeRange {
    pub fn all() -> Self {
        FlakeRange::default()
    }

    pub fn from(first: Flake) -> Self {
        FlakeRange { first: Some(first), rhs: None }
    }

    pub fn between(first: Flake, rhs: Flake) -> Self {
        FlakeRange { first: Some(first), rhs: Some(rhs) }
    }

    fn contains(&self, index: IndexType, flake: &Flake) -> bool {
        let after_first = match &self.first {
            Some(first) => index.compare(flake, first) != Ordering::Less,
            None => true,
        };
        let before_rhs = match &self.rhs {
            Some(rhs) => index.compare(flake, rhs) == Ordering::Less,
            None => true,
        };
        after_first && before_rhs
    }

    /// Whether a subtree behind `pointer` can hold anything in range. A
    /// pointer without bounds is always a candidate.
    fn overlaps(&self, index: IndexType, pointer: &ChildPointer) -> bool {
        // Subtree entirely below the range start?
        if let (Some(start), Some(sub_rhs)) = (&self.first, &pointer.rhs) {
            if index.compare(sub_rhs, start) != Ordering::Greater {
                return false;
            }
        }
        // Subtree entirely at or above the range end?
        if let (Some(end), Some(sub_first)) = (&self.rhs, &pointer.first) {
            if index.compare(sub_first, end) != Ordering::Less {
                return false;
            }
        }
        true
    }
}

/// Resolve and collect every in-range flake below `root`, leaves in index
/// order. The salt scopes cache entries to the calling query.
pub async fn scan_range(
    resolver: &IndexResolver,
    index: IndexType,
    root: &ChildPointer,
    range: &FlakeRange,
    salt: &str,
) -> Result<Vec<Flake>> {
    let mut out = Vec::new();
    // Depth-first with an explicit stack; children are pushed reversed so
    // the leftmost subtree is visited first.
    let mut stack: Vec<ChildPointer> = vec![root.clone()];

    while let Some(pointer) = stack.pop() {
        if !range.overlaps(index, &pointer) {
            continue;
        }
        let node = resolver.resolve(index, &pointer, salt).await?;
        match node.as_ref() {
            ResolvedNode::Branch(branch) => {
                for child in branch.children.iter().rev() {
                    stack.push(child.clone());
                }
            }
            ResolvedNode::Leaf(leaf) => {
                out.extend(
                    leaf.flakes.iter().filter(|f| range.contains(index, f)).cloned(),
                );
            }
        }
    }
    Ok(out)
}
