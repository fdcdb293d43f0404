//! Index Resolver
//!
//! Lazily materializes branch and leaf nodes from the storage substrate,
//! reifies the index comparator, and exposes a uniform
//! `resolve(pointer) -> realized node` channel. Resolutions are memoized in
//! the byte-budgeted cache; the cache key includes a caller salt so
//! sanitized reads from one query are never reused by another.

use crate::address::Address;
use crate::cache::ResolverCache;
use crate::error::{Error, Result};
use crate::index::{
    BranchData, ChildPointer, IndexType, LeafData, ResolvedBranch, ResolvedLeaf, ResolvedNode,
};
use crate::storage::Store;
use std::cmp::Ordering;
use std::sync::Arc;

/// Cache key: (tenant/tempid salt, node id).
pub type ResolverCacheKey = (String, String);

pub struct IndexResolver {
    store: Arc<dyn Store>,
    cache: Arc<ResolverCache<ResolverCacheKey, Arc<ResolvedNode>>>,
}

impl IndexResolver {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<ResolverCache<ResolverCacheKey, Arc<ResolvedNode>>>,
    ) -> Self {
        IndexResolver { store, cache }
    }

    /// Materialize the node a pointer references. The empty sentinel
    /// resolves in place without storage I/O; everything else goes through
    /// the cache with a single-flight load.
    pub async fn resolve(
        &self,
        index: IndexType,
        pointer: &ChildPointer,
        salt: &str,
    ) -> Result<Arc<ResolvedNode>> {
        if pointer.is_empty_sentinel() {
            return Ok(Arc::new(empty_node(index, pointer)));
        }

        let key: ResolverCacheKey = (salt.to_string(), pointer.id.clone());
        let store = self.store.clone();
        let pointer = pointer.clone();
        self.cache
            .lookup(&key, move |_| async move {
                let node = load_node(store.as_ref(), index, &pointer).await?;
                Ok(Arc::new(node))
            })
            .await
    }
}

fn empty_node(index: IndexType, pointer: &ChildPointer) -> ResolvedNode {
    if pointer.leaf {
        ResolvedNode::Leaf(ResolvedLeaf {
            id: pointer.id.clone(),
            index,
            first: pointer.first.clone(),
            rhs: pointer.rhs.clone(),
            flakes: Vec::new(),
        })
    } else {
        ResolvedNode::Branch(ResolvedBranch {
            id: pointer.id.clone(),
            index,
            first: pointer.first.clone(),
            rhs: pointer.rhs.clone(),
            children: Vec::new(),
        })
    }
}

/// Deserialize one node from storage. Branch and leaf metadata (comparator,
/// first, rhs, leaf flag) is reconstituted from the parent's pointer rather
/// than the stored bytes, so the same bytes can back multiple logical
/// positions.
async fn load_node(
    store: &dyn Store,
    index: IndexType,
    pointer: &ChildPointer,
) -> Result<ResolvedNode> {
    let archive = store
        .json_archive()
        .ok_or_else(|| Error::unsupported("storage backend cannot read JSON index nodes"))?;
    let address = Address::new(store.method(), pointer.id.as_str());
    let json = archive
        .read_json(&address)
        .await?
        .ok_or_else(|| Error::not_found(format!("index node '{}' absent from storage", pointer.id)))?;

    if pointer.leaf {
        let data: LeafData = serde_json::from_value(json)?;
        let mut flakes = data.flakes;
        flakes.sort_by(|a, b| index.compare(a, b));
        Ok(ResolvedNode::Leaf(ResolvedLeaf {
            id: pointer.id.clone(),
            index,
            first: pointer.first.clone(),
            rhs: pointer.rhs.clone(),
            flakes,
        }))
    } else {
        let data: BranchData = serde_json::from_value(json)?;
        let mut children = data.children;
        children.sort_by(|a, b| compare_pointers(index, a, b));
        Ok(ResolvedNode::Branch(ResolvedBranch {
            id: pointer.id.clone(),
            index,
            first: pointer.first.clone(),
            rhs: pointer.rhs.clone(),
            children,
        }))
    }
}

/// Children sort by their `first` key; a missing `first` sorts lowest.
fn compare_pointers(index: IndexType, a: &ChildPointer, b: &ChildPointer) -> Ordering {
    match (&a.first, &b.first) {
        (Some(fa), Some(fb)) => index.compare(fa, fb),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
