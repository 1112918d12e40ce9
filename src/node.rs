//! Trie nodes of the schema tree.
//!
//! Children own their subtrees; `parent` links are weak so the structure
//! stays acyclic for ownership purposes. Each node is also threaded onto its
//! property's occurrence chain, giving the support query and the recommender
//! a way to reach every node carrying a given property without walking the
//! whole tree.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::dictionary::{PropertyDictionary, PropertyRef, ROOT_IRI};

/// One node of the schema tree.
///
/// `support` counts the subjects whose insertion path passed through this
/// node. Children are kept sorted by the child property's sort order, so
/// lookup is a binary search and serialisation is deterministic.
pub struct SchemaNode {
    property: PropertyRef,
    support: AtomicU32,
    parent: Weak<SchemaNode>,
    children: RwLock<Vec<Arc<SchemaNode>>>,
    /// Next node carrying the same property; fixed at construction, under
    /// the property's chain lock. Chain links never point into the node's
    /// own subtree (a path cannot carry one property twice), so they cannot
    /// form ownership cycles.
    next_in_chain: Option<Arc<SchemaNode>>,
}

impl SchemaNode {
    /// Create the root node, carrying the `"root"` sentinel property.
    pub fn root(dictionary: &PropertyDictionary) -> Arc<Self> {
        Arc::new(Self {
            property: dictionary.intern(ROOT_IRI),
            support: AtomicU32::new(0),
            parent: Weak::new(),
            children: RwLock::new(Vec::new()),
            next_in_chain: None,
        })
    }

    /// Create a node restored from disk. The caller threads it onto the
    /// chain itself (chains are rebuilt in pre-order on load).
    pub(crate) fn restored(
        property: PropertyRef,
        support: u32,
        parent: &Arc<SchemaNode>,
    ) -> Arc<Self> {
        let record = Arc::clone(&property);
        record.prepend_to_chain(|next| {
            Arc::new(Self {
                property,
                support: AtomicU32::new(support),
                parent: Arc::downgrade(parent),
                children: RwLock::new(Vec::new()),
                next_in_chain: next,
            })
        })
    }

    /// Create the restored root, bypassing chain threading.
    pub(crate) fn restored_root(property: PropertyRef, support: u32) -> Arc<Self> {
        Arc::new(Self {
            property,
            support: AtomicU32::new(support),
            parent: Weak::new(),
            children: RwLock::new(Vec::new()),
            next_in_chain: None,
        })
    }

    pub fn property(&self) -> &PropertyRef {
        &self.property
    }

    pub fn support(&self) -> u32 {
        self.support.load(Ordering::Relaxed)
    }

    /// Atomic +1 for each subject whose path crosses this node.
    pub fn increment_support(&self) {
        self.support.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parent(&self) -> Option<Arc<SchemaNode>> {
        self.parent.upgrade()
    }

    /// Whether this is the tree root (no parent).
    pub fn is_root(&self) -> bool {
        // Weak::new() has no allocation to upgrade, so this is cheap.
        self.parent.upgrade().is_none() && self.property.iri() == ROOT_IRI
    }

    pub fn next_in_chain(&self) -> Option<Arc<SchemaNode>> {
        self.next_in_chain.clone()
    }

    /// Snapshot of the children, ordered by child property sort order.
    pub fn children(&self) -> Vec<Arc<SchemaNode>> {
        self.children.read().expect("children lock poisoned").clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().expect("children lock poisoned").len()
    }

    /// Return the child keyed by `property`, creating it if absent.
    ///
    /// Double-checked: an uncontended read-lock probe first, then a
    /// re-check under the write lock, so two threads inserting the same
    /// subject shape converge on one child. The chain prepend for a fresh
    /// node happens under the property's chain lock (taken strictly inside
    /// the write lock, never the other way around).
    pub fn get_or_create_child(self: &Arc<Self>, property: &PropertyRef) -> Arc<SchemaNode> {
        let order = property.sort_order();
        {
            let children = self.children.read().expect("children lock poisoned");
            if let Ok(found) = children.binary_search_by_key(&order, |c| c.property.sort_order()) {
                return Arc::clone(&children[found]);
            }
        }

        let mut children = self.children.write().expect("children lock poisoned");
        match children.binary_search_by_key(&order, |c| c.property.sort_order()) {
            Ok(found) => Arc::clone(&children[found]),
            Err(position) => {
                let child = property.prepend_to_chain(|next| {
                    Arc::new(SchemaNode {
                        property: Arc::clone(property),
                        support: AtomicU32::new(0),
                        parent: Arc::downgrade(self),
                        children: RwLock::new(Vec::new()),
                        next_in_chain: next,
                    })
                });
                children.insert(position, Arc::clone(&child));
                child
            }
        }
    }

    /// Insert a restored child at its sorted position (load path only).
    pub(crate) fn attach_restored_child(&self, child: Arc<SchemaNode>) {
        let mut children = self.children.write().expect("children lock poisoned");
        let order = child.property.sort_order();
        let position = children
            .binary_search_by_key(&order, |c| c.property.sort_order())
            .unwrap_or_else(|p| p);
        children.insert(position, child);
    }

    /// True iff every property of the sorted query lies on the path from
    /// this node up to the root.
    ///
    /// The path ascends with strictly decreasing sort order while the query
    /// is sorted ascending, so this is a single linear merge: walk the query
    /// from its rarest element and the path upwards in lockstep; once the
    /// path's order drops below the sought one, the query element can no
    /// longer appear.
    pub fn prefix_contains(&self, sorted_query: &[PropertyRef]) -> bool {
        let mut remaining = sorted_query.len();
        if remaining == 0 {
            return true;
        }

        let mut order = self.property.sort_order();
        let mut parent = self.parent();
        loop {
            let wanted = sorted_query[remaining - 1].sort_order();
            if order == wanted {
                remaining -= 1;
                if remaining == 0 {
                    return true;
                }
            } else if order < wanted {
                return false;
            }
            match parent {
                Some(node) => {
                    if node.is_root() {
                        return false;
                    }
                    order = node.property.sort_order();
                    parent = node.parent();
                }
                None => return false,
            }
        }
    }
}

impl std::fmt::Debug for SchemaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaNode")
            .field("property", &self.property.iri())
            .field("support", &self.support())
            .field("children", &self.child_count())
            .finish()
    }
}
