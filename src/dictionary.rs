//! Property dictionary: interning, frequency counts, and sort order.
//!
//! Every property IRI observed in the corpus is interned exactly once into a
//! [`Property`] record owned by the [`PropertyDictionary`]. All other parts of
//! the crate hold [`PropertyRef`] clones into the dictionary. Records carry a
//! global occurrence count (written concurrently during the first corpus pass)
//! and a sort order by descending frequency (assigned once between passes).

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;

use crate::node::SchemaNode;

/// Prefix distinguishing type pseudo-properties from ordinary properties.
///
/// Type statements are folded into the property stream as `t#<class-iri>`
/// so that classes and predicates share one frequency-ordered namespace.
pub const TYPE_PREFIX: &str = "t#";

/// IRI of the sentinel property carried by the tree root.
pub const ROOT_IRI: &str = "root";

/// An interned property record.
///
/// `total_count` is incremented with atomic adds during the first corpus
/// pass and is read-only afterwards. `sort_order` is provisional (insertion
/// index) until [`PropertyDictionary::recompute_sort_order`] assigns the
/// final rank; smaller means more frequent.
pub struct Property {
    iri: String,
    total_count: AtomicU32,
    sort_order: AtomicU32,
    /// Head of the chain threading every tree node that carries this
    /// property. Prepends are serialised by this lock; the link is weak so
    /// the tree alone owns its nodes.
    chain_head: Mutex<Weak<SchemaNode>>,
}

/// Shared handle to an interned property.
pub type PropertyRef = Arc<Property>;

impl Property {
    fn new(iri: String, provisional_order: u32) -> Self {
        Self {
            iri,
            total_count: AtomicU32::new(0),
            sort_order: AtomicU32::new(provisional_order),
            chain_head: Mutex::new(Weak::new()),
        }
    }

    /// Create a record with known counts, used when restoring a saved tree.
    pub(crate) fn restored(iri: String, total_count: u32, sort_order: u32) -> Self {
        Self {
            iri,
            total_count: AtomicU32::new(total_count),
            sort_order: AtomicU32::new(sort_order),
            chain_head: Mutex::new(Weak::new()),
        }
    }

    /// The interned IRI (type pseudo-properties keep their `t#` prefix).
    pub fn iri(&self) -> &str {
        &self.iri
    }

    /// The IRI with the type tag stripped, for display and CSV output.
    pub fn label(&self) -> &str {
        self.iri.strip_prefix(TYPE_PREFIX).unwrap_or(&self.iri)
    }

    /// Whether this record is a type pseudo-property.
    pub fn is_type(&self) -> bool {
        self.iri.starts_with(TYPE_PREFIX)
    }

    /// Whether this record is an ordinary property.
    pub fn is_property(&self) -> bool {
        !self.is_type()
    }

    /// Global occurrence count across all subjects.
    pub fn total_count(&self) -> u32 {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Atomic +1, called once per subject carrying this property (pass 1).
    /// Wraps at `u32::MAX`; the build reports the ceiling once, up front.
    pub fn increment_count(&self) {
        self.total_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Rank by descending global frequency; smaller is more frequent.
    pub fn sort_order(&self) -> u32 {
        self.sort_order.load(Ordering::Relaxed)
    }

    pub(crate) fn set_sort_order(&self, order: u32) {
        self.sort_order.store(order, Ordering::Relaxed);
    }

    /// First node of this property's occurrence chain, if any.
    pub fn chain_head(&self) -> Option<Arc<SchemaNode>> {
        self.chain_head
            .lock()
            .expect("chain lock poisoned")
            .upgrade()
    }

    /// Build a node with the current chain head as its successor and swing
    /// the head to the new node. The whole prepend runs under the chain lock
    /// so concurrent inserts of the same property serialise here.
    pub(crate) fn prepend_to_chain<F>(&self, build: F) -> Arc<SchemaNode>
    where
        F: FnOnce(Option<Arc<SchemaNode>>) -> Arc<SchemaNode>,
    {
        let mut head = self.chain_head.lock().expect("chain lock poisoned");
        let node = build(head.upgrade());
        *head = Arc::downgrade(&node);
        node
    }

    /// Iterate every tree node carrying this property, newest first.
    pub fn occurrences(&self) -> ChainIter {
        ChainIter {
            next: self.chain_head(),
        }
    }
}

/// Iterator over a property's occurrence chain.
pub struct ChainIter {
    next: Option<Arc<SchemaNode>>,
}

impl Iterator for ChainIter {
    type Item = Arc<SchemaNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next.take()?;
        self.next = node.next_in_chain();
        Some(node)
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.iri == other.iri
    }
}

impl Eq for Property {}

impl Hash for Property {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.iri.hash(state);
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x\t{} ({})", self.total_count(), self.iri, self.sort_order())
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("iri", &self.iri)
            .field("total_count", &self.total_count())
            .field("sort_order", &self.sort_order())
            .finish()
    }
}

/// The dictionary owning every interned property record.
///
/// Backed by a sharded concurrent map, so pass-1 interning from many worker
/// threads contends only on the shard holding the IRI's hash.
pub struct PropertyDictionary {
    map: DashMap<String, PropertyRef>,
    insertions: AtomicU32,
}

impl PropertyDictionary {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            insertions: AtomicU32::new(0),
        }
    }

    /// Get or create the record for `iri`.
    ///
    /// New records start with `total_count = 0` and a provisional sort order
    /// equal to their insertion index. Thread-safe; two racing interns of the
    /// same IRI observe the same record.
    pub fn intern(&self, iri: &str) -> PropertyRef {
        if let Some(existing) = self.map.get(iri) {
            return Arc::clone(existing.value());
        }
        let entry = self.map.entry(iri.to_string()).or_insert_with(|| {
            let provisional = self.insertions.fetch_add(1, Ordering::Relaxed);
            Arc::new(Property::new(iri.to_string(), provisional))
        });
        Arc::clone(entry.value())
    }

    /// Read-only lookup, used on the query path. Unknown IRIs yield `None`.
    pub fn lookup(&self, iri: &str) -> Option<PropertyRef> {
        self.map.get(iri).map(|e| Arc::clone(e.value()))
    }

    /// Insert a record restored from disk, replacing any provisional one.
    pub(crate) fn insert_restored(&self, record: PropertyRef) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
        self.map.insert(record.iri().to_string(), record);
    }

    /// Number of interned records (types and the root sentinel included).
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Count of ordinary properties and of type pseudo-properties.
    pub fn counts(&self) -> (usize, usize) {
        let mut props = 0;
        let mut types = 0;
        for entry in self.map.iter() {
            if entry.value().is_type() {
                types += 1;
            } else {
                props += 1;
            }
        }
        (props, types)
    }

    /// Snapshot of every record, in no particular order.
    pub fn records(&self) -> Vec<PropertyRef> {
        self.map.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Assign final sort orders by `(total_count descending, iri ascending)`.
    ///
    /// Called exactly once, single-threaded, between the counting pass and
    /// the insertion pass. Calling this on a tree that already holds nodes
    /// would break the sort-order invariant of every existing path.
    pub fn recompute_sort_order(&self) {
        let mut records = self.records();
        records.sort_unstable_by(|a, b| {
            b.total_count()
                .cmp(&a.total_count())
                .then_with(|| a.iri().cmp(b.iri()))
        });
        for (position, record) in records.iter().enumerate() {
            record.set_sort_order(position as u32);
        }
    }

    /// Map query strings to known records: type IRIs get the `t#` tag,
    /// unknown IRIs are dropped, duplicates collapse, and the result is
    /// sorted ascending by sort order. Never fails.
    pub fn build_property_list(&self, properties: &[&str], types: &[&str]) -> Vec<PropertyRef> {
        let mut list: Vec<PropertyRef> = properties
            .iter()
            .filter_map(|iri| self.lookup(iri))
            .chain(
                types
                    .iter()
                    .filter_map(|iri| self.lookup(&format!("{TYPE_PREFIX}{iri}"))),
            )
            .collect();
        list.sort_unstable_by_key(|p| p.sort_order());
        list.dedup_by(|a, b| Arc::ptr_eq(a, b));
        list
    }
}

impl Default for PropertyDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PropertyDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDictionary")
            .field("records", &self.len())
            .finish()
    }
}
