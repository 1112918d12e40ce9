//! The schema tree: a frequency-ordered prefix trie over property sets.
//!
//! Built once from a corpus in two passes (count, then insert) and read-only
//! for queries afterwards. Sorting every subject's property list by
//! descending global frequency maximises prefix sharing, so common
//! properties sit near the root and the trie stays compact.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use crate::corpus::{self, SubjectSummary};
use crate::dictionary::{PropertyDictionary, PropertyRef};
use crate::error::{PersistError, PersistResult, TreeResult};
use crate::node::SchemaNode;

/// A compressed prefix trie over frequency-ordered property sequences.
pub struct SchemaTree {
    dictionary: PropertyDictionary,
    root: Arc<SchemaNode>,
    min_support: u32,
    typed: bool,
}

impl SchemaTree {
    /// A newly allocated, empty tree.
    ///
    /// `min_support` is reserved for future pruning and clamped to at
    /// least 1. `typed` records whether type statements are folded into the
    /// property stream.
    pub fn new(typed: bool, min_support: u32) -> Self {
        let dictionary = PropertyDictionary::new();
        let root = SchemaNode::root(&dictionary);
        Self {
            dictionary,
            root,
            min_support: min_support.max(1),
            typed,
        }
    }

    /// Build a tree from the first `first_n` subjects of a corpus
    /// (`first_n == 0` reads all of it).
    pub fn create(path: &Path, first_n: u64, typed: bool, min_support: u32) -> TreeResult<Self> {
        let tree = Self::new(typed, min_support);
        tree.two_pass(path, first_n)?;
        Ok(tree)
    }

    /// Restore a tree from its deserialized parts.
    pub(crate) fn from_parts(
        dictionary: PropertyDictionary,
        root: Arc<SchemaNode>,
        min_support: u32,
        typed: bool,
    ) -> Self {
        Self {
            dictionary,
            root,
            min_support: min_support.max(1),
            typed,
        }
    }

    pub fn dictionary(&self) -> &PropertyDictionary {
        &self.dictionary
    }

    pub fn root(&self) -> &Arc<SchemaNode> {
        &self.root
    }

    pub fn min_support(&self) -> u32 {
        self.min_support
    }

    pub fn typed(&self) -> bool {
        self.typed
    }

    /// Number of subjects inserted so far.
    pub fn subject_count(&self) -> u32 {
        self.root.support()
    }

    /// Two-pass construction: count global property frequencies, freeze the
    /// sort order, then insert every subject's sorted property list.
    pub fn two_pass(&self, path: &Path, first_n: u64) -> TreeResult<()> {
        let subjects = corpus::read(
            path,
            &self.dictionary,
            |summary| {
                for property in summary.properties.keys() {
                    property.increment_count();
                }
            },
            first_n,
            self.typed,
        )?;

        let (properties, types) = self.dictionary.counts();
        tracing::info!(subjects, properties, types, "first pass complete");

        if subjects > u64::from(u32::MAX) {
            tracing::warn!(
                subjects,
                limit = u32::MAX,
                "subject count exceeds the u32 support ceiling; support counts will wrap"
            );
        }

        self.dictionary.recompute_sort_order();

        corpus::read(
            path,
            &self.dictionary,
            |summary| self.insert(summary),
            first_n,
            self.typed,
        )?;
        tracing::info!(subjects = self.subject_count(), "second pass complete");

        Ok(())
    }

    /// Insert one subject: sort its distinct properties ascending by sort
    /// order and extend the trie along that sequence, incrementing support
    /// on every node crossed. Thread-safe.
    pub fn insert(&self, summary: &SubjectSummary) {
        let mut list: Vec<PropertyRef> = summary.properties.keys().cloned().collect();
        list.sort_unstable_by_key(|p| p.sort_order());

        let mut node = Arc::clone(&self.root);
        node.increment_support();
        for property in &list {
            node = node.get_or_create_child(property);
            node.increment_support();
        }
    }

    /// Total co-occurrence frequency of a property set.
    ///
    /// Every subject whose property set is a superset of the query crossed
    /// exactly one node carrying the query's rarest element on a path that
    /// contains the rest, so walking that element's occurrence chain and
    /// filtering by [`SchemaNode::prefix_contains`] is exact.
    pub fn support(&self, query: &[PropertyRef]) -> u64 {
        if query.is_empty() {
            return u64::from(self.root.support());
        }

        let mut sorted = query.to_vec();
        sorted.sort_unstable_by_key(|p| p.sort_order());
        sorted.dedup_by(|a, b| Arc::ptr_eq(a, b));

        let rarest = &sorted[sorted.len() - 1];
        let mut support = 0u64;
        for node in rarest.occurrences() {
            if node.prefix_contains(&sorted) {
                support += u64::from(node.support());
            }
        }
        support
    }

    /// Map query strings to known dictionary records; see
    /// [`PropertyDictionary::build_property_list`].
    pub fn build_property_list(&self, properties: &[&str], types: &[&str]) -> Vec<PropertyRef> {
        self.dictionary.build_property_list(properties, types)
    }

    /// Write `URI;Frequency` CSV rows for every ordinary property.
    pub fn write_property_frequencies(&self, path: &Path) -> PersistResult<()> {
        self.write_frequencies(path, |p| p.is_property())
    }

    /// Write `URI;Frequency` CSV rows for every type pseudo-property, with
    /// the type tag stripped.
    pub fn write_type_frequencies(&self, path: &Path) -> PersistResult<()> {
        self.write_frequencies(path, |p| p.is_type())
    }

    fn write_frequencies<F>(&self, path: &Path, keep: F) -> PersistResult<()>
    where
        F: Fn(&PropertyRef) -> bool,
    {
        let io_err = |source| PersistError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(io_err)?);
        writeln!(file, "URI;Frequency").map_err(io_err)?;

        let mut records = self.dictionary.records();
        records.sort_unstable_by_key(|p| p.sort_order());
        for record in records.iter().filter(|p| keep(p)) {
            writeln!(file, "{};{}", record.label(), record.total_count()).map_err(io_err)?;
        }
        file.flush().map_err(io_err)
    }

    /// GraphViz rendering of the tree, filtered to nodes with at least
    /// `min_support` support; occurrence chains appear as same-rank
    /// clusters.
    pub fn to_dot(&self, min_support: u32) -> String {
        let mut out = String::from(
            "digraph schematree { newrank=true; labelloc=b; color=blue; fontcolor=blue; style=dotted;\n",
        );
        Self::dot_edges(&self.root, min_support, &mut out);

        for property in self.dictionary.records() {
            let mut cluster = String::new();
            for node in property.occurrences() {
                if node.support() >= min_support {
                    let _ = write!(cluster, "\"{:p}\"; ", Arc::as_ptr(&node));
                }
            }
            if !cluster.is_empty() {
                let _ = writeln!(
                    out,
                    "subgraph \"cluster_{}\" {{ rank=same; label=\"{}\"; {}}}",
                    property.sort_order(),
                    property.label(),
                    cluster
                );
            }
        }

        out.push_str("\n}");
        out
    }

    fn dot_edges(node: &Arc<SchemaNode>, min_support: u32, out: &mut String) {
        let _ = writeln!(
            out,
            "\"{:p}\" [label=\"{} ({})\"]",
            Arc::as_ptr(node),
            node.property().label(),
            node.support()
        );
        for child in node.children() {
            if child.support() < min_support {
                continue;
            }
            let _ = writeln!(
                out,
                "\"{:p}\" -> \"{:p}\"",
                Arc::as_ptr(node),
                Arc::as_ptr(&child)
            );
            Self::dot_edges(&child, min_support, out);
        }
    }
}

impl std::fmt::Debug for SchemaTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaTree")
            .field("properties", &self.dictionary.len())
            .field("subjects", &self.subject_count())
            .field("min_support", &self.min_support)
            .field("typed", &self.typed)
            .finish()
    }
}
