//! On-disk representations of the schema tree.
//!
//! Two formats round-trip the same logical content: the primary versioned
//! binary encoding ([`binary`]) and the gzip-wrapped sequential encoding of
//! older releases ([`legacy`]). Files are told apart by suffix alone: a
//! `.gz` suffix selects the legacy reader/writer. Occurrence chains are
//! never serialized; loaders rebuild them by walking the restored tree in
//! pre-order and prepending each node to its property's chain.

pub mod binary;
pub mod legacy;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dictionary::{Property, PropertyDictionary, PropertyRef};
use crate::error::{PersistError, PersistResult};
use crate::tree::SchemaTree;

/// One dictionary record as stored on disk, emitted in sort order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PropMapItem {
    pub iri: String,
    pub total_count: u32,
    pub sort_order: u32,
}

impl SchemaTree {
    /// Write the tree to `path`; a `.gz` suffix selects the legacy format.
    pub fn save(&self, path: &Path) -> PersistResult<()> {
        if is_legacy(path) {
            legacy::save(self, path)
        } else {
            binary::save(self, path)
        }
    }

    /// Load a tree from `path`; a `.gz` suffix selects the legacy format.
    pub fn load(path: &Path) -> PersistResult<SchemaTree> {
        if is_legacy(path) {
            legacy::load(path)
        } else {
            binary::load(path)
        }
    }
}

fn is_legacy(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Dictionary records in sort order, ready for serialization.
pub(crate) fn collect_prop_map(tree: &SchemaTree) -> Vec<PropMapItem> {
    let mut records = tree.dictionary().records();
    records.sort_unstable_by_key(|p| p.sort_order());
    records
        .iter()
        .map(|p| PropMapItem {
            iri: p.iri().to_string(),
            total_count: p.total_count(),
            sort_order: p.sort_order(),
        })
        .collect()
}

/// Rebuild the dictionary from stored records. The legacy reader passes
/// `order_from_position` because old files trusted the list position, not
/// the stored field.
pub(crate) fn restore_dictionary(
    items: &[PropMapItem],
    order_from_position: bool,
) -> (PropertyDictionary, Vec<PropertyRef>) {
    let dictionary = PropertyDictionary::new();
    let records = items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let order = if order_from_position {
                position as u32
            } else {
                item.sort_order
            };
            let record: PropertyRef =
                Arc::new(Property::restored(item.iri.clone(), item.total_count, order));
            dictionary.insert_restored(Arc::clone(&record));
            record
        })
        .collect();
    (dictionary, records)
}

/// Map a bincode failure onto the persistence error kinds: transport
/// problems stay I/O errors, everything else is a corrupt stream.
pub(crate) fn stream_error(path: &Path, err: bincode::Error) -> PersistError {
    match *err {
        bincode::ErrorKind::Io(source) => PersistError::Io {
            path: path.display().to_string(),
            source,
        },
        other => PersistError::Corrupt {
            message: other.to_string(),
        },
    }
}
