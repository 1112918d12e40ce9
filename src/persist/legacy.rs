//! Legacy on-disk format: a gzip-wrapped sequential stream.
//!
//! Older releases wrote the tree as consecutive encodings with no header:
//! the property list, `min_support`, the recursive node section (sort
//! order, support, child count), and finally the typed flag, twice: an
//! integer marker followed by the bool, a historical accident this writer
//! reproduces so old loaders keep working. Two repairs apply on read: sort
//! orders are taken from list position, and a root stored under an empty
//! IRI (an old serializer bug) is rewritten to the `"root"` sentinel with a
//! warning.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::dictionary::{PropertyRef, ROOT_IRI};
use crate::error::{PersistError, PersistResult};
use crate::node::SchemaNode;
use crate::tree::SchemaTree;

use super::{collect_prop_map, restore_dictionary, stream_error, PropMapItem};

pub fn save(tree: &SchemaTree, path: &Path) -> PersistResult<()> {
    let io_err = |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = std::fs::File::create(path).map_err(io_err)?;
    let mut writer = GzEncoder::new(std::io::BufWriter::new(file), Compression::default());

    bincode::serialize_into(&mut writer, &collect_prop_map(tree))
        .map_err(|e| stream_error(path, e))?;
    bincode::serialize_into(&mut writer, &tree.min_support())
        .map_err(|e| stream_error(path, e))?;
    write_node(&mut writer, tree.root(), path)?;

    // The historical double encoding of the typed flag: an integer marker
    // (1 = typed, 2 = untyped) followed by the bool itself.
    let marker: i32 = if tree.typed() { 1 } else { 2 };
    bincode::serialize_into(&mut writer, &marker).map_err(|e| stream_error(path, e))?;
    bincode::serialize_into(&mut writer, &tree.typed()).map_err(|e| stream_error(path, e))?;

    writer.finish().map_err(io_err)?.flush().map_err(io_err)
}

fn write_node<W: Write>(
    writer: &mut W,
    node: &Arc<SchemaNode>,
    path: &Path,
) -> PersistResult<()> {
    let children = node.children();
    let header = (
        node.property().sort_order(),
        node.support(),
        children.len() as u32,
    );
    bincode::serialize_into(&mut *writer, &header).map_err(|e| stream_error(path, e))?;
    for child in &children {
        write_node(writer, child, path)?;
    }
    Ok(())
}

pub fn load(path: &Path) -> PersistResult<SchemaTree> {
    let io_err = |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;
    let mut reader = GzDecoder::new(std::io::BufReader::new(file));

    let items: Vec<PropMapItem> =
        bincode::deserialize_from(&mut reader).map_err(|e| stream_error(path, e))?;
    let (dictionary, records) = restore_dictionary(&items, true);

    let min_support: u32 =
        bincode::deserialize_from(&mut reader).map_err(|e| stream_error(path, e))?;

    let (root_order, root_support, root_child_count): (u32, u32, u32) =
        bincode::deserialize_from(&mut reader).map_err(|e| stream_error(path, e))?;
    let stored_root = lookup(&records, root_order)?;
    let root_property = if stored_root.iri() == ROOT_IRI {
        Arc::clone(stored_root)
    } else {
        // Old serializer bug: the root went out under an empty IRI. The
        // counts tied to that record are unrecoverable.
        tracing::warn!(
            stored = %stored_root.iri(),
            "legacy root node stored under the wrong IRI; rewriting to the root sentinel"
        );
        dictionary.intern(ROOT_IRI)
    };
    let root = SchemaNode::restored_root(root_property, root_support);
    for _ in 0..root_child_count {
        read_node(&mut reader, &root, &records, path)?;
    }

    // The typed flag, doubly encoded. Trust the marker; tolerate files cut
    // after it.
    let marker: i32 =
        bincode::deserialize_from(&mut reader).map_err(|e| stream_error(path, e))?;
    let typed = marker == 1;
    let _ = bincode::deserialize_from::<_, bool>(&mut reader);

    tracing::info!(
        properties = records.len(),
        subjects = root.support(),
        typed,
        "loaded legacy schema tree"
    );
    Ok(SchemaTree::from_parts(dictionary, root, min_support, typed))
}

fn lookup(records: &[PropertyRef], order: u32) -> PersistResult<&PropertyRef> {
    records
        .get(order as usize)
        .ok_or(PersistError::PropertyIndexOutOfRange {
            index: order,
            len: records.len(),
        })
}

/// Read one node and its subtree in pre-order, threading each node onto its
/// property's occurrence chain as it is created.
fn read_node<R: Read>(
    reader: &mut R,
    parent: &Arc<SchemaNode>,
    records: &[PropertyRef],
    path: &Path,
) -> PersistResult<()> {
    let (order, support, child_count): (u32, u32, u32) =
        bincode::deserialize_from(&mut *reader).map_err(|e| stream_error(path, e))?;
    let property = lookup(records, order)?;
    let node = SchemaNode::restored(Arc::clone(property), support, parent);
    parent.attach_restored_child(Arc::clone(&node));
    for _ in 0..child_count {
        read_node(reader, &node, records, path)?;
    }
    Ok(())
}
