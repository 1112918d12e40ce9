//! Primary on-disk format: a self-describing, versioned binary encoding.
//!
//! Layout: an 8-byte magic, a little-endian `u32` version, then one bincode
//! document holding the property map in sort order, `min_support`, the
//! recursive node section (each node referencing its property by index into
//! the map), and the option flags. Children are emitted ordered by sort order, so the
//! bytes are a deterministic function of the logical tree.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dictionary::{PropertyRef, ROOT_IRI};
use crate::error::{PersistError, PersistResult};
use crate::node::SchemaNode;
use crate::tree::SchemaTree;

use super::{collect_prop_map, restore_dictionary, stream_error, PropMapItem};

const MAGIC: &[u8; 8] = b"SCHTREE\0";
const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct TreeFile {
    prop_map: Vec<PropMapItem>,
    min_support: u32,
    root: NodeRecord,
    options: Vec<TreeOption>,
}

#[derive(Serialize, Deserialize)]
struct NodeRecord {
    property_index: u32,
    support: u32,
    children: Vec<NodeRecord>,
}

/// Tree-wide flags. Decoding a flag this build does not know is a fatal
/// deserialization error, by design of the versioned format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TreeOption {
    Typed,
}

pub fn save(tree: &SchemaTree, path: &Path) -> PersistResult<()> {
    let prop_map = collect_prop_map(tree);
    let index_of: HashMap<&str, u32> = prop_map
        .iter()
        .enumerate()
        .map(|(index, item)| (item.iri.as_str(), index as u32))
        .collect();

    let file = TreeFile {
        root: encode_node(tree.root(), &index_of)?,
        min_support: tree.min_support(),
        options: if tree.typed() {
            vec![TreeOption::Typed]
        } else {
            Vec::new()
        },
        prop_map,
    };

    let io_err = |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut writer =
        std::io::BufWriter::new(std::fs::File::create(path).map_err(io_err)?);
    writer.write_all(MAGIC).map_err(io_err)?;
    writer.write_all(&VERSION.to_le_bytes()).map_err(io_err)?;
    bincode::serialize_into(&mut writer, &file).map_err(|e| stream_error(path, e))?;
    writer.flush().map_err(io_err)
}

fn encode_node(node: &Arc<SchemaNode>, index_of: &HashMap<&str, u32>) -> PersistResult<NodeRecord> {
    let property_index = index_of
        .get(node.property().iri())
        .copied()
        .ok_or_else(|| PersistError::Corrupt {
            message: format!(
                "node property {} missing from the dictionary snapshot",
                node.property().iri()
            ),
        })?;
    let children = node
        .children()
        .iter()
        .map(|child| encode_node(child, index_of))
        .collect::<PersistResult<Vec<_>>>()?;
    Ok(NodeRecord {
        property_index,
        support: node.support(),
        children,
    })
}

pub fn load(path: &Path) -> PersistResult<SchemaTree> {
    let io_err = |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut reader =
        std::io::BufReader::new(std::fs::File::open(path).map_err(io_err)?);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(io_err)?;
    if &magic != MAGIC {
        return Err(PersistError::BadMagic {
            path: path.display().to_string(),
        });
    }
    let mut version = [0u8; 4];
    reader.read_exact(&mut version).map_err(io_err)?;
    let version = u32::from_le_bytes(version);
    if version != VERSION {
        return Err(PersistError::UnsupportedVersion { version });
    }

    let file: TreeFile =
        bincode::deserialize_from(&mut reader).map_err(|e| stream_error(path, e))?;

    let (dictionary, records) = restore_dictionary(&file.prop_map, false);
    let typed = file.options.contains(&TreeOption::Typed);

    let root_property = lookup(&records, file.root.property_index)?;
    if root_property.iri() != ROOT_IRI {
        return Err(PersistError::Corrupt {
            message: format!(
                "root node carries property {:?} instead of the root sentinel",
                root_property.iri()
            ),
        });
    }
    let root = SchemaNode::restored_root(Arc::clone(root_property), file.root.support);
    decode_children(&root, &file.root.children, &records)?;

    tracing::info!(
        properties = records.len(),
        subjects = root.support(),
        typed,
        "loaded schema tree"
    );
    Ok(SchemaTree::from_parts(
        dictionary,
        root,
        file.min_support,
        typed,
    ))
}

fn lookup(records: &[PropertyRef], index: u32) -> PersistResult<&PropertyRef> {
    records
        .get(index as usize)
        .ok_or(PersistError::PropertyIndexOutOfRange {
            index,
            len: records.len(),
        })
}

/// Rebuild the subtree below `parent` in pre-order, threading each node
/// onto its property's occurrence chain as it is created.
fn decode_children(
    parent: &Arc<SchemaNode>,
    children: &[NodeRecord],
    records: &[PropertyRef],
) -> PersistResult<()> {
    for record in children {
        let property = lookup(records, record.property_index)?;
        let node = SchemaNode::restored(Arc::clone(property), record.support, parent);
        parent.attach_restored_child(Arc::clone(&node));
        decode_children(&node, &record.children, records)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::SubjectSummary;
    use crate::dictionary::PropertyDictionary;

    fn summary(dict: &PropertyDictionary, iris: &[&str]) -> SubjectSummary {
        let mut properties = std::collections::HashMap::new();
        for iri in iris {
            *properties.entry(dict.intern(iri)).or_insert(0) += 1;
        }
        SubjectSummary {
            subject_iri: "urn:test".into(),
            num_occurrences: iris.len() as u32,
            properties,
        }
    }

    fn build(subjects: &[&[&str]]) -> SchemaTree {
        let tree = SchemaTree::new(false, 1);
        for subject in subjects {
            for property in summary(tree.dictionary(), subject).properties.keys() {
                property.increment_count();
            }
        }
        tree.dictionary().recompute_sort_order();
        for subject in subjects {
            tree.insert(&summary(tree.dictionary(), subject));
        }
        tree
    }

    #[test]
    fn round_trip_preserves_supports_and_chains() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.schema");
        let tree = build(&[&["a", "b", "c"], &["a", "b"], &["b", "c"], &["a"]]);
        save(&tree, &path).unwrap();

        let restored = load(&path).unwrap();
        assert_eq!(restored.subject_count(), 4);
        assert_eq!(restored.typed(), tree.typed());
        assert_eq!(restored.min_support(), tree.min_support());

        for record in tree.dictionary().records() {
            let original = record.occurrences().count();
            let loaded = restored
                .dictionary()
                .lookup(record.iri())
                .unwrap()
                .occurrences()
                .count();
            assert_eq!(original, loaded, "{}", record.iri());
        }

        let query = restored.build_property_list(&["a"], &[]);
        assert_eq!(restored.support(&query), 3);
    }

    #[test]
    fn save_load_save_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.schema");
        let second = dir.path().join("two.schema");
        let tree = build(&[&["a", "b", "c"], &["c", "b"], &["a", "c"], &["b"]]);

        save(&tree, &first).unwrap();
        let restored = load(&first).unwrap();
        save(&restored, &second).unwrap();

        let one = std::fs::read(&first).unwrap();
        let two = std::fs::read(&second).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn typed_flag_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typed.schema");
        let tree = SchemaTree::new(true, 3);
        tree.dictionary().recompute_sort_order();
        save(&tree, &path).unwrap();
        let restored = load(&path).unwrap();
        assert!(restored.typed());
        assert_eq!(restored.min_support(), 3);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-tree.schema");
        std::fs::write(&path, b"definitely not a schema tree").unwrap();
        assert!(matches!(load(&path), Err(PersistError::BadMagic { .. })));
    }

    #[test]
    fn future_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.schema");
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            load(&path),
            Err(PersistError::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.schema");
        let tree = build(&[&["a", "b"]]);
        save(&tree, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let truncated = dir.path().join("truncated.schema");
        std::fs::write(&truncated, &bytes[..bytes.len() - 4]).unwrap();
        assert!(load(&truncated).is_err());
    }
}
