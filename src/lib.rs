//! # schematree
//!
//! A probabilistic model of property co-occurrence over a semantic
//! knowledge base, and a recommender on top of it. The central structure is
//! the schema tree: a compressed prefix trie over frequency-ordered
//! property sequences, in the spirit of an FP-tree from frequent-pattern
//! mining.
//!
//! ## Architecture
//!
//! - **Dictionary** (`dictionary`): interned property records with global
//!   frequencies and a descending-frequency sort order
//! - **Tree** (`node`, `tree`): concurrent two-pass trie construction and
//!   exact support queries via per-property occurrence chains
//! - **Recommender** (`recommend`): ranked co-occurrence probabilities from
//!   a single chain-anchored traversal
//! - **Backoff** (`workflow`): layered condition/procedure stacks that
//!   rewrite long or rare queries (splitting, low-frequency deletion)
//! - **Persistence** (`persist`): the versioned binary format plus the
//!   gzip-wrapped legacy encoding
//!
//! ## Library usage
//!
//! ```no_run
//! use std::path::Path;
//! use schematree::tree::SchemaTree;
//!
//! # fn main() -> miette::Result<()> {
//! let tree = SchemaTree::create(Path::new("corpus.nt"), 0, false, 1)?;
//! let recommendations = tree.recommend(&["http://example.org/birthDate"], &[]);
//! for candidate in recommendations.top(10) {
//!     println!("{}: {:.4}", candidate.property.iri(), candidate.probability);
//! }
//! # Ok(())
//! # }
//! ```

pub mod corpus;
pub mod dictionary;
pub mod error;
pub mod node;
pub mod persist;
pub mod recommend;
pub mod tree;
pub mod workflow;

pub use error::{SchemaTreeError, TreeResult};
pub use recommend::{RankedCandidate, Recommendations};
pub use tree::SchemaTree;
