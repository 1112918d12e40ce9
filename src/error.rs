//! Rich diagnostic error types for the schematree crate.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the schematree crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source errors) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SchemaTreeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Corpus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("failed to open corpus {path}: {source}")]
    #[diagnostic(
        code(schematree::corpus::open),
        help(
            "Check that the corpus file exists and is readable. \
             Gzip-compressed corpora must carry a .gz suffix to be \
             decompressed transparently."
        )
    )]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while streaming corpus {path}: {source}")]
    #[diagnostic(
        code(schematree::corpus::read),
        help(
            "The corpus could not be read to the end. The file may be \
             truncated or the disk unreadable. Counts gathered so far are \
             discarded; re-run the build once the file is intact."
        )
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(schematree::persist::io),
        help("Check that the path exists, has correct permissions, and the disk is not full.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a schematree file (bad magic)")]
    #[diagnostic(
        code(schematree::persist::bad_magic),
        help(
            "The file does not start with the schematree header. Trees written \
             by older releases use the gzip-wrapped legacy encoding and are \
             recognised by their .gz suffix."
        )
    )]
    BadMagic { path: String },

    #[error("unsupported tree file version {version}")]
    #[diagnostic(
        code(schematree::persist::version),
        help("This build reads version 1 tree files. Rebuild the tree from the corpus.")
    )]
    UnsupportedVersion { version: u32 },

    #[error("corrupt tree file: {message}")]
    #[diagnostic(
        code(schematree::persist::corrupt),
        help(
            "The stream ended early or contained an unknown option flag. \
             The load was aborted; no partially-restored tree is returned."
        )
    )]
    Corrupt { message: String },

    #[error("node references property index {index} but the file lists {len} properties")]
    #[diagnostic(
        code(schematree::persist::property_index),
        help("The property map and the node section of the file disagree. The file is corrupt.")
    )]
    PropertyIndexOutOfRange { index: u32, len: usize },
}

// ---------------------------------------------------------------------------
// Workflow configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read workflow config {path}: {source}")]
    #[diagnostic(
        code(schematree::config::io),
        help("Check that the configuration file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow config is not valid JSON: {message}")]
    #[diagnostic(
        code(schematree::config::parse),
        help("The file must contain a JSON object with a \"layers\" array.")
    )]
    Parse { message: String },

    #[error("layer {layer}: unknown condition \"{name}\"")]
    #[diagnostic(
        code(schematree::config::condition),
        help(
            "Known conditions: aboveThreshold, belowThreshold, \
             tooUnlikelyRecommendations, tooManyRecommendations, always."
        )
    )]
    UnknownCondition { layer: usize, name: String },

    #[error("layer {layer}: unknown backoff \"{name}\"")]
    #[diagnostic(
        code(schematree::config::backoff),
        help("Known backoffs: standard, splitProperty, deleteLowFrequency.")
    )]
    UnknownBackoff { layer: usize, name: String },

    #[error("layer {layer}: unknown splitter \"{name}\"")]
    #[diagnostic(
        code(schematree::config::splitter),
        help("Known splitters: everySecondItem, twoSupportRanges, nSplitter.")
    )]
    UnknownSplitter { layer: usize, name: String },

    #[error("layer {layer}: unknown merger \"{name}\"")]
    #[diagnostic(
        code(schematree::config::merger),
        help("Known mergers: max, avg, weightedSum.")
    )]
    UnknownMerger { layer: usize, name: String },

    #[error("layer {layer}: unknown stepsize \"{name}\"")]
    #[diagnostic(
        code(schematree::config::stepsize),
        help("Known stepsize functions: linearStepsize, proportionalStepsize.")
    )]
    UnknownStepsize { layer: usize, name: String },

    #[error("layer {layer}: backoff \"{backoff}\" requires the \"{field}\" field")]
    #[diagnostic(
        code(schematree::config::missing_field),
        help(
            "splitProperty needs splitter and merger; deleteLowFrequency needs \
             stepsize and a positive parallelExecutions."
        )
    )]
    MissingField {
        layer: usize,
        backoff: String,
        field: String,
    },

    #[error("layer {layer}: threshold {value} is negative")]
    #[diagnostic(
        code(schematree::config::threshold),
        help("Integer thresholds must be non-negative.")
    )]
    NegativeThreshold { layer: usize, value: i64 },

    #[error("layer {layer}: thresholdFloat {value} is outside [0, 1]")]
    #[diagnostic(
        code(schematree::config::threshold_float),
        help("Probability thresholds are compared against recommendation probabilities.")
    )]
    ThresholdFloatOutOfRange { layer: usize, value: f64 },

    #[error("unknown workflow preset \"{name}\"")]
    #[diagnostic(
        code(schematree::config::preset),
        help("Known presets: direct, wikidata-property, wikidata-type-property.")
    )]
    UnknownPreset { name: String },
}

/// Convenience alias for functions returning schematree results.
pub type TreeResult<T> = std::result::Result<T, SchemaTreeError>;

/// Result type for corpus operations.
pub type CorpusResult<T> = std::result::Result<T, CorpusError>;

/// Result type for persistence operations.
pub type PersistResult<T> = std::result::Result<T, PersistError>;

/// Result type for workflow configuration.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
