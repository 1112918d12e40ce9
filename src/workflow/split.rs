//! Query splitting and result merging for the `splitProperty` backoff.
//!
//! A splitter partitions the query into disjoint subsets, the recommender
//! runs on each subset independently, and a merger folds the resulting
//! probability vectors back into one distribution (properties missing from
//! a subset's result count as probability 0).

use std::collections::HashMap;

use crate::dictionary::PropertyRef;
use crate::recommend::{RankedCandidate, Recommendations};

/// Partition strategy over the sorted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Splitter {
    /// Alternating positions into two subsets.
    EverySecondItem,
    /// Split at the median sort order: the frequent half and the rare half.
    TwoSupportRanges,
    /// Round-robin into `n` subsets.
    NSplitter(usize),
}

impl Splitter {
    /// Split a sorted query into disjoint, non-empty subsets. A query too
    /// small to split comes back as a single subset.
    pub fn split(&self, query: &[PropertyRef]) -> Vec<Vec<PropertyRef>> {
        let buckets = match *self {
            Splitter::EverySecondItem => 2,
            Splitter::TwoSupportRanges => {
                let mid = query.len() / 2;
                let (frequent, rare) = query.split_at(mid);
                return [frequent, rare]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .map(<[PropertyRef]>::to_vec)
                    .collect();
            }
            Splitter::NSplitter(n) => n.max(1),
        };

        let mut subsets: Vec<Vec<PropertyRef>> = vec![Vec::new(); buckets.min(query.len()).max(1)];
        let num_subsets = subsets.len();
        for (position, property) in query.iter().enumerate() {
            subsets[position % num_subsets].push(property.clone());
        }
        subsets.retain(|s| !s.is_empty());
        subsets
    }
}

impl std::fmt::Display for Splitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Splitter::EverySecondItem => write!(f, "everySecondItem"),
            Splitter::TwoSupportRanges => write!(f, "twoSupportRanges"),
            Splitter::NSplitter(n) => write!(f, "nSplitter({n})"),
        }
    }
}

/// Fold per-subset probability vectors into one distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merger {
    /// Per-property maximum over the subsets.
    Max,
    /// Per-property mean over the subsets (missing entries are 0).
    Avg,
    /// Per-property sum, each subset weighted by `|subset| / |query|`.
    WeightedSum,
}

impl Merger {
    /// Merge the per-subset results. `parts` pairs each subset with the
    /// recommendations computed on it; `query_len` is the size of the
    /// original query.
    pub fn merge(
        &self,
        parts: &[(Vec<PropertyRef>, Recommendations)],
        query_len: usize,
    ) -> Recommendations {
        let mut merged: HashMap<u32, (PropertyRef, f64)> = HashMap::new();
        for (subset, recommendations) in parts {
            let weight = match self {
                Merger::Max | Merger::Avg => 1.0,
                Merger::WeightedSum => subset.len() as f64 / query_len.max(1) as f64,
            };
            for candidate in recommendations.iter() {
                let entry = merged
                    .entry(candidate.property.sort_order())
                    .or_insert_with(|| (candidate.property.clone(), 0.0));
                match self {
                    Merger::Max => entry.1 = entry.1.max(candidate.probability),
                    Merger::Avg | Merger::WeightedSum => {
                        entry.1 += candidate.probability * weight;
                    }
                }
            }
        }

        let divisor = match self {
            Merger::Avg => parts.len().max(1) as f64,
            Merger::Max | Merger::WeightedSum => 1.0,
        };
        Recommendations::from_scored(
            merged
                .into_values()
                .map(|(property, probability)| RankedCandidate {
                    property,
                    probability: probability / divisor,
                })
                .collect(),
        )
    }
}

impl std::fmt::Display for Merger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Merger::Max => write!(f, "max"),
            Merger::Avg => write!(f, "avg"),
            Merger::WeightedSum => write!(f, "weightedSum"),
        }
    }
}
