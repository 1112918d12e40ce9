//! The `deleteLowFrequency` backoff: retry with the rarest query
//! properties removed.
//!
//! Long queries often contain a handful of rare properties that drive the
//! direct answer's support to zero or near-zero. Speculative executions
//! drop increasing numbers of the rarest properties in parallel; the winner
//! is the execution that dropped the fewest while clearing the condition
//! that invoked the backoff.

use rayon::prelude::*;
use std::sync::Arc;

use crate::dictionary::PropertyRef;
use crate::recommend::Recommendations;
use crate::tree::SchemaTree;

use super::Condition;

/// How many of the rarest properties execution `k` (1-based) removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFunction {
    /// Execution `k` drops `k` properties.
    Linear,
    /// Execution `k` drops `⌈|Q| · k / (parallel + 1)⌉` properties.
    Proportional,
}

impl StepFunction {
    pub fn drops(&self, execution: usize, query_len: usize, parallel: usize) -> usize {
        match self {
            StepFunction::Linear => execution,
            StepFunction::Proportional => {
                let share = (query_len * execution) as f64 / (parallel + 1) as f64;
                share.ceil() as usize
            }
        }
    }
}

impl std::fmt::Display for StepFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepFunction::Linear => write!(f, "linearStepsize"),
            StepFunction::Proportional => write!(f, "proportionalStepsize"),
        }
    }
}

/// Run the deletion backoff until a reduced query clears `condition` or the
/// query is exhausted.
pub(crate) fn execute(
    tree: &SchemaTree,
    query: &[PropertyRef],
    condition: &Condition,
    parallel: usize,
    step: StepFunction,
) -> Recommendations {
    let mut sorted = query.to_vec();
    sorted.sort_unstable_by_key(|p| p.sort_order());
    sorted.dedup_by(|a, b| Arc::ptr_eq(a, b));

    let len = sorted.len();
    if len == 0 {
        return tree.recommend_property(&sorted);
    }
    let parallel = parallel.max(1);

    let mut round = 0usize;
    loop {
        let mut executions: Vec<usize> = (1..=parallel)
            .map(|k| step.drops(round * parallel + k, len, parallel).clamp(1, len))
            .collect();
        executions.dedup();

        let results: Vec<(usize, Recommendations)> = executions
            .par_iter()
            .map(|&drops| {
                let reduced = &sorted[..len - drops];
                (drops, tree.recommend_property(reduced))
            })
            .collect();

        for (drops, recommendations) in &results {
            if !condition.holds(recommendations, &sorted[..len - drops]) {
                tracing::debug!(dropped = drops, "deletion backoff cleared its condition");
                return recommendations.clone();
            }
        }

        if executions.last().copied() == Some(len) {
            // Query exhausted without clearing the condition; the most
            // aggressive run (the marginal distribution) is the answer.
            let (_, recommendations) = results
                .into_iter()
                .next_back()
                .unwrap_or((len, Recommendations::default()));
            return recommendations;
        }
        round += 1;
    }
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
    fn linear_steps_grow_by_one() {
        assert_eq!(StepFunction::Linear.drops(1, 10, 4), 1);
        assert_eq!(StepFunction::Linear.drops(3, 10, 4), 3);
    }

    #[test]
    fn proportional_steps_scale_with_query() {
        assert_eq!(StepFunction::Proportional.drops(1, 10, 4), 2);
        assert_eq!(StepFunction::Proportional.drops(4, 10, 4), 8);
        assert_eq!(StepFunction::Proportional.drops(5, 10, 4), 10);
    }

    #[test]
    fn dropping_the_rarest_recovers_results() {
        // "z" never co-occurs with the rest, so {a, b, z} has zero support
        // until z (the rarest) is dropped.
        let tree = build(&[&["a", "b", "c"], &["a", "b"], &["a", "b", "c"], &["z"]]);
        let query = tree.build_property_list(&["a", "b", "z"], &[]);
        let direct = tree.recommend_property(&query);
        assert!(direct.is_empty());

        let recovered = execute(
            &tree,
            &query,
            &Condition::TooUnlikely(0.3),
            1,
            StepFunction::Linear,
        );
        // Equal to recommending on {a, b}.
        let expected = tree.recommend(&["a", "b"], &[]);
        assert_eq!(recovered.len(), expected.len());
        assert_eq!(recovered.probability_of("c"), expected.probability_of("c"));
    }

    #[test]
    fn exhausting_the_query_falls_back_to_marginals() {
        let tree = build(&[&["a"], &["b"]]);
        let query = tree.build_property_list(&["a", "b"], &[]);
        // Nothing co-occurs, and even the marginal top probability (1/2)
        // stays below the threshold, so the backoff runs out of query.
        let result = execute(
            &tree,
            &query,
            &Condition::TooUnlikely(0.9),
            2,
            StepFunction::Linear,
        );
        let marginal = tree.recommend(&[], &[]);
        assert_eq!(result.len(), marginal.len());
        assert_eq!(result.probability_of("a"), marginal.probability_of("a"));
    }

    #[test]
    fn fewest_drops_win() {
        // Dropping one property is enough; parallel executions at 1 and 2
        // drops both clear the condition, and the 1-drop result must win.
        let tree = build(&[&["a", "b", "c"], &["a", "b", "c"], &["a", "z"]]);
        let query = tree.build_property_list(&["a", "b", "z"], &[]);
        let result = execute(
            &tree,
            &query,
            &Condition::TooUnlikely(0.5),
            4,
            StepFunction::Linear,
        );
        let expected = tree.recommend(&["a", "b"], &[]);
        assert_eq!(result.probability_of("c"), expected.probability_of("c"));
    }
}
