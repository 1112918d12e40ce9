//! Layered backoff workflows around the recommender.
//!
//! A workflow is an ordered list of layers, each a `(condition, procedure)`
//! pair. The base recommender runs once; the first layer whose condition
//! holds on that result executes its procedure and wins. Construction
//! always appends an unconditional terminal layer, so every query produces
//! a result.

pub mod condition;
pub mod config;
pub mod delete;
pub mod split;

pub use condition::Condition;
pub use config::WorkflowConfig;
pub use delete::StepFunction;
pub use split::{Merger, Splitter};

use rayon::prelude::*;

use crate::dictionary::PropertyRef;
use crate::recommend::Recommendations;
use crate::tree::SchemaTree;

/// A query-rewriting procedure executed when its layer's condition fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Procedure {
    /// Run the base recommender on the query unchanged.
    Standard,
    /// Split the query, recommend per subset, merge the distributions.
    SplitProperty { splitter: Splitter, merger: Merger },
    /// Re-run with the rarest query properties removed, escalating until
    /// the invoking condition clears.
    DeleteLowFrequency { parallel: usize, step: StepFunction },
}

impl Procedure {
    fn execute(
        &self,
        tree: &SchemaTree,
        query: &[PropertyRef],
        invoking: &Condition,
        base: &Recommendations,
    ) -> Recommendations {
        match *self {
            Procedure::Standard => base.clone(),
            Procedure::SplitProperty { splitter, merger } => {
                let subsets = splitter.split(query);
                let parts: Vec<(Vec<PropertyRef>, Recommendations)> = subsets
                    .into_par_iter()
                    .map(|subset| {
                        let recommendations = tree.recommend_property(&subset);
                        (subset, recommendations)
                    })
                    .collect();
                merger.merge(&parts, query.len())
            }
            Procedure::DeleteLowFrequency { parallel, step } => {
                delete::execute(tree, query, invoking, parallel, step)
            }
        }
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Procedure::Standard => write!(f, "standard"),
            Procedure::SplitProperty { splitter, merger } => {
                write!(f, "splitProperty({splitter}, {merger})")
            }
            Procedure::DeleteLowFrequency { parallel, step } => {
                write!(f, "deleteLowFrequency({step}, parallel={parallel})")
            }
        }
    }
}

/// One workflow layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub condition: Condition,
    pub procedure: Procedure,
}

impl Layer {
    pub fn new(condition: Condition, procedure: Procedure) -> Self {
        Self {
            condition,
            procedure,
        }
    }
}

/// An ordered stack of backoff layers with a guaranteed terminal fallback.
#[derive(Debug, Clone)]
pub struct Workflow {
    layers: Vec<Layer>,
}

impl Workflow {
    /// Build a workflow; unless the caller already ends with an `always`
    /// layer, the terminal `(always, standard)` fallback is appended.
    pub fn new(mut layers: Vec<Layer>) -> Self {
        let terminated = matches!(
            layers.last(),
            Some(Layer {
                condition: Condition::Always,
                ..
            })
        );
        if !terminated {
            layers.push(Layer::new(Condition::Always, Procedure::Standard));
        }
        Self { layers }
    }

    /// The trivial workflow: direct recommendation, no backoff.
    pub fn direct() -> Self {
        Self::new(Vec::new())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Recommend with backoff: run the base recommender, then let the first
    /// triggering layer rewrite the query.
    pub fn recommend(&self, tree: &SchemaTree, query: &[PropertyRef]) -> Recommendations {
        let base = tree.recommend_property(query);
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.condition.holds(&base, query) {
                tracing::debug!(
                    layer = index,
                    condition = %layer.condition,
                    procedure = %layer.procedure,
                    "backoff layer fired"
                );
                return layer.procedure.execute(tree, query, &layer.condition, &base);
            }
        }
        base
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, layer) in self.layers.iter().enumerate() {
            writeln!(f, "{index}: {} -> {}", layer.condition, layer.procedure)?;
        }
        Ok(())
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

    fn bits(recommendations: &Recommendations) -> Vec<(String, u64)> {
        recommendations
            .iter()
            .map(|c| (c.property.iri().to_string(), c.probability.to_bits()))
            .collect()
    }

    #[test]
    fn direct_workflow_equals_base_recommender() {
        let tree = build(&[&["a", "b", "c"], &["a", "b"], &["a", "c"]]);
        let query = tree.build_property_list(&["a"], &[]);
        let direct = Workflow::direct().recommend(&tree, &query);
        let base = tree.recommend_property(&query);
        assert_eq!(bits(&direct), bits(&base));
    }

    #[test]
    fn terminal_fallback_is_always_appended() {
        let workflow = Workflow::new(vec![Layer::new(
            Condition::TooUnlikely(0.5),
            Procedure::DeleteLowFrequency {
                parallel: 1,
                step: StepFunction::Linear,
            },
        )]);
        assert_eq!(workflow.layers().len(), 2);
        assert_eq!(workflow.layers()[1].condition, Condition::Always);
    }

    #[test]
    fn first_triggering_layer_wins() {
        let tree = build(&[&["a", "b"], &["a", "b"], &["a", "c"]]);
        let query = tree.build_property_list(&["a"], &[]);
        // Both layers would trigger; the first must win, and it is the
        // identity, so the result equals the base.
        let workflow = Workflow::new(vec![
            Layer::new(Condition::AboveThreshold(1), Procedure::Standard),
            Layer::new(
                Condition::AboveThreshold(1),
                Procedure::DeleteLowFrequency {
                    parallel: 1,
                    step: StepFunction::Linear,
                },
            ),
        ]);
        let result = workflow.recommend(&tree, &query);
        assert_eq!(bits(&result), bits(&tree.recommend_property(&query)));
    }

    #[test]
    fn single_bucket_split_with_max_equals_standard() {
        let tree = build(&[&["a", "b", "c"], &["a", "b"], &["b", "c"]]);
        let query = tree.build_property_list(&["a", "b"], &[]);
        let workflow = Workflow::new(vec![Layer::new(
            Condition::Always,
            Procedure::SplitProperty {
                splitter: Splitter::NSplitter(1),
                merger: Merger::Max,
            },
        )]);
        let split = workflow.recommend(&tree, &query);
        let standard = tree.recommend_property(&query);
        assert_eq!(bits(&split), bits(&standard));
    }

    #[test]
    fn deletion_layer_rewrites_unreliable_queries() {
        // Top probability on {a, b, z} is 0 (no subject has all three), so
        // tooUnlikely fires and the backoff recommends on {a, b}.
        let tree = build(&[&["a", "b", "c"], &["a", "b", "c"], &["a", "b"], &["z"]]);
        let query = tree.build_property_list(&["a", "b", "z"], &[]);
        let workflow = Workflow::new(vec![Layer::new(
            Condition::TooUnlikely(0.3),
            Procedure::DeleteLowFrequency {
                parallel: 1,
                step: StepFunction::Linear,
            },
        )]);
        let result = workflow.recommend(&tree, &query);
        let expected = tree.recommend(&["a", "b"], &[]);
        assert_eq!(bits(&result), bits(&expected));
    }

    #[test]
    fn every_query_produces_a_result() {
        let tree = build(&[&["a", "b"], &["c"]]);
        let workflow = Workflow::direct();
        for iris in [&[][..], &["a"][..], &["a", "c"][..]] {
            let query = tree.build_property_list(iris, &[]);
            // Totality: even unsatisfiable queries come back (empty is a
            // valid, non-panicking answer).
            let _ = workflow.recommend(&tree, &query);
        }
    }
}
