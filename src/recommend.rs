//! Property recommendation: ranked co-occurrence probabilities.
//!
//! Given a query property set, the recommender scores every other known
//! property `c` by `support(query ∪ {c}) / support(query)`. Instead of one
//! chain walk per candidate, a single traversal anchors at the nodes
//! carrying the query's rarest property: each matching node credits its
//! ancestors (the candidates above it) with the node's own support and its
//! descendants with theirs, which accumulates exactly the per-candidate
//! co-occurrence counts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::dictionary::PropertyRef;
use crate::tree::SchemaTree;

/// One scored candidate.
#[derive(Clone)]
pub struct RankedCandidate {
    pub property: PropertyRef,
    pub probability: f64,
}

impl std::fmt::Debug for RankedCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.property.iri(), self.probability)
    }
}

/// The full ranked distribution returned by the recommender: every property
/// with probability > 0, descending by probability, ties broken by
/// ascending sort order (more frequent first).
#[derive(Clone, Default)]
pub struct Recommendations(Vec<RankedCandidate>);

impl Recommendations {
    fn ranked<I>(mass: I, base: u64) -> Self
    where
        I: IntoIterator<Item = (PropertyRef, u64)>,
    {
        Self::from_scored(
            mass.into_iter()
                .map(|(property, count)| RankedCandidate {
                    property,
                    probability: count as f64 / base as f64,
                })
                .collect(),
        )
    }

    /// Rank pre-scored candidates: drop zero probabilities, sort descending
    /// with the sort-order tiebreak. Used by the backoff mergers.
    pub(crate) fn from_scored(mut ranked: Vec<RankedCandidate>) -> Self {
        ranked.retain(|c| c.probability > 0.0);
        ranked.sort_unstable_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then_with(|| a.property.sort_order().cmp(&b.property.sort_order()))
        });
        Self(ranked)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RankedCandidate> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[RankedCandidate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `n` most probable candidates (all of them if fewer).
    pub fn top(&self, n: usize) -> &[RankedCandidate] {
        &self.0[..self.0.len().min(n)]
    }

    /// Probability of the best candidate; 0 when there are none.
    pub fn top_probability(&self) -> f64 {
        self.0.first().map_or(0.0, |c| c.probability)
    }

    pub fn probability_of(&self, iri: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|c| c.property.iri() == iri)
            .map(|c| c.probability)
    }
}

impl std::fmt::Display for Recommendations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for candidate in &self.0 {
            writeln!(f, "{}: {}", candidate.property.iri(), candidate.probability)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Recommendations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl IntoIterator for Recommendations {
    type Item = RankedCandidate;
    type IntoIter = std::vec::IntoIter<RankedCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl SchemaTree {
    /// Rank every candidate property by its co-occurrence probability with
    /// the query.
    ///
    /// An empty query yields the marginal distribution
    /// `total_count(p) / root.support`; a query no subject satisfies yields
    /// an empty result. Query properties are never recommended back.
    pub fn recommend_property(&self, query: &[PropertyRef]) -> Recommendations {
        let mut sorted = query.to_vec();
        sorted.sort_unstable_by_key(|p| p.sort_order());
        sorted.dedup_by(|a, b| Arc::ptr_eq(a, b));

        if sorted.is_empty() {
            let base = u64::from(self.root().support());
            if base == 0 {
                return Recommendations::default();
            }
            return Recommendations::ranked(
                self.dictionary().records().into_iter().map(|p| {
                    let count = u64::from(p.total_count());
                    (p, count)
                }),
                base,
            );
        }

        let in_query: HashSet<u32> = sorted.iter().map(|p| p.sort_order()).collect();
        let rarest = &sorted[sorted.len() - 1];

        let mut base = 0u64;
        let mut mass: HashMap<u32, (PropertyRef, u64)> = HashMap::new();
        fn credit(property: &PropertyRef, amount: u64, mass: &mut HashMap<u32, (PropertyRef, u64)>) {
            mass.entry(property.sort_order())
                .or_insert_with(|| (Arc::clone(property), 0))
                .1 += amount;
        }

        for node in rarest.occurrences() {
            if !node.prefix_contains(&sorted) {
                continue;
            }
            let node_support = u64::from(node.support());
            base += node_support;

            // Every subject through this node also crossed each ancestor.
            let mut cursor = node.parent();
            while let Some(ancestor) = cursor {
                let next = ancestor.parent();
                if next.is_some() && !in_query.contains(&ancestor.property().sort_order()) {
                    credit(ancestor.property(), node_support, &mut mass);
                }
                cursor = next;
            }

            // Descendants carry only properties rarer than the query's
            // rarest, so none of them can be in the query.
            let mut stack = node.children();
            while let Some(descendant) = stack.pop() {
                credit(descendant.property(), u64::from(descendant.support()), &mut mass);
                stack.extend(descendant.children());
            }
        }

        if base == 0 {
            return Recommendations::default();
        }
        Recommendations::ranked(mass.into_values(), base)
    }

    /// String-level entry point: maps IRIs through the dictionary (unknown
    /// ones dropped, type IRIs tagged) and recommends on the result.
    pub fn recommend(&self, properties: &[&str], types: &[&str]) -> Recommendations {
        self.recommend_property(&self.build_property_list(properties, types))
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
    fn single_subject_recommends_certainty() {
        let tree = build(&[&["a", "b", "c"]]);
        let recs = tree.recommend(&["a"], &[]);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs.probability_of("b"), Some(1.0));
        assert_eq!(recs.probability_of("c"), Some(1.0));
    }

    #[test]
    fn probabilities_follow_cooccurrence() {
        let tree = build(&[&["a"], &["a"], &["a"], &["a", "b"], &["a", "b"], &["a", "b", "c"]]);
        let recs = tree.recommend(&["a"], &[]);
        assert_eq!(recs.probability_of("b"), Some(0.5));
        assert_eq!(recs.probability_of("c"), Some(1.0 / 6.0));
        assert_eq!(recs.probability_of("a"), None);
    }

    #[test]
    fn ranking_is_descending_with_order_tiebreak() {
        let tree = build(&[&["a", "b", "c"], &["a", "b", "c"], &["a", "d"]]);
        let recs = tree.recommend(&["a"], &[]);
        let iris: Vec<&str> = recs.iter().map(|c| c.property.iri()).collect();
        // b and c tie at 2/3 with equal total counts, so the sort-order
        // tiebreak (lexicographic between equal counts) decides.
        assert_eq!(iris, vec!["b", "c", "d"]);
        for pair in recs.as_slice().windows(2) {
            assert!(pair[0].probability >= pair[1].probability);
        }
    }

    #[test]
    fn query_order_does_not_matter() {
        let tree = build(&[&["a", "b", "c"], &["a", "b"], &["b", "c"], &["a", "c"]]);
        let a = tree.dictionary().lookup("a").unwrap();
        let b = tree.dictionary().lookup("b").unwrap();
        let fwd = tree.recommend_property(&[a.clone(), b.clone()]);
        let rev = tree.recommend_property(&[b, a]);
        let fwd: Vec<(String, u64)> = fwd
            .iter()
            .map(|c| (c.property.iri().to_string(), c.probability.to_bits()))
            .collect();
        let rev: Vec<(String, u64)> = rev
            .iter()
            .map(|c| (c.property.iri().to_string(), c.probability.to_bits()))
            .collect();
        assert_eq!(fwd, rev);
    }

    #[test]
    fn empty_query_yields_marginals() {
        let tree = build(&[&["a", "b"], &["a"], &["c"]]);
        let recs = tree.recommend(&[], &[]);
        assert_eq!(recs.probability_of("a"), Some(2.0 / 3.0));
        assert_eq!(recs.probability_of("b"), Some(1.0 / 3.0));
        assert_eq!(recs.probability_of("c"), Some(1.0 / 3.0));
        // The root sentinel has no occurrences and is never recommended.
        assert_eq!(recs.probability_of("root"), None);
    }

    #[test]
    fn unsatisfiable_query_is_empty() {
        let tree = build(&[&["a", "b"], &["c", "d"]]);
        let recs = tree.recommend(&["a", "d"], &[]);
        assert!(recs.is_empty());
        assert_eq!(recs.top_probability(), 0.0);
    }

    #[test]
    fn traversal_matches_per_candidate_chain_walk() {
        let tree = build(&[
            &["a", "b", "c"],
            &["a", "b", "d"],
            &["a", "c", "d"],
            &["b", "c"],
            &["a"],
            &["d", "e"],
            &["a", "b", "c", "d", "e"],
        ]);
        for query_iris in [&["a"][..], &["a", "b"][..], &["c", "d"][..], &["e"][..]] {
            let query = tree.build_property_list(query_iris, &[]);
            let base = tree.support(&query);
            let recs = tree.recommend_property(&query);
            for record in tree.dictionary().records() {
                if record.iri() == "root" || query.iter().any(|q| Arc::ptr_eq(q, &record)) {
                    continue;
                }
                let mut extended = query.clone();
                extended.push(Arc::clone(&record));
                let co = tree.support(&extended);
                let expected = if co > 0 {
                    Some(co as f64 / base as f64)
                } else {
                    None
                };
                assert_eq!(
                    recs.probability_of(record.iri()),
                    expected,
                    "candidate {} for query {:?}",
                    record.iri(),
                    query_iris
                );
            }
        }
    }

    #[test]
    fn top_truncates_without_losing_rank() {
        let tree = build(&[&["a", "b", "c", "d"]]);
        let recs = tree.recommend(&["a"], &[]);
        assert_eq!(recs.top(2).len(), 2);
        assert_eq!(recs.top(10).len(), 3);
    }

    #[test]
    fn display_lists_one_candidate_per_line() {
        let tree = build(&[&["a", "b"]]);
        let recs = tree.recommend(&["a"], &[]);
        let text = recs.to_string();
        assert_eq!(text.trim(), "b: 1");
    }
}
