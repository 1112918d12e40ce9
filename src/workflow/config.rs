//! Workflow configuration: JSON layer stacks and named presets.
//!
//! The configuration format is row-oriented: each layer names its condition
//! and backoff, plus whichever parameters those need. Unused fields stay
//! empty/zero. Everything is validated up front, before any query runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

use super::{Condition, Layer, Merger, Procedure, Splitter, StepFunction, Workflow};

/// On-disk workflow description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Path of an evaluation test set; carried along for tooling, unused
    /// by the engine itself.
    pub testset: String,
    pub layers: Vec<LayerConfig>,
}

/// One configured layer row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerConfig {
    pub condition: String,
    pub backoff: String,
    pub threshold: i64,
    pub threshold_float: f64,
    pub merger: String,
    pub splitter: String,
    pub stepsize: String,
    pub parallel_executions: i64,
}

impl WorkflowConfig {
    /// Read and parse a configuration file. Validation happens separately
    /// in [`WorkflowConfig::build`].
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })
    }

    /// Validate every layer row and assemble the workflow.
    pub fn build(&self) -> ConfigResult<Workflow> {
        let mut layers = Vec::with_capacity(self.layers.len());
        for (index, row) in self.layers.iter().enumerate() {
            layers.push(Layer::new(
                row.parse_condition(index)?,
                row.parse_backoff(index)?,
            ));
        }
        Ok(Workflow::new(layers))
    }
}

impl LayerConfig {
    fn parse_condition(&self, layer: usize) -> ConfigResult<Condition> {
        let threshold = || -> ConfigResult<usize> {
            if self.threshold < 0 {
                return Err(ConfigError::NegativeThreshold {
                    layer,
                    value: self.threshold,
                });
            }
            Ok(self.threshold as usize)
        };
        match self.condition.as_str() {
            "aboveThreshold" => Ok(Condition::AboveThreshold(threshold()?)),
            "belowThreshold" => Ok(Condition::BelowThreshold(threshold()?)),
            "tooManyRecommendations" => Ok(Condition::TooMany(threshold()?)),
            "tooUnlikelyRecommendations" => {
                if !(0.0..=1.0).contains(&self.threshold_float) {
                    return Err(ConfigError::ThresholdFloatOutOfRange {
                        layer,
                        value: self.threshold_float,
                    });
                }
                Ok(Condition::TooUnlikely(self.threshold_float))
            }
            "always" => Ok(Condition::Always),
            other => Err(ConfigError::UnknownCondition {
                layer,
                name: other.to_string(),
            }),
        }
    }

    fn parse_backoff(&self, layer: usize) -> ConfigResult<Procedure> {
        let missing = |field: &str| ConfigError::MissingField {
            layer,
            backoff: self.backoff.clone(),
            field: field.to_string(),
        };
        match self.backoff.as_str() {
            "standard" => Ok(Procedure::Standard),
            "splitProperty" => {
                if self.splitter.is_empty() {
                    return Err(missing("splitter"));
                }
                if self.merger.is_empty() {
                    return Err(missing("merger"));
                }
                Ok(Procedure::SplitProperty {
                    splitter: self.parse_splitter(layer)?,
                    merger: self.parse_merger(layer)?,
                })
            }
            "deleteLowFrequency" => {
                if self.stepsize.is_empty() {
                    return Err(missing("stepsize"));
                }
                if self.parallel_executions < 1 {
                    return Err(missing("parallelExecutions"));
                }
                Ok(Procedure::DeleteLowFrequency {
                    parallel: self.parallel_executions as usize,
                    step: self.parse_stepsize(layer)?,
                })
            }
            other => Err(ConfigError::UnknownBackoff {
                layer,
                name: other.to_string(),
            }),
        }
    }

    fn parse_splitter(&self, layer: usize) -> ConfigResult<Splitter> {
        match self.splitter.as_str() {
            "everySecondItem" => Ok(Splitter::EverySecondItem),
            "twoSupportRanges" => Ok(Splitter::TwoSupportRanges),
            // The bucket count rides in parallelExecutions, the only spare
            // integer column of the row format.
            "nSplitter" => {
                if self.parallel_executions < 2 {
                    return Err(ConfigError::MissingField {
                        layer,
                        backoff: self.backoff.clone(),
                        field: "parallelExecutions".to_string(),
                    });
                }
                Ok(Splitter::NSplitter(self.parallel_executions as usize))
            }
            other => Err(ConfigError::UnknownSplitter {
                layer,
                name: other.to_string(),
            }),
        }
    }

    fn parse_merger(&self, layer: usize) -> ConfigResult<Merger> {
        match self.merger.as_str() {
            "max" => Ok(Merger::Max),
            "avg" => Ok(Merger::Avg),
            "weightedSum" => Ok(Merger::WeightedSum),
            other => Err(ConfigError::UnknownMerger {
                layer,
                name: other.to_string(),
            }),
        }
    }

    fn parse_stepsize(&self, layer: usize) -> ConfigResult<StepFunction> {
        match self.stepsize.as_str() {
            "linearStepsize" => Ok(StepFunction::Linear),
            "proportionalStepsize" => Ok(StepFunction::Proportional),
            other => Err(ConfigError::UnknownStepsize {
                layer,
                name: other.to_string(),
            }),
        }
    }
}

/// A named, tuned layer stack.
///
/// The Wikidata stacks recover long or rare queries by first dropping rare
/// properties, then splitting if the answer is still empty; the typed
/// variant backs off earlier and splits harder because folded-in types make
/// queries longer and sparser.
pub fn preset(name: &str) -> ConfigResult<Workflow> {
    match name {
        "direct" => Ok(Workflow::direct()),
        "wikidata-property" => Ok(Workflow::new(vec![
            Layer::new(
                Condition::TooUnlikely(0.5),
                Procedure::DeleteLowFrequency {
                    parallel: 4,
                    step: StepFunction::Linear,
                },
            ),
            Layer::new(
                Condition::BelowThreshold(1),
                Procedure::SplitProperty {
                    splitter: Splitter::TwoSupportRanges,
                    merger: Merger::Avg,
                },
            ),
        ])),
        "wikidata-type-property" => Ok(Workflow::new(vec![
            Layer::new(
                Condition::TooUnlikely(0.3),
                Procedure::DeleteLowFrequency {
                    parallel: 4,
                    step: StepFunction::Proportional,
                },
            ),
            Layer::new(
                Condition::BelowThreshold(1),
                Procedure::SplitProperty {
                    splitter: Splitter::EverySecondItem,
                    merger: Merger::Max,
                },
            ),
        ])),
        other => Err(ConfigError::UnknownPreset {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_json(fields: &str) -> String {
        format!("{{ \"testset\": \"\", \"layers\": [ {{ {fields} }} ] }}")
    }

    fn parse(fields: &str) -> ConfigResult<Workflow> {
        let config: WorkflowConfig = serde_json::from_str(&layer_json(fields)).unwrap();
        config.build()
    }

    #[test]
    fn valid_delete_layer_builds() {
        let workflow = parse(
            "\"condition\": \"tooUnlikelyRecommendations\", \"thresholdFloat\": 0.4, \
             \"backoff\": \"deleteLowFrequency\", \"stepsize\": \"linearStepsize\", \
             \"parallelExecutions\": 2",
        )
        .unwrap();
        // Configured layer plus the appended terminal fallback.
        assert_eq!(workflow.layers().len(), 2);
        assert_eq!(workflow.layers()[0].condition, Condition::TooUnlikely(0.4));
        assert_eq!(
            workflow.layers()[0].procedure,
            Procedure::DeleteLowFrequency {
                parallel: 2,
                step: StepFunction::Linear
            }
        );
    }

    #[test]
    fn valid_split_layer_builds() {
        let workflow = parse(
            "\"condition\": \"aboveThreshold\", \"threshold\": 10, \
             \"backoff\": \"splitProperty\", \"splitter\": \"everySecondItem\", \
             \"merger\": \"max\"",
        )
        .unwrap();
        assert_eq!(
            workflow.layers()[0].procedure,
            Procedure::SplitProperty {
                splitter: Splitter::EverySecondItem,
                merger: Merger::Max
            }
        );
    }

    #[test]
    fn unknown_condition_is_rejected() {
        let err = parse("\"condition\": \"sometimes\", \"backoff\": \"standard\"").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCondition { .. }));
    }

    #[test]
    fn unknown_backoff_is_rejected() {
        let err = parse("\"condition\": \"always\", \"backoff\": \"giveUp\"").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackoff { .. }));
    }

    #[test]
    fn split_without_merger_is_rejected() {
        let err = parse(
            "\"condition\": \"always\", \"backoff\": \"splitProperty\", \
             \"splitter\": \"everySecondItem\"",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "merger"));
    }

    #[test]
    fn delete_without_stepsize_is_rejected() {
        let err = parse(
            "\"condition\": \"always\", \"backoff\": \"deleteLowFrequency\", \
             \"parallelExecutions\": 2",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "stepsize"));
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let err = parse(
            "\"condition\": \"aboveThreshold\", \"threshold\": -3, \"backoff\": \"standard\"",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NegativeThreshold { value: -3, .. }));
    }

    #[test]
    fn threshold_float_outside_unit_interval_is_rejected() {
        let err = parse(
            "\"condition\": \"tooUnlikelyRecommendations\", \"thresholdFloat\": 1.5, \
             \"backoff\": \"standard\"",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ThresholdFloatOutOfRange { .. }));
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.json");
        std::fs::write(
            &path,
            layer_json("\"condition\": \"always\", \"backoff\": \"standard\""),
        )
        .unwrap();
        let config = WorkflowConfig::from_file(&path).unwrap();
        let workflow = config.build().unwrap();
        assert_eq!(workflow.layers().len(), 1);
    }

    #[test]
    fn presets_are_known() {
        assert_eq!(preset("direct").unwrap().layers().len(), 1);
        assert_eq!(preset("wikidata-property").unwrap().layers().len(), 3);
        assert_eq!(preset("wikidata-type-property").unwrap().layers().len(), 3);
        assert!(matches!(
            preset("bogus"),
            Err(ConfigError::UnknownPreset { .. })
        ));
    }
}
