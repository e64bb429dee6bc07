//! This library evaluates zero-shot token classification models and mentions extractors. The
//! predictions of a pipeline are character spans. They are snapped to the words of each sentence,
//! their overlaps are resolved and they are turned into BIO tags, which are scored against the
//! gold labels with the same metrics as SeqEval.
//!
//! Models are not run by this library: a pipeline is anything implementing `Pipeline`, such as a
//! closure or predictions recorded in a JSON lines file.
//!
//! ```rust
//! use zsev::{
//!     Dataset, EvaluatorConfig, PipelineError, RawPrediction, TokenClassificationEvaluator,
//!     ZeroShotTokenClassificationEvaluator,
//! };
//! use serde_json::json;
//!
//! let row = json!({"tokens": ["Paris", "is", "nice"], "ner_tags": ["B-LOC", "O", "O"]});
//! let dataset = Dataset::from_rows(vec![row.as_object().unwrap().clone()]);
//! let pipeline = |_: &str| -> Result<Vec<RawPrediction>, PipelineError> {
//!     Ok(vec![RawPrediction {
//!         entity: String::from("LOC"),
//!         start: 0,
//!         end: 5,
//!         score: Some(0.9),
//!         word: None,
//!     }])
//! };
//! let evaluator = ZeroShotTokenClassificationEvaluator::new(EvaluatorConfig::default());
//! let results = evaluator.evaluate(pipeline, dataset).unwrap();
//! assert_eq!(results.overall_f1, 1.0);
//! ```

mod alignment;
mod config;
mod dataset;
mod entity;
mod evaluator;
mod label;
mod metrics;
mod pipeline;
mod reporter;
mod span;

pub use alignment::{
    align_spans, filter_overlapping_spans, words_to_offsets, AlignedSpan, AlignmentError,
    AlignmentMode, FilteredSpans, ParsingAlignmentModeError, TokenOffset,
};
pub use config::{
    ConfigError, EvaluatorConfig, EvaluatorConfigBuilder, DEFAULT_INPUT_COLUMN, DEFAULT_JOIN_BY,
    DEFAULT_LABEL_COLUMN,
};
pub use dataset::{prepare_data, DataSource, Dataset, DatasetError, MetricInputs, PipelineInputs, Row};
pub use entity::{ConversionError, Entities, Entity, InvalidToken, ParsingError};
pub use evaluator::{
    relation_scores, EvaluationError, MentionsExtractorEvaluator, Relation,
    RelationExtractorEvaluator, RelationResults, TokenClassificationEvaluator,
    ZeroShotTokenClassificationEvaluator,
};
pub use label::{
    process_mention_label, process_token_classification_label, EntityMapper, EvaluationMode,
    LabelError, ParsingModeError, MENTION, OUTSIDE,
};
pub use metrics::{
    accuracy_score, classification_report, precision_recall_fscore_support, ComputationError,
    DivByZeroStrat, DivisionByZeroError, InconsistentLengthError,
    ParsingDivisionByZeroStrategyError, PrecisionRecallFScoreTrueSum,
};
pub use pipeline::{
    call_pipeline, IntoPipeline, PerformanceMetrics, Pipeline, PipelineError, RecordedPipeline,
};
pub use reporter::{
    Average, AverageParsingError, ClassMetrics, EvaluationResults, OverallAverage, Reporter,
    TypeResults,
};
pub use span::{RawPrediction, Span};
