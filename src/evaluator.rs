/**
This module contains the evaluators. An evaluator prepares the gold data, runs a pipeline on the
sentences, turns the predictions into BIO tags and scores them against the gold labels.

The token classification evaluators share the `TokenClassificationEvaluator` trait. They only
differ in how the gold labels are rewritten. The relation extractor evaluator has its own data
path: the predictions are compared as they come out of the pipeline.
*/
use crate::alignment::{filter_overlapping_spans, words_to_offsets, AlignmentError};
use crate::config::{ConfigError, EvaluatorConfig};
use crate::dataset::{self, DataSource, Dataset, DatasetError, MetricInputs, PipelineInputs};
use crate::label::{
    process_mention_label, process_token_classification_label, LabelError,
};
use crate::metrics::{
    accuracy_score, classification_report, count_ratio, ComputationError, DivByZeroStrat,
};
use crate::pipeline::{call_pipeline, IntoPipeline, PerformanceMetrics, PipelineError};
use crate::reporter::EvaluationResults;
use crate::span::{RawPrediction, Span};
use ahash::AHashSet;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    error::Error,
    fmt::{self, Display},
};

#[derive(Debug)]
/// Enum error encompassing every failure that can happen during an evaluation.
pub enum EvaluationError {
    Label(LabelError),
    Alignment(AlignmentError),
    Computation(ComputationError),
    Dataset(DatasetError),
    Pipeline(PipelineError),
    Config(ConfigError),
    /// The pipeline returned a number of predictions (second field) different from the number of
    /// sentences (first field).
    InconsistentPredictions(usize, usize),
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(err) => std::fmt::Display::fmt(err, f),
            Self::Alignment(err) => std::fmt::Display::fmt(err, f),
            Self::Computation(err) => std::fmt::Display::fmt(err, f),
            Self::Dataset(err) => std::fmt::Display::fmt(err, f),
            Self::Pipeline(err) => std::fmt::Display::fmt(err, f),
            Self::Config(err) => std::fmt::Display::fmt(err, f),
            Self::InconsistentPredictions(sentences, predictions) => write!(
                f,
                "Inconsistent number of predictions. There are {} sentences but {} predictions",
                sentences, predictions
            ),
        }
    }
}

impl Error for EvaluationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Label(err) => Some(err),
            Self::Alignment(err) => Some(err),
            Self::Computation(err) => Some(err),
            Self::Dataset(err) => Some(err),
            Self::Pipeline(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::InconsistentPredictions(_, _) => None,
        }
    }
}

impl From<LabelError> for EvaluationError {
    fn from(value: LabelError) -> Self {
        Self::Label(value)
    }
}

impl From<AlignmentError> for EvaluationError {
    fn from(value: AlignmentError) -> Self {
        Self::Alignment(value)
    }
}

impl From<ComputationError> for EvaluationError {
    fn from(value: ComputationError) -> Self {
        Self::Computation(value)
    }
}

impl From<DatasetError> for EvaluationError {
    fn from(value: DatasetError) -> Self {
        Self::Dataset(value)
    }
}

impl From<PipelineError> for EvaluationError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<ConfigError> for EvaluationError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

fn check_predictions_len<T, U>(predictions: &[T], sentences: &[U]) -> Result<(), EvaluationError> {
    if predictions.len() != sentences.len() {
        return Err(EvaluationError::InconsistentPredictions(
            sentences.len(),
            predictions.len(),
        ));
    }
    Ok(())
}

/// Evaluation of a token classification pipeline. Implementors only choose how the gold labels
/// are rewritten with `process_label`; every other step has a default implementation.
pub trait TokenClassificationEvaluator {
    fn config(&self) -> &EvaluatorConfig;

    /// Rewrites a single gold label.
    fn process_label<'a>(&self, label: &'a str) -> Result<Cow<'a, str>, LabelError>;

    /// Extracts the gold labels and the pipeline inputs from the dataset, then rewrites every
    /// gold label with `process_label`.
    fn prepare_data(
        &self,
        data: &Dataset,
        input_column: &str,
        label_column: &str,
        join_by: &str,
    ) -> Result<(MetricInputs, PipelineInputs), EvaluationError> {
        let (mut metric_inputs, pipeline_inputs) =
            dataset::prepare_data(data, input_column, label_column, join_by)?;
        metric_inputs.references = metric_inputs
            .references
            .iter()
            .map(|sent| {
                sent.iter()
                    .map(|label| self.process_label(label).map(Cow::into_owned))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<_, _>>()?;
        Ok((metric_inputs, pipeline_inputs))
    }

    /// Turns the raw predictions of every sentence into one BIO tag per word. The offsets of the
    /// predictions refer to the text `words.join(join_by)`.
    fn predictions_processor(
        &self,
        predictions: Vec<Vec<RawPrediction>>,
        sentences: &[Vec<String>],
        join_by: &str,
    ) -> Result<Vec<Vec<String>>, EvaluationError> {
        check_predictions_len(&predictions, sentences)?;
        let config = self.config();
        predictions
            .into_iter()
            .zip(sentences)
            .map(|(prediction, words)| -> Result<Vec<String>, EvaluationError> {
                let words_offsets = words_to_offsets(words, join_by);
                let prediction_spans: Vec<Span> =
                    prediction.into_iter().map(Span::from).collect();
                let filtered = filter_overlapping_spans(
                    prediction_spans,
                    words,
                    Some(&words_offsets),
                    config.alignment_mode,
                    config.mode,
                )?;
                Ok(filtered.bio)
            })
            .collect()
    }

    /// Converts the model or the pipeline given by the caller into the pipeline that is run.
    fn prepare_pipeline<M>(&self, model_or_pipeline: M) -> M::Pipeline
    where
        M: IntoPipeline<Output = Vec<RawPrediction>>,
    {
        model_or_pipeline.into_pipeline()
    }

    /// Runs the whole evaluation and returns the SeqEval results along with the timings of the
    /// pipeline.
    ///
    /// * `model_or_pipeline`: Anything that converts into a token classification pipeline
    /// * `data`: The gold dataset, or the path of a JSON lines file
    /// * `input_column`: Column holding the words of each sentence
    /// * `label_column`: Column holding the labels of each sentence
    /// * `join_by`: String used to join the words into the text given to the pipeline
    fn compute<M, D>(
        &self,
        model_or_pipeline: M,
        data: D,
        input_column: &str,
        label_column: &str,
        join_by: &str,
    ) -> Result<EvaluationResults, EvaluationError>
    where
        M: IntoPipeline<Output = Vec<RawPrediction>>,
        D: Into<DataSource>,
    {
        let data = data.into().load()?;
        info!("Evaluating {} sentences", data.len());
        let (metric_inputs, pipeline_inputs) =
            self.prepare_data(&data, input_column, label_column, join_by)?;
        let pipe = self.prepare_pipeline(model_or_pipeline);
        let (predictions, performance) = call_pipeline(&pipe, &pipeline_inputs.texts)?;
        let predictions =
            self.predictions_processor(predictions, &pipeline_inputs.words, join_by)?;
        let config = self.config();
        let report = classification_report(
            &metric_inputs.references,
            &predictions,
            config.zero_division,
            config.strict,
            config.parallel,
        )?;
        let accuracy = accuracy_score(&metric_inputs.references, &predictions)?;
        Ok(EvaluationResults::new(report, accuracy).with_performance(performance))
    }

    /// Same as `compute`, with the columns and the join string of the config.
    fn evaluate<M, D>(&self, model_or_pipeline: M, data: D) -> Result<EvaluationResults, EvaluationError>
    where
        M: IntoPipeline<Output = Vec<RawPrediction>>,
        D: Into<DataSource>,
    {
        let config = self.config();
        self.compute(
            model_or_pipeline,
            data,
            &config.input_column,
            &config.label_column,
            &config.join_by,
        )
    }
}

/// Evaluates a zero-shot named entity recognition pipeline. The gold entity types can be renamed
/// with the entity mapper of the config, and the evaluation can be done at the span or at the
/// token level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZeroShotTokenClassificationEvaluator {
    config: EvaluatorConfig,
}

impl ZeroShotTokenClassificationEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }
}

impl TokenClassificationEvaluator for ZeroShotTokenClassificationEvaluator {
    fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn process_label<'a>(&self, label: &'a str) -> Result<Cow<'a, str>, LabelError> {
        process_token_classification_label(
            label,
            self.config.mode,
            self.config.entity_mapper.as_ref(),
        )
    }
}

/// Evaluates a mentions extractor: every gold entity type becomes `MENTION`, so only the
/// boundaries of the entities are scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MentionsExtractorEvaluator {
    config: EvaluatorConfig,
}

impl MentionsExtractorEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }
}

impl TokenClassificationEvaluator for MentionsExtractorEvaluator {
    fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn process_label<'a>(&self, label: &'a str) -> Result<Cow<'a, str>, LabelError> {
        process_mention_label(
            label,
            self.config.mode,
            self.config.entity_mapper.as_ref(),
        )
    }
}

/// A relation between two spans of a sentence, such as `(Paris, capital of, France)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub head: Span,
    pub tail: Span,
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Relation {
    /// Identity of the relation inside its sentence. Labels of the spans and scores are ignored.
    fn key(&self) -> (usize, usize, usize, usize, &str) {
        (
            self.head.start,
            self.head.end,
            self.tail.start,
            self.tail.end,
            self.relation.as_str(),
        )
    }
}

/// Micro averaged scores of a relation extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationResults {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Number of gold relations
    pub number: usize,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceMetrics>,
}

impl Display for RelationResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Precision, Recall, F1, Support")?;
        writeln!(
            f,
            "{}, {}, {}, {}",
            self.precision, self.recall, self.f1, self.number
        )?;
        if let Some(perf) = &self.performance {
            writeln!(f, "{}", perf)?;
        }
        Ok(())
    }
}

/// Scores the predicted relations against the gold relations. A predicted relation is correct
/// when the same relation between the same spans exists in the gold relations of its sentence.
pub fn relation_scores(
    references: &[Vec<Relation>],
    predictions: &[Vec<Relation>],
    zero_division: DivByZeroStrat,
) -> Result<RelationResults, EvaluationError> {
    check_predictions_len(predictions, references)?;
    let (mut tp, mut pred, mut gold) = (0, 0, 0);
    for (reference, prediction) in references.iter().zip(predictions) {
        let gold_keys: AHashSet<_> = reference.iter().map(Relation::key).collect();
        let pred_keys: AHashSet<_> = prediction.iter().map(Relation::key).collect();
        tp += gold_keys.intersection(&pred_keys).count();
        pred += pred_keys.len();
        gold += gold_keys.len();
    }
    debug!(
        "{} correct relations, {} predicted, {} in the gold data",
        tp, pred, gold
    );
    let precision = count_ratio(tp, pred, zero_division)?;
    let recall = count_ratio(tp, gold, zero_division)?;
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    Ok(RelationResults {
        precision,
        recall,
        f1,
        number: gold,
        performance: None,
    })
}

/// Evaluates a relation extraction pipeline. The predictions are not processed: they are
/// compared as they come out of the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationExtractorEvaluator {
    config: EvaluatorConfig,
}

impl RelationExtractorEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Extracts the gold relations and the pipeline inputs from the dataset. The label column
    /// holds a list of relations per sentence.
    pub fn prepare_data(
        &self,
        data: &Dataset,
        input_column: &str,
        label_column: &str,
        join_by: &str,
    ) -> Result<(Vec<Vec<Relation>>, PipelineInputs), EvaluationError> {
        if data.is_empty() {
            return Err(DatasetError::EmptyDataset.into());
        }
        let references = data.deserialize_column::<Relation>(label_column)?;
        let words = data.string_column(input_column)?;
        let texts = words.iter().map(|w| w.join(join_by)).collect();
        Ok((references, PipelineInputs { words, texts }))
    }

    pub fn predictions_processor(
        &self,
        predictions: Vec<Vec<Relation>>,
        _sentences: &[Vec<String>],
    ) -> Vec<Vec<Relation>> {
        predictions
    }

    pub fn prepare_pipeline<M>(&self, model_or_pipeline: M) -> M::Pipeline
    where
        M: IntoPipeline<Output = Vec<Relation>>,
    {
        model_or_pipeline.into_pipeline()
    }

    pub fn compute<M, D>(
        &self,
        model_or_pipeline: M,
        data: D,
        input_column: &str,
        label_column: &str,
        join_by: &str,
    ) -> Result<RelationResults, EvaluationError>
    where
        M: IntoPipeline<Output = Vec<Relation>>,
        D: Into<DataSource>,
    {
        let data = data.into().load()?;
        info!("Evaluating the relations of {} sentences", data.len());
        let (references, pipeline_inputs) =
            self.prepare_data(&data, input_column, label_column, join_by)?;
        let pipe = self.prepare_pipeline(model_or_pipeline);
        let (predictions, performance) = call_pipeline(&pipe, &pipeline_inputs.texts)?;
        let predictions = self.predictions_processor(predictions, &pipeline_inputs.words);
        let results = relation_scores(&references, &predictions, self.config.zero_division)?;
        Ok(RelationResults {
            performance: Some(performance),
            ..results
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlignmentMode;
    use crate::dataset::tests::{gold_dataset, row};
    use crate::label::{EntityMapper, EvaluationMode};
    use crate::pipeline::RecordedPipeline;
    use rstest::rstest;
    use serde_json::json;

    fn prediction(entity: &str, start: usize, end: usize, score: f32) -> RawPrediction {
        RawPrediction {
            entity: String::from(entity),
            start,
            end,
            score: Some(score),
            word: None,
        }
    }

    fn recorded() -> RecordedPipeline {
        RecordedPipeline::from_iter([
            (
                "Barack Obama visited Paris",
                vec![
                    prediction("PER", 0, 12, 0.9),
                    prediction("LOC", 7, 12, 0.3),
                    prediction("LOC", 21, 26, 0.8),
                ],
            ),
            ("Hello", vec![]),
        ])
    }

    fn config(mode: EvaluationMode) -> EvaluatorConfig {
        EvaluatorConfig::builder().mode(mode).build().unwrap()
    }

    #[rstest]
    #[case(EvaluationMode::Span, "I-PER", "I-PER")]
    #[case(EvaluationMode::Token, "I-PER", "B-PER")]
    #[case(EvaluationMode::Token, "O", "O")]
    fn test_zero_shot_process_label(
        #[case] mode: EvaluationMode,
        #[case] label: &str,
        #[case] expected: &str,
    ) {
        let evaluator = ZeroShotTokenClassificationEvaluator::new(config(mode));
        assert_eq!(evaluator.process_label(label).unwrap(), expected);
    }

    #[rstest]
    #[case(EvaluationMode::Span, "I-PER", "I-MENTION")]
    #[case(EvaluationMode::Token, "I-PER", "B-MENTION")]
    #[case(EvaluationMode::Span, "O", "O")]
    fn test_mentions_process_label(
        #[case] mode: EvaluationMode,
        #[case] label: &str,
        #[case] expected: &str,
    ) {
        let evaluator = MentionsExtractorEvaluator::new(config(mode));
        assert_eq!(evaluator.process_label(label).unwrap(), expected);
    }

    #[test]
    fn test_prepare_data_rewrites_references() {
        let mapper = EntityMapper::from_iter([("PER", "person"), ("LOC", "location")]);
        let config = EvaluatorConfig::builder()
            .mode(EvaluationMode::Token)
            .entity_mapper(mapper)
            .build()
            .unwrap();
        let evaluator = ZeroShotTokenClassificationEvaluator::new(config);
        let (metric_inputs, pipeline_inputs) = evaluator
            .prepare_data(&gold_dataset(), "tokens", "ner_tags", " ")
            .unwrap();
        assert_eq!(
            metric_inputs.references[0],
            vec!["B-person", "B-person", "O", "B-location"]
        );
        assert_eq!(pipeline_inputs.texts[1], "Hello");
    }

    #[test]
    fn test_prepare_data_unmapped_entity() {
        let config = EvaluatorConfig::builder()
            .entity_mapper(EntityMapper::from_iter([("PER", "person")]))
            .build()
            .unwrap();
        let evaluator = ZeroShotTokenClassificationEvaluator::new(config);
        let res = evaluator.prepare_data(&gold_dataset(), "tokens", "ner_tags", " ");
        assert!(matches!(
            res,
            Err(EvaluationError::Label(LabelError::UnmappedEntity(e))) if e == "LOC"
        ));
    }

    #[rstest]
    #[case(EvaluationMode::Span, vec!["B-PER", "I-PER", "O", "B-LOC"])]
    #[case(EvaluationMode::Token, vec!["B-PER", "B-PER", "O", "B-LOC"])]
    fn test_predictions_processor(#[case] mode: EvaluationMode, #[case] expected: Vec<&str>) {
        let evaluator = ZeroShotTokenClassificationEvaluator::new(config(mode));
        let words: Vec<String> = ["Barack", "Obama", "visited", "Paris"]
            .into_iter()
            .map(String::from)
            .collect();
        let predictions = vec![vec![
            prediction("PER", 0, 12, 0.9),
            prediction("LOC", 7, 12, 0.3),
            prediction("LOC", 21, 26, 0.8),
        ]];
        let bio = evaluator
            .predictions_processor(predictions, &[words], " ")
            .unwrap();
        assert_eq!(bio, vec![expected]);
    }

    #[test]
    fn test_predictions_processor_inconsistent_len() {
        let evaluator = ZeroShotTokenClassificationEvaluator::default();
        let res = evaluator.predictions_processor(vec![vec![], vec![]], &[vec![]], " ");
        assert!(matches!(
            res,
            Err(EvaluationError::InconsistentPredictions(1, 2))
        ));
    }

    #[test]
    fn test_compute_perfect_predictions() {
        let evaluator = ZeroShotTokenClassificationEvaluator::default();
        let results = evaluator.evaluate(recorded(), gold_dataset()).unwrap();
        assert_eq!(results.overall_f1, 1.0);
        assert_eq!(results.overall_accuracy, 1.0);
        assert_eq!(results.types["PER"].number, 1);
        assert_eq!(results.types["LOC"].precision, 1.0);
        assert!(results.performance.is_some());
    }

    #[test]
    fn test_compute_mentions() {
        let evaluator = MentionsExtractorEvaluator::default();
        let pipeline = |text: &str| -> Result<Vec<RawPrediction>, PipelineError> {
            match text {
                "Barack Obama visited Paris" => Ok(vec![prediction("MENTION", 0, 6, 0.5)]),
                _ => Ok(vec![]),
            }
        };
        let results = evaluator
            .compute(pipeline, gold_dataset(), "tokens", "ner_tags", " ")
            .unwrap();
        // gold: (0, 2) and (3, 4), predicted: (0, 1)
        assert_eq!(results.types.len(), 1);
        assert_eq!(results.overall_precision, 0.0);
        assert_eq!(results.types["MENTION"].number, 2);
        assert!((results.overall_accuracy - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_compute_missing_prediction() {
        let evaluator = ZeroShotTokenClassificationEvaluator::default();
        let pipeline = RecordedPipeline::from_iter([("Hello", Vec::<RawPrediction>::new())]);
        let res = evaluator.evaluate(pipeline, gold_dataset());
        assert!(matches!(
            res,
            Err(EvaluationError::Pipeline(PipelineError::MissingPrediction(_)))
        ));
    }

    fn relation(head: (usize, usize), tail: (usize, usize), relation: &str) -> Relation {
        Relation {
            head: Span::new(head.0, head.1, "ENT", None),
            tail: Span::new(tail.0, tail.1, "ENT", None),
            relation: String::from(relation),
            score: None,
        }
    }

    #[test]
    fn test_relation_scores() {
        let references = vec![
            vec![relation((0, 5), (10, 16), "capital_of")],
            vec![relation((0, 3), (4, 8), "born_in")],
        ];
        let predictions = vec![
            vec![
                relation((0, 5), (10, 16), "capital_of"),
                relation((0, 5), (10, 16), "located_in"),
            ],
            vec![],
        ];
        let results =
            relation_scores(&references, &predictions, DivByZeroStrat::ReplaceBy0).unwrap();
        assert_eq!((results.precision, results.recall, results.number), (0.5, 0.5, 2));
        assert_eq!(results.f1, 0.5);
    }

    #[test]
    fn test_relation_scores_zero_division() {
        let references = vec![vec![]];
        let predictions: Vec<Vec<Relation>> = vec![vec![]];
        let res = relation_scores(&references, &predictions, DivByZeroStrat::ReturnError);
        assert!(matches!(res, Err(EvaluationError::Computation(_))));
        let results =
            relation_scores(&references, &predictions, DivByZeroStrat::ReplaceBy1).unwrap();
        assert_eq!((results.precision, results.recall, results.f1), (1.0, 1.0, 1.0));
    }

    #[test]
    fn test_relation_evaluator_passes_predictions_through() {
        let evaluator = RelationExtractorEvaluator::default();
        let dataset = Dataset::from_rows(vec![row(json!({
            "tokens": ["Paris", "is", "in", "France"],
            "relations": [{
                "head": {"start": 0, "end": 5, "label": "LOC", "score": null},
                "tail": {"start": 12, "end": 18, "label": "LOC", "score": null},
                "relation": "located_in"
            }]
        }))]);
        let pipeline = |_: &str| -> Result<Vec<Relation>, PipelineError> {
            Ok(vec![relation((0, 5), (12, 18), "located_in")])
        };
        let results = evaluator
            .compute(pipeline, dataset, "tokens", "relations", " ")
            .unwrap();
        assert_eq!((results.precision, results.recall, results.f1), (1.0, 1.0, 1.0));
        assert!(results.performance.is_some());
    }

    #[test]
    fn test_alignment_mode_is_used() {
        let config = EvaluatorConfig::builder()
            .alignment_mode(AlignmentMode::Strict)
            .build()
            .unwrap();
        let evaluator = ZeroShotTokenClassificationEvaluator::new(config);
        let words = vec![vec![String::from("Paris"), String::from("rocks")]];
        let bio = evaluator
            .predictions_processor(vec![vec![prediction("LOC", 0, 4, 0.5)]], &words, " ")
            .unwrap();
        assert_eq!(bio, vec![vec!["O", "O"]]);
    }
}
