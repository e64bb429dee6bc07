/**
This module defines what a pipeline is for the evaluators: anything turning the text of a
sentence into predictions. Models are not run by this crate. A pipeline is either provided by the
caller (a type implementing `Pipeline` or a closure) or replays predictions recorded in a JSON
lines file.
*/
use crate::span::RawPrediction;
use ahash::AHashMap;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_jsonlines::json_lines;
use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::Path,
    time::{Duration, Instant},
};

#[derive(Debug)]
pub enum PipelineError {
    Io(io::Error),
    /// No prediction was recorded for this text.
    MissingPrediction(String),
    /// The model failed on a text.
    Model(String),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Could not read the recorded predictions: {}", err),
            Self::MissingPrediction(text) => {
                write!(f, "No prediction was recorded for the text: {:?}", text)
            }
            Self::Model(msg) => write!(f, "The model failed: {}", msg),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Turns the text of a sentence into predictions. Token classification pipelines output a list
/// of `RawPrediction`.
pub trait Pipeline {
    type Output;
    fn predict(&self, text: &str) -> Result<Self::Output, PipelineError>;
}

impl<F, O> Pipeline for F
where
    F: Fn(&str) -> Result<O, PipelineError>,
{
    type Output = O;
    fn predict(&self, text: &str) -> Result<O, PipelineError> {
        self(text)
    }
}

/// Conversion into a pipeline. Every `Pipeline` (and therefore every closure with the right
/// signature) converts into itself.
pub trait IntoPipeline {
    type Output;
    type Pipeline: Pipeline<Output = Self::Output>;
    fn into_pipeline(self) -> Self::Pipeline;
}

impl<P: Pipeline> IntoPipeline for P {
    type Output = P::Output;
    type Pipeline = P;
    fn into_pipeline(self) -> P {
        self
    }
}

#[derive(Deserialize)]
struct Record<O> {
    text: String,
    predictions: O,
}

/// A pipeline replaying recorded predictions. Each line of the file is a JSON object
/// `{"text": ..., "predictions": ...}`. If a text is recorded twice, the last record wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPipeline<O = Vec<RawPrediction>> {
    records: AHashMap<String, O>,
}

impl<O: DeserializeOwned> RecordedPipeline<O> {
    pub fn from_json_lines<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let records = json_lines::<Record<O>, _>(path.as_ref())?
            .map(|r| r.map(|record| (record.text, record.predictions)))
            .collect::<io::Result<AHashMap<_, _>>>()?;
        info!(
            "Loaded the predictions of {} sentences from {}",
            records.len(),
            path.as_ref().display()
        );
        Ok(Self { records })
    }
}

impl<O> RecordedPipeline<O> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<O, S: Into<String>> FromIterator<(S, O)> for RecordedPipeline<O> {
    fn from_iter<T: IntoIterator<Item = (S, O)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().map(|(t, o)| (t.into(), o)).collect(),
        }
    }
}

impl<O: Clone> Pipeline for RecordedPipeline<O> {
    type Output = O;
    fn predict(&self, text: &str) -> Result<O, PipelineError> {
        self.records
            .get(text)
            .cloned()
            .ok_or_else(|| PipelineError::MissingPrediction(String::from(text)))
    }
}

/// Timings of a pipeline run, named as in the evaluation harness of HuggingFace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_time_in_seconds: f64,
    pub samples_per_second: f64,
    pub latency_in_seconds: f64,
}

impl PerformanceMetrics {
    pub fn new(elapsed: Duration, num_samples: usize) -> Self {
        let total = elapsed.as_secs_f64();
        let (samples_per_second, latency_in_seconds) = if num_samples == 0 || total == 0.0 {
            (0.0, 0.0)
        } else {
            (num_samples as f64 / total, total / num_samples as f64)
        };
        PerformanceMetrics {
            total_time_in_seconds: total,
            samples_per_second,
            latency_in_seconds,
        }
    }
}

impl Display for PerformanceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total time in seconds, {}\nSamples per second, {}\nLatency in seconds, {}",
            self.total_time_in_seconds, self.samples_per_second, self.latency_in_seconds
        )
    }
}

/// Runs the pipeline on every text and measures the time it takes.
pub fn call_pipeline<P: Pipeline>(
    pipeline: &P,
    texts: &[String],
) -> Result<(Vec<P::Output>, PerformanceMetrics), PipelineError> {
    let start = Instant::now();
    let outputs = texts
        .iter()
        .map(|t| pipeline.predict(t))
        .collect::<Result<Vec<_>, _>>()?;
    let performance = PerformanceMetrics::new(start.elapsed(), texts.len());
    info!(
        "Ran the pipeline on {} sentences in {:.3}s",
        texts.len(),
        performance.total_time_in_seconds
    );
    Ok((outputs, performance))
}
