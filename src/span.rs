use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;

/// Raw prediction emitted by a token classification pipeline. The offsets are character offsets
/// in the sentence given to the pipeline and `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    #[serde(alias = "entity_group")]
    pub entity: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

/// A labeled range of characters, `[start, end)`, with an optional confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: Option<f32>,
}

impl Span {
    pub fn new<S: Into<String>>(start: usize, end: usize, label: S, score: Option<f32>) -> Self {
        Span {
            start,
            end,
            label: label.into(),
            score,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the two spans share at least one character.
    pub fn overlaps(&self, other: &Span) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }

    /// Ranking used to resolve overlapping spans: higher score first (missing scores last), then
    /// longer spans, then the leftmost span.
    pub(crate) fn rank(&self, other: &Span) -> Ordering {
        let by_score = match (self.score, other.score) {
            (Some(s), Some(o)) => o.partial_cmp(&s).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_score
            .then_with(|| other.len().cmp(&self.len()))
            .then_with(|| self.start.cmp(&other.start))
    }
}

impl From<RawPrediction> for Span {
    fn from(value: RawPrediction) -> Self {
        Span {
            start: value.start,
            end: value.end,
            label: value.entity,
            score: value.score,
        }
    }
}

impl From<&RawPrediction> for Span {
    fn from(value: &RawPrediction) -> Self {
        Span {
            start: value.start,
            end: value.end,
            label: value.entity.clone(),
            score: value.score,
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.score {
            Some(score) => write!(f, "({}, {}, {}, {})", self.label, self.start, self.end, score),
            None => write!(f, "({}, {}, {})", self.label, self.start, self.end),
        }
    }
}
