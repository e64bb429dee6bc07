/**
This module aligns character-offset spans, as produced by zero-shot models, with the words of a
sentence and resolves the overlaps between them. The result is a BIO tag sequence with one tag
per word, which can be compared with the gold labels.
*/
use crate::label::{EvaluationMode, OUTSIDE};
use crate::span::Span;
use either::Either;
use enum_iterator::{all, Sequence};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::{self, Display},
    ops::Range,
    str::FromStr,
};

/// How a span that does not fall on word boundaries is snapped to the words.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Sequence, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMode {
    /// Every word sharing at least one character with the span is covered.
    #[default]
    Expand,
    /// Only the words entirely inside the span are covered.
    Contract,
    /// The span must start at the start of a word and end at the end of a word.
    Strict,
}

impl Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expand => write!(f, "expand"),
            Self::Contract => write!(f, "contract"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingAlignmentModeError(String);

impl Display for ParsingAlignmentModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid: Vec<String> = all::<AlignmentMode>().map(|m| m.to_string()).collect();
        write!(
            f,
            "Could not parse {} into an alignment mode. Valid modes are: {}",
            self.0,
            valid.join(", ")
        )
    }
}
impl Error for ParsingAlignmentModeError {}

impl FromStr for AlignmentMode {
    type Err = ParsingAlignmentModeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expand" => Ok(Self::Expand),
            "contract" => Ok(Self::Contract),
            "strict" => Ok(Self::Strict),
            _ => Err(ParsingAlignmentModeError(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    /// The number of offsets (second field) differs from the number of words (first field).
    InconsistentOffsets(usize, usize),
}

impl Display for AlignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InconsistentOffsets(words, offsets) => write!(
                f,
                "Inconsistent number of offsets. The sentence has {} words but {} offsets were given",
                words, offsets
            ),
        }
    }
}
impl Error for AlignmentError {}

/// Character range `[start, end)` of a word inside the joined sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenOffset {
    pub start: usize,
    pub end: usize,
}

impl TokenOffset {
    pub fn new(start: usize, end: usize) -> Self {
        TokenOffset { start, end }
    }

    fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    fn intersects(&self, span: &Span) -> bool {
        !self.is_empty() && !span.is_empty() && self.start < span.end && span.start < self.end
    }

    fn is_inside(&self, span: &Span) -> bool {
        !self.is_empty() && span.start <= self.start && self.end <= span.end
    }
}

/// Computes the character offsets of every word in the sentence `words.join(join_by)`. Offsets
/// are counted in chars, not in bytes.
///
/// ```rust
/// use zsev::{words_to_offsets, TokenOffset};
///
/// let offsets = words_to_offsets(&["New", "York"], " ");
/// assert_eq!(offsets, vec![TokenOffset::new(0, 3), TokenOffset::new(4, 8)]);
/// ```
pub fn words_to_offsets<S: AsRef<str>>(words: &[S], join_by: &str) -> Vec<TokenOffset> {
    let separator_len = join_by.chars().count();
    let mut offsets = Vec::with_capacity(words.len());
    let mut start = 0;
    for word in words {
        let end = start + word.as_ref().chars().count();
        offsets.push(TokenOffset::new(start, end));
        start = end + separator_len;
    }
    offsets
}

/// A span snapped to whole words. `words` is the range of indices of the covered words.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSpan {
    pub span: Span,
    pub words: Range<usize>,
}

/// Returns the range of words covered by the span, or `None` if the span covers no word.
fn covered_words(
    span: &Span,
    offsets: &[TokenOffset],
    alignment_mode: AlignmentMode,
) -> Option<Range<usize>> {
    let mut covered = match alignment_mode {
        AlignmentMode::Strict => {
            let first = offsets
                .iter()
                .position(|o| !o.is_empty() && o.start == span.start)?;
            let last = offsets
                .iter()
                .rposition(|o| !o.is_empty() && o.end == span.end)?;
            return (first <= last).then_some(first..last + 1);
        }
        AlignmentMode::Expand => Either::Left(
            offsets
                .iter()
                .enumerate()
                .filter(|(_, o)| o.intersects(span)),
        ),
        AlignmentMode::Contract => Either::Right(
            offsets
                .iter()
                .enumerate()
                .filter(|(_, o)| o.is_inside(span)),
        ),
    }
    .map(|(i, _)| i);
    let first = covered.next()?;
    let last = covered.last().unwrap_or(first);
    Some(first..last + 1)
}

/// Snaps every span to the words of the sentence. The offsets of the returned spans are the
/// boundaries of the covered words. Spans covering no word are dropped.
pub fn align_spans(
    spans: Vec<Span>,
    offsets: &[TokenOffset],
    alignment_mode: AlignmentMode,
) -> Vec<AlignedSpan> {
    spans
        .into_iter()
        .filter_map(|span| match covered_words(&span, offsets, alignment_mode) {
            Some(words) => {
                let start = offsets[words.start].start;
                let end = offsets[words.end - 1].end;
                Some(AlignedSpan {
                    span: Span { start, end, ..span },
                    words,
                })
            }
            None => {
                debug!(
                    "Dropping span {} that cannot be aligned with the words ({} alignment)",
                    span, alignment_mode
                );
                None
            }
        })
        .collect()
}

/// Output of `filter_overlapping_spans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredSpans {
    /// Kept spans, aligned on the words and sorted by start offset.
    pub spans: Vec<Span>,
    /// One BIO tag per word.
    pub bio: Vec<String>,
}

/// Aligns the spans with the words, resolves the overlaps and builds the BIO tags of the
/// sentence.
///
/// Spans are ranked by score, then by length, then by start offset. In `Span` mode, the best
/// ranked spans are kept as long as they do not share a word with an already kept span, and
/// each kept span is tagged `B-X I-X ...`. In `Token` mode, every word takes the label of the
/// best ranked span covering it and is tagged `B-X`.
///
/// * `spans`: The predicted spans.
/// * `words`: The words of the sentence.
/// * `tokens_offsets`: Offsets of the words. Computed by joining the words with a single space
///    when `None`.
/// * `alignment_mode`: How spans are snapped to the words.
/// * `evaluation_mode`: Span or token level tagging.
///
/// ```rust
/// use zsev::{filter_overlapping_spans, AlignmentMode, EvaluationMode, Span};
///
/// let words = ["Barack", "Obama", "visited", "Paris"];
/// let spans = vec![
///     Span::new(0, 12, "PER", Some(0.9)),
///     Span::new(7, 12, "LOC", Some(0.2)),
///     Span::new(21, 26, "LOC", Some(0.8)),
/// ];
/// let filtered = filter_overlapping_spans(
///     spans,
///     &words,
///     None,
///     AlignmentMode::Expand,
///     EvaluationMode::Span,
/// )
/// .unwrap();
/// assert_eq!(filtered.bio, vec!["B-PER", "I-PER", "O", "B-LOC"]);
/// ```
pub fn filter_overlapping_spans<S: AsRef<str>>(
    spans: Vec<Span>,
    words: &[S],
    tokens_offsets: Option<&[TokenOffset]>,
    alignment_mode: AlignmentMode,
    evaluation_mode: EvaluationMode,
) -> Result<FilteredSpans, AlignmentError> {
    let default_offsets;
    let offsets = match tokens_offsets {
        Some(o) => o,
        None => {
            default_offsets = words_to_offsets(words, " ");
            &default_offsets
        }
    };
    if offsets.len() != words.len() {
        return Err(AlignmentError::InconsistentOffsets(
            words.len(),
            offsets.len(),
        ));
    }
    let mut aligned = align_spans(spans, offsets, alignment_mode);
    aligned.sort_by(|a, b| a.span.rank(&b.span));
    let mut owners: Vec<Option<usize>> = vec![None; words.len()];
    let mut kept: Vec<usize> = Vec::with_capacity(aligned.len());
    for (index, candidate) in aligned.iter().enumerate() {
        match evaluation_mode {
            EvaluationMode::Span => {
                if candidate.words.clone().any(|i| owners[i].is_some()) {
                    debug!("Dropping span {} overlapping a better span", candidate.span);
                    continue;
                }
                candidate.words.clone().for_each(|i| owners[i] = Some(index));
                kept.push(index);
            }
            EvaluationMode::Token => {
                let mut owns_a_word = false;
                for i in candidate.words.clone() {
                    if owners[i].is_none() {
                        owners[i] = Some(index);
                        owns_a_word = true;
                    }
                }
                if owns_a_word {
                    kept.push(index);
                } else {
                    debug!("Dropping span {} overlapping better spans", candidate.span);
                }
            }
        }
    }
    let bio = owners
        .iter()
        .enumerate()
        .map(|(i, owner)| match owner {
            None => String::from(OUTSIDE),
            Some(index) => {
                let candidate = &aligned[*index];
                let is_first = candidate.words.start == i;
                match (evaluation_mode, is_first) {
                    (EvaluationMode::Span, false) => format!("I-{}", candidate.span.label),
                    _ => format!("B-{}", candidate.span.label),
                }
            }
        })
        .collect();
    let mut spans: Vec<Span> = kept.into_iter().map(|i| aligned[i].span.clone()).collect();
    spans.sort_by_key(|s| (s.start, s.end));
    Ok(FilteredSpans { spans, bio })
}
