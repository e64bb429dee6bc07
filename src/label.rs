/**
This module rewrites the gold labels of a dataset so that they can be compared with the labels
produced from the predictions of a zero-shot model. Three rewrites are supported: renaming the
entity type with an `EntityMapper`, collapsing the `I-` prefix into `B-` when evaluating at the
token level and collapsing every entity type into a single `MENTION` type when evaluating a
mentions extractor.
*/
use ahash::AHashMap;
use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    error::Error,
    fmt::{self, Display},
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

/// Label given to the tokens outside of any entity.
pub const OUTSIDE: &str = "O";
/// Entity type used by the mentions extractor evaluation.
pub const MENTION: &str = "MENTION";

/// Granularity of the evaluation. In `Span` mode, an entity is a chunk of consecutive words and
/// must match exactly. In `Token` mode, every word is its own entity: each labeled word is tagged
/// with a `B-` prefix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Sequence, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    #[default]
    Span,
    Token,
}

impl Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Span => write!(f, "span"),
            Self::Token => write!(f, "token"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingModeError(String);

impl Display for ParsingModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid: Vec<String> = all::<EvaluationMode>().map(|m| m.to_string()).collect();
        write!(
            f,
            "Could not parse {} into an evaluation mode. Valid modes are: {}",
            self.0,
            valid.join(", ")
        )
    }
}
impl Error for ParsingModeError {}

impl FromStr for EvaluationMode {
    type Err = ParsingModeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "span" => Ok(Self::Span),
            "token" => Ok(Self::Token),
            _ => Err(ParsingModeError(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Errors raised while rewriting a label.
pub enum LabelError {
    /// The label is neither `O` nor of the form `<prefix>-<type>`.
    Malformed(String),
    /// The entity type of the label is missing from the `EntityMapper`.
    UnmappedEntity(String),
}

impl Display for LabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(label) => write!(
                f,
                "The label ({}) is malformed. Expected `O` or `<prefix>-<type>`",
                label
            ),
            Self::UnmappedEntity(entity) => write!(
                f,
                "The entity type ({}) is not present in the entity mapper",
                entity
            ),
        }
    }
}
impl Error for LabelError {}

/// Maps the entity types of the gold labels to the entity types given to the zero-shot model,
/// e.g. `PER` -> `person`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMapper(AHashMap<String, String>);

impl EntityMapper {
    pub fn new(mapping: AHashMap<String, String>) -> Self {
        Self(mapping)
    }

    /// Reads a JSON object (`{"PER": "person", ...}`) from a file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn get(&self, entity: &str) -> Result<&str, LabelError> {
        self.0
            .get(entity)
            .map(String::as_str)
            .ok_or_else(|| LabelError::UnmappedEntity(String::from(entity)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EntityMapper {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Splits a label into its prefix and its entity type. The prefix is a single character
/// followed by `-`.
pub(crate) fn split_label(label: &str) -> Result<(&str, &str), LabelError> {
    let mut chars = label.char_indices();
    match (chars.next(), chars.next()) {
        (Some(_), Some((i, '-'))) => Ok((&label[..i], &label[i + 1..])),
        _ => Err(LabelError::Malformed(String::from(label))),
    }
}

/// Substitutes the entity type of `label` with the one given by the mapper. The label is
/// returned untouched if there is no mapper.
fn map_entity<'a>(
    label: &'a str,
    mapper: Option<&EntityMapper>,
) -> Result<Cow<'a, str>, LabelError> {
    let (prefix, entity) = split_label(label)?;
    match mapper {
        None => Ok(Cow::Borrowed(label)),
        Some(m) => Ok(Cow::Owned(format!("{}-{}", prefix, m.get(entity)?))),
    }
}

/// Rewrites a gold label for the evaluation of a zero-shot token classifier.
///
/// * `label`: The gold label, such as `B-PER` or `O`.
/// * `mode`: In `Token` mode, `I-` prefixes are turned into `B-` prefixes.
/// * `mapper`: Optional renaming of the entity types.
///
/// ```rust
/// use zsev::{process_token_classification_label, EvaluationMode};
///
/// let label = process_token_classification_label("I-PER", EvaluationMode::Token, None).unwrap();
/// assert_eq!(label, "B-PER");
/// ```
pub fn process_token_classification_label<'a>(
    label: &'a str,
    mode: EvaluationMode,
    mapper: Option<&EntityMapper>,
) -> Result<Cow<'a, str>, LabelError> {
    if label == OUTSIDE {
        return Ok(Cow::Borrowed(label));
    }
    let mapped = map_entity(label, mapper)?;
    let (prefix, entity) = split_label(&mapped)?;
    if prefix == "I" && mode == EvaluationMode::Token {
        return Ok(Cow::Owned(format!("B-{}", entity)));
    }
    Ok(mapped)
}

/// Rewrites a gold label for the evaluation of a mentions extractor. Every entity type becomes
/// `MENTION`. In `Span` mode the `B-`/`I-` prefix is kept, otherwise the label is `B-MENTION`.
///
/// ```rust
/// use zsev::{process_mention_label, EvaluationMode};
///
/// let label = process_mention_label("I-PER", EvaluationMode::Span, None).unwrap();
/// assert_eq!(label, "I-MENTION");
/// ```
pub fn process_mention_label<'a>(
    label: &'a str,
    mode: EvaluationMode,
    mapper: Option<&EntityMapper>,
) -> Result<Cow<'a, str>, LabelError> {
    if label == OUTSIDE {
        return Ok(Cow::Borrowed(label));
    }
    // The mapper still validates the entity type, even if the type is discarded afterwards.
    let mapped = map_entity(label, mapper)?;
    let (prefix, _) = split_label(&mapped)?;
    match (prefix, mode) {
        ("B", EvaluationMode::Span) | ("I", EvaluationMode::Span) => {
            Ok(Cow::Owned(format!("{}-{}", prefix, MENTION)))
        }
        _ => Ok(Cow::Owned(format!("B-{}", MENTION))),
    }
}
