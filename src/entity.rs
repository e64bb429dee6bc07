/**
This module parses BIO tag sequences into entities (chunks). Two parsers are available: a lenient
one, following the conlleval rules used by default by SeqEval, and a strict IOB2 one, where an
entity must start with a `B-` tag.
*/
use ahash::{AHashMap, AHashSet};
use std::{
    borrow::{Borrow, Cow},
    error::Error,
    fmt::Display,
    ops::Deref,
};

/// An entity represent a named objet in named entity recognition (NER). It contains the index of
/// its sentence, a start and an end (i.e. at what index of the sentence does it starts and ends,
/// `end` being exclusive) and a tag, such as `LOC`, `PER`, `MENTION`, etc.
#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entity<'a> {
    pub(crate) sent_id: usize,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) tag: Cow<'a, str>,
}

impl<'a> Entity<'a> {
    pub(crate) fn new(sent_id: usize, start: usize, end: usize, tag: Cow<'a, str>) -> Self {
        Entity {
            sent_id,
            start,
            end,
            tag,
        }
    }

    /// Position of the entity, without its tag.
    pub(crate) fn position(&self) -> (usize, usize, usize) {
        (self.sent_id, self.start, self.end)
    }
}

impl<'a> Display for Entity<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.sent_id, self.tag, self.start, self.end
        )
    }
}

/// Prefixes accepted in front of the tags.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
enum Prefix {
    I,
    O,
    B,
    E,
    S,
    U,
    L,
}

impl TryFrom<char> for Prefix {
    type Error = ParsingError;
    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'I' => Ok(Self::I),
            'O' => Ok(Self::O),
            'B' => Ok(Self::B),
            'E' => Ok(Self::E),
            'S' => Ok(Self::S),
            'U' => Ok(Self::U),
            'L' => Ok(Self::L),
            _ => Err(ParsingError::Prefix(String::from(value))),
        }
    }
}

impl Prefix {
    /// BILOU prefixes are read as their IOBES counterpart.
    fn normalized(self) -> Self {
        match self {
            Self::U => Self::S,
            Self::L => Self::E,
            p => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    /// The token is empty.
    EmptyToken,
    /// The first char of the token is not a valid prefix.
    Prefix(String),
}

impl Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyToken => write!(f, "Encountered an empty token"),
            Self::Prefix(prefix) => write!(
                f,
                "Could not parse the prefix ({}). Accepted prefixes are: I, O, B, E, S, U, L",
                prefix
            ),
        }
    }
}
impl Error for ParsingError {}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Token not allowed by the strict IOB2 scheme.
pub struct InvalidToken(pub String);

impl Display for InvalidToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "The token ({}) is not allowed in the IOB2 scheme. Only the `B`, `I` and `O` prefixes are",
            self.0
        )
    }
}
impl Error for InvalidToken {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    InvalidToken(InvalidToken),
    Parsing(ParsingError),
}

impl From<InvalidToken> for ConversionError {
    fn from(value: InvalidToken) -> Self {
        Self::InvalidToken(value)
    }
}

impl From<ParsingError> for ConversionError {
    fn from(value: ParsingError) -> Self {
        Self::Parsing(value)
    }
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidToken(it) => Display::fmt(it, f),
            Self::Parsing(p) => Display::fmt(p, f),
        }
    }
}
impl Error for ConversionError {}

/// Splits a token into its prefix and its tag. The tag of the outside token is `_`, as in
/// conlleval.
fn parse_token(token: &str) -> Result<(Prefix, &str), ParsingError> {
    let first = token.chars().next().ok_or(ParsingError::EmptyToken)?;
    let prefix = Prefix::try_from(first)?;
    let rest = &token[first.len_utf8()..];
    let tag = match rest.split_once('-') {
        Some((_, tag)) => tag,
        None => rest,
    };
    let tag = if tag.is_empty() { "_" } else { tag };
    Ok((prefix, tag))
}

/// Checks if a chunk ended between the previous and current word.
fn end_of_chunk(prev_prefix: Prefix, prefix: Prefix, prev_tag: &str, tag: &str) -> bool {
    match (prev_prefix, prefix) {
        (Prefix::E, _) | (Prefix::S, _) => true,
        (Prefix::B, Prefix::B) | (Prefix::B, Prefix::S) | (Prefix::B, Prefix::O) => true,
        (Prefix::I, Prefix::B) | (Prefix::I, Prefix::S) | (Prefix::I, Prefix::O) => true,
        (p, _) => p != Prefix::O && prev_tag != tag,
    }
}

/// Checks if a chunk started between the previous and current word.
fn start_of_chunk(prev_prefix: Prefix, prefix: Prefix, prev_tag: &str, tag: &str) -> bool {
    match (prev_prefix, prefix) {
        (_, Prefix::B) | (_, Prefix::S) => true,
        (Prefix::E, Prefix::E) | (Prefix::E, Prefix::I) => true,
        (Prefix::S, Prefix::E) | (Prefix::S, Prefix::I) => true,
        (Prefix::O, Prefix::E) | (Prefix::O, Prefix::I) => true,
        (_, p) => p != Prefix::O && prev_tag != tag,
    }
}

/// Leniently retrieves the entities of a single sentence.
fn lenient_chunks<'a, S: AsRef<str>>(
    sent_id: usize,
    sentence: &'a [S],
) -> Result<Vec<Entity<'a>>, ParsingError> {
    let mut entities = Vec::new();
    let mut prev_prefix = Prefix::O;
    let mut prev_tag = "_";
    let mut begin = 0;
    // A trailing outside token closes the last chunk.
    let tokens = sentence.iter().map(|t| t.as_ref()).chain(std::iter::once("O"));
    for (i, token) in tokens.enumerate() {
        let (prefix, tag) = parse_token(token)?;
        let prefix = prefix.normalized();
        if end_of_chunk(prev_prefix, prefix, prev_tag, tag) {
            entities.push(Entity::new(sent_id, begin, i, Cow::Borrowed(prev_tag)));
        }
        if start_of_chunk(prev_prefix, prefix, prev_tag, tag) {
            begin = i;
        }
        prev_prefix = prefix;
        prev_tag = tag;
    }
    Ok(entities)
}

/// Retrieves the entities of a single sentence with the strict IOB2 scheme.
fn strict_iob2_chunks<'a, S: AsRef<str>>(
    sent_id: usize,
    sentence: &'a [S],
) -> Result<Vec<Entity<'a>>, ConversionError> {
    let parsed: Vec<(Prefix, &str)> = sentence
        .iter()
        .map(|t| -> Result<(Prefix, &str), ConversionError> {
            let token = t.as_ref();
            let (prefix, tag) = parse_token(token)?;
            match prefix {
                Prefix::B | Prefix::I | Prefix::O => Ok((prefix, tag)),
                _ => Err(ConversionError::from(InvalidToken(String::from(token)))),
            }
        })
        .collect::<Result<_, _>>()?;
    let mut entities = Vec::new();
    let mut i = 0;
    while i < parsed.len() {
        let (prefix, tag) = parsed[i];
        if prefix != Prefix::B {
            i += 1;
            continue;
        }
        let mut end = i + 1;
        while end < parsed.len() && parsed[end] == (Prefix::I, tag) {
            end += 1;
        }
        entities.push(Entity::new(sent_id, i, end, Cow::Borrowed(tag)));
        i = end;
    }
    Ok(entities)
}

#[derive(Debug, PartialEq, Clone, Default)]
/// Entities contained in a list of sentences, grouped by sentence.
pub struct Entities<'a>(Vec<Vec<Entity<'a>>>);

impl<'a> Deref for Entities<'a> {
    type Target = Vec<Vec<Entity<'a>>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for Entities<'a> {
    type Item = Entity<'a>;
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Vec<Entity<'a>>>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter().flatten()
    }
}

impl<'a> Entities<'a> {
    pub(crate) fn new(entities: Vec<Vec<Entity<'a>>>) -> Self {
        Entities(entities)
    }

    /// Parses the sentences with the conlleval rules.
    pub fn lenient<S: AsRef<str>>(sentences: &'a [Vec<S>]) -> Result<Self, ParsingError> {
        let entities = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| lenient_chunks(i, s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entities))
    }

    /// Parses the sentences with the strict IOB2 scheme. Fails on `E`, `S`, `U` or `L` prefixes.
    pub fn strict<S: AsRef<str>>(sentences: &'a [Vec<S>]) -> Result<Self, ConversionError> {
        let entities = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| strict_iob2_chunks(i, s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entities))
    }

    /// Parses the sentences with the strict or the lenient parser.
    pub fn parse<S: AsRef<str>>(
        sentences: &'a [Vec<S>],
        strict: bool,
    ) -> Result<Self, ConversionError> {
        if strict {
            Self::strict(sentences)
        } else {
            Ok(Self::lenient(sentences)?)
        }
    }

    pub fn iter_flat(&self) -> impl Iterator<Item = &Entity<'a>> {
        self.0.iter().flat_map(|v| v.iter())
    }

    /// Groups the positions of the entities by tag. Duplicated entities are counted once.
    pub(crate) fn positions_by_tag(&self) -> AHashMap<&str, AHashSet<(usize, usize, usize)>> {
        let mut grouped: AHashMap<&str, AHashSet<(usize, usize, usize)>> = AHashMap::default();
        for e in self.iter_flat() {
            grouped
                .entry(e.tag.borrow())
                .or_default()
                .insert(e.position());
        }
        grouped
    }
}
