/*
 * This modules contains the `EvaluatorConfig` struct, which implements the default trait, and its
 * builder. The config gathers every knob of an evaluation: how the labels are rewritten, how the
 * predicted spans are aligned with the words, where the data lives in the dataset and how the
 * metrics are computed.
*/
use crate::alignment::AlignmentMode;
use crate::label::{EntityMapper, EvaluationMode};
use crate::metrics::DivByZeroStrat;
use either::Either as LeftOrRight;
use std::{
    error::Error,
    fmt::{self, Debug, Display},
    path::PathBuf,
};

/// Default column holding the words of each sentence.
pub const DEFAULT_INPUT_COLUMN: &str = "tokens";
/// Default column holding the gold labels of each sentence.
pub const DEFAULT_LABEL_COLUMN: &str = "ner_tags";
/// Default string used to join the words into the text given to the pipeline.
pub const DEFAULT_JOIN_BY: &str = " ";

#[derive(Clone, Debug, PartialEq)]
/// Config struct used to simplify the inputs of the evaluators. It implements the default trait.
pub struct EvaluatorConfig {
    /// Span or token level evaluation.
    pub mode: EvaluationMode,
    /// How the predicted spans are snapped to the words.
    pub alignment_mode: AlignmentMode,
    /// Renaming of the gold entity types into the entity types known by the model.
    pub entity_mapper: Option<EntityMapper>,
    /// String used to join the words of a sentence.
    pub join_by: String,
    pub input_column: String,
    pub label_column: String,
    /// Parse the entities with the strict IOB2 rules instead of the conlleval rules.
    pub strict: bool,
    /// This parameter describe what to do when we encounter a division by zero when computing
    /// precision and recall. The most common solution is to replace the results by 0.
    pub zero_division: DivByZeroStrat,
    /// Can we use multiple cores to compute the metrics? In practice, the computations are
    /// rarely large enough to benefit from it.
    pub parallel: bool,
}

impl EvaluatorConfig {
    pub fn new() -> Self {
        Self {
            mode: EvaluationMode::default(),
            alignment_mode: AlignmentMode::default(),
            entity_mapper: None,
            join_by: String::from(DEFAULT_JOIN_BY),
            input_column: String::from(DEFAULT_INPUT_COLUMN),
            label_column: String::from(DEFAULT_LABEL_COLUMN),
            strict: false,
            zero_division: DivByZeroStrat::ReplaceBy0,
            parallel: false,
        }
    }

    pub fn builder() -> EvaluatorConfigBuilder {
        EvaluatorConfigBuilder::new()
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EvaluatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mapper = match &self.entity_mapper {
            Some(m) => format!("{} entity types", m.len()),
            None => String::from("none"),
        };
        write!(
            f,
            "Evaluation mode: {}\n Alignment mode: {}\n Entity mapper: {}\n Words joined by: {:?}\n Input column: {}\n Label column: {}\n Strict entities: {}\n Strategy when encountering a division by zero: {}\n Using parallel computations: {}",
            self.mode,
            self.alignment_mode,
            mapper,
            self.join_by,
            self.input_column,
            self.label_column,
            self.strict,
            self.zero_division,
            self.parallel
        )
    }
}

#[derive(Debug)]
/// The entity mapper file could not be read or is not a JSON object of strings.
pub struct ConfigError {
    path: PathBuf,
    source: std::io::Error,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not load the entity mapper from {}: {}",
            self.path.display(),
            self.source
        )
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// This builder can be used to build and customize an `EvaluatorConfig` stucture. The entity
/// mapper can be given directly or as the path of a JSON file, which is read by `build`.
#[derive(Debug, Clone)]
pub struct EvaluatorConfigBuilder {
    config: EvaluatorConfig,
    entity_mapper: Option<LeftOrRight<EntityMapper, PathBuf>>,
}

impl Default for EvaluatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorConfigBuilder {
    pub fn mode(mut self, mode: EvaluationMode) -> Self {
        self.config.mode = mode;
        self
    }
    pub fn alignment_mode(mut self, alignment_mode: AlignmentMode) -> Self {
        self.config.alignment_mode = alignment_mode;
        self
    }
    pub fn entity_mapper(mut self, entity_mapper: EntityMapper) -> Self {
        self.entity_mapper = Some(LeftOrRight::Left(entity_mapper));
        self
    }
    pub fn entity_mapper_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.entity_mapper = Some(LeftOrRight::Right(path.into()));
        self
    }
    pub fn join_by<S: Into<String>>(mut self, join_by: S) -> Self {
        self.config.join_by = join_by.into();
        self
    }
    pub fn input_column<S: Into<String>>(mut self, input_column: S) -> Self {
        self.config.input_column = input_column.into();
        self
    }
    pub fn label_column<S: Into<String>>(mut self, label_column: S) -> Self {
        self.config.label_column = label_column.into();
        self
    }
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }
    pub fn division_by_zero<Z: Into<DivByZeroStrat>>(mut self, division_by_zero: Z) -> Self {
        self.config.zero_division = division_by_zero.into();
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }
    pub fn new() -> Self {
        Self {
            config: EvaluatorConfig::new(),
            entity_mapper: None,
        }
    }
    pub fn build(self) -> Result<EvaluatorConfig, ConfigError> {
        let entity_mapper = match self.entity_mapper {
            None => None,
            Some(LeftOrRight::Left(mapper)) => Some(mapper),
            Some(LeftOrRight::Right(path)) => match EntityMapper::from_json_file(&path) {
                Ok(mapper) => Some(mapper),
                Err(source) => return Err(ConfigError { path, source }),
            },
        };
        Ok(EvaluatorConfig {
            entity_mapper,
            ..self.config
        })
    }
}
