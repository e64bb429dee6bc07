/**
This module holds the gold data of an evaluation. A dataset is a list of rows (JSON objects), read
from a JSON lines file or built in memory. Columns holding integer label ids can carry the names
of their classes, so that the ids are mapped back to the labels.
*/
use ahash::AHashMap;
use log::{info, warn};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use serde_jsonlines::json_lines;
use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::{Path, PathBuf},
};

pub type Row = Map<String, Value>;

#[derive(Debug)]
pub enum DatasetError {
    Io(io::Error),
    /// The column is missing from the row (second field).
    MissingColumn(String, usize),
    /// The value of the column is not a list in the row (second field).
    NotAList(String, usize),
    /// The column holds integer labels but no class names were given for it.
    IntegerLabelsWithoutNames(String),
    /// The label id (second field) has no class name in the column.
    UnknownClassLabel(String, u64),
    /// The column holds a value that is neither a string nor a label id, in the row (second
    /// field).
    InvalidValue(String, usize),
    /// The row (first field) has a different number of words (second field) and labels (third
    /// field).
    InconsistentLength(usize, usize, usize),
    EmptyDataset,
}

impl Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Could not read the dataset: {}", err),
            Self::MissingColumn(column, row) => {
                write!(f, "The column {} is missing from the row {}", column, row)
            }
            Self::NotAList(column, row) => write!(
                f,
                "The column {} should contain a list, which is not the case in the row {}",
                column, row
            ),
            Self::IntegerLabelsWithoutNames(column) => write!(
                f,
                "The column {} contains integer labels but no class names were given for it",
                column
            ),
            Self::UnknownClassLabel(column, id) => write!(
                f,
                "The label id {} has no class name in the column {}",
                id, column
            ),
            Self::InvalidValue(column, row) => write!(
                f,
                "The column {} contains a value that is neither a string nor a label id in the row {}",
                column, row
            ),
            Self::InconsistentLength(row, words, labels) => write!(
                f,
                "The row {} has {} words but {} labels",
                row, words, labels
            ),
            Self::EmptyDataset => write!(f, "The dataset is empty"),
        }
    }
}

impl Error for DatasetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DatasetError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    rows: Vec<Row>,
    class_labels: AHashMap<String, Vec<String>>,
}

impl Dataset {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Dataset {
            rows,
            class_labels: AHashMap::default(),
        }
    }

    /// Reads one JSON object per line.
    pub fn from_json_lines<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let rows = json_lines::<Row, _>(path.as_ref())?.collect::<io::Result<Vec<_>>>()?;
        info!(
            "Loaded {} rows from {}",
            rows.len(),
            path.as_ref().display()
        );
        Ok(Self::from_rows(rows))
    }

    /// Names of the classes of an integer label column: the id `i` is mapped to `names[i]`.
    pub fn with_class_labels<S, I>(mut self, column: S, names: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.class_labels
            .insert(column.into(), names.into_iter().map(Into::into).collect());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn to_label(&self, column: &str, row: usize, value: &Value) -> Result<String, DatasetError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => {
                let id = n
                    .as_u64()
                    .ok_or_else(|| DatasetError::InvalidValue(String::from(column), row))?;
                let names = self
                    .class_labels
                    .get(column)
                    .ok_or_else(|| DatasetError::IntegerLabelsWithoutNames(String::from(column)))?;
                usize::try_from(id)
                    .ok()
                    .and_then(|i| names.get(i))
                    .cloned()
                    .ok_or_else(|| DatasetError::UnknownClassLabel(String::from(column), id))
            }
            _ => Err(DatasetError::InvalidValue(String::from(column), row)),
        }
    }

    /// Values of a list column, as strings. Integer ids are mapped to their class names.
    pub fn string_column(&self, column: &str) -> Result<Vec<Vec<String>>, DatasetError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let values = row
                    .get(column)
                    .ok_or_else(|| DatasetError::MissingColumn(String::from(column), i))?
                    .as_array()
                    .ok_or_else(|| DatasetError::NotAList(String::from(column), i))?;
                values
                    .iter()
                    .map(|v| self.to_label(column, i, v))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// Values of a list column, deserialized into `T`.
    pub fn deserialize_column<T: DeserializeOwned>(
        &self,
        column: &str,
    ) -> Result<Vec<Vec<T>>, DatasetError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let values = row
                    .get(column)
                    .ok_or_else(|| DatasetError::MissingColumn(String::from(column), i))?;
                if !values.is_array() {
                    return Err(DatasetError::NotAList(String::from(column), i));
                }
                Vec::<T>::deserialize(values)
                    .map_err(|_| DatasetError::InvalidValue(String::from(column), i))
            })
            .collect()
    }
}

impl FromIterator<Row> for Dataset {
    fn from_iter<T: IntoIterator<Item = Row>>(iter: T) -> Self {
        Self::from_rows(iter.into_iter().collect())
    }
}

/// Where the gold data comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Dataset(Dataset),
    JsonLines(PathBuf),
}

impl DataSource {
    pub fn load(self) -> Result<Dataset, DatasetError> {
        match self {
            Self::Dataset(dataset) => Ok(dataset),
            Self::JsonLines(path) => Dataset::from_json_lines(path),
        }
    }
}

impl From<Dataset> for DataSource {
    fn from(value: Dataset) -> Self {
        Self::Dataset(value)
    }
}

impl From<PathBuf> for DataSource {
    fn from(value: PathBuf) -> Self {
        Self::JsonLines(value)
    }
}

impl From<&Path> for DataSource {
    fn from(value: &Path) -> Self {
        Self::JsonLines(value.to_path_buf())
    }
}

impl From<&str> for DataSource {
    fn from(value: &str) -> Self {
        Self::JsonLines(PathBuf::from(value))
    }
}

/// Inputs of the metric: the gold labels of every sentence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricInputs {
    pub references: Vec<Vec<String>>,
}

/// Inputs of the pipeline: the words of every sentence and the texts obtained by joining them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineInputs {
    pub words: Vec<Vec<String>>,
    pub texts: Vec<String>,
}

/// Extracts the gold labels and the pipeline inputs from the dataset. The columns must exist in
/// every row and hold lists of the same length.
///
/// * `data`: The gold dataset
/// * `input_column`: Column holding the words of each sentence
/// * `label_column`: Column holding the labels of each sentence
/// * `join_by`: String used to join the words into the text given to the pipeline
pub fn prepare_data(
    data: &Dataset,
    input_column: &str,
    label_column: &str,
    join_by: &str,
) -> Result<(MetricInputs, PipelineInputs), DatasetError> {
    if data.is_empty() {
        return Err(DatasetError::EmptyDataset);
    }
    let words = data.string_column(input_column)?;
    let references = data.string_column(label_column)?;
    for (i, (w, r)) in words.iter().zip(references.iter()).enumerate() {
        if w.len() != r.len() {
            return Err(DatasetError::InconsistentLength(i, w.len(), r.len()));
        }
        if w.is_empty() {
            warn!("The row {} has no words", i);
        }
    }
    let texts = words.iter().map(|w| w.join(join_by)).collect();
    Ok((MetricInputs { references }, PipelineInputs { words, texts }))
}
