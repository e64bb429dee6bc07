/**
This modules gives a few tools to prettyprint the metrics of every class and the overall metrics,
and to export them in the format used by SeqEval.
*/
use crate::pipeline::PerformanceMetrics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

/// The reporter holds the metrics of every class and the overall metrics. It can be used to
/// display the results (i.e. prettyprint them) as if they were collected into a dataframe. The
/// reporter can be built with the `classification_report` function.
///
/// # Example
///
/// ```rust
/// use zsev::{classification_report, DivByZeroStrat};
///
/// let y_true = vec![vec!["B-TEST", "B-NOTEST", "O", "B-TEST"]];
/// let y_pred = vec![vec!["O", "B-NOTEST", "B-OTHER", "B-TEST"]];
///
/// let reporter = classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, true, false)
///     .unwrap();
///
/// let expected_report =
/// "Class, Precision, Recall, Fscore, Support
/// Overall_Weighted, 1, 0.6666667, 0.77777785, 3
/// Overall_Micro, 0.6666667, 0.6666667, 0.6666667, 3
/// Overall_Macro, 0.6666667, 0.5, 0.5555556, 3
/// NOTEST, 1, 1, 1, 1
/// OTHER, 0, 0, 0, 0
/// TEST, 1, 0.5, 0.6666667, 2\n";
///
/// assert_eq!(expected_report, reporter.to_string());
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Reporter {
    pub(crate) classes: BTreeSet<ClassMetrics>,
}

impl Reporter {
    pub(crate) fn insert(&mut self, metrics: ClassMetrics) -> bool {
        self.classes.insert(metrics)
    }

    /// Metrics of the individual classes, sorted by class name.
    pub fn classes(&self) -> impl Iterator<Item = &ClassMetrics> {
        self.classes
            .iter()
            .filter(|c| matches!(c.average, Average::None))
    }

    /// Overall metrics for the given average.
    pub fn overall(&self, average: OverallAverage) -> Option<&ClassMetrics> {
        let wanted = Average::from(average);
        self.classes.iter().find(|c| c.average == wanted)
    }
}

/// The Reporter struct acts as a dataframe when displayed.
impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Class, Precision, Recall, Fscore, Support")?;
        //Must call `.rev()` because the iter is in ascending order
        for v in self
            .classes
            .iter()
            .rev()
            .filter(|c| !matches!(c.average, Average::None))
        {
            writeln!(f, "{}", v)?
        }
        for v in self.classes() {
            writeln!(f, "{}", v)?
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// Metrics of a single class, or overall metrics when `average` is not `Average::None`. Two
/// `ClassMetrics` are equal when their class and their average are equal.
pub struct ClassMetrics {
    /// The class, such as "PER", "GEO", "MENTION", etc.
    pub class: String,
    /// The average used to compute this class' metrics
    pub average: Average,
    pub precision: f32,
    pub recall: f32,
    pub fscore: f32,
    pub support: usize,
}

impl Hash for ClassMetrics {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.class.hash(state);
        self.average.hash(state)
    }
}

impl PartialEq for ClassMetrics {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetrics {}

impl PartialOrd for ClassMetrics {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassMetrics {
    fn cmp(&self, other: &Self) -> Ordering {
        self.average
            .cmp(&other.average)
            .then_with(|| self.class.cmp(&other.class))
    }
}

impl ClassMetrics {
    pub(crate) fn new_class(
        class: String,
        precision: f32,
        recall: f32,
        fscore: f32,
        support: usize,
    ) -> Self {
        ClassMetrics {
            class,
            average: Average::None,
            precision,
            recall,
            fscore,
            support,
        }
    }

    pub(crate) fn new_overall(
        average: OverallAverage,
        precision: f32,
        recall: f32,
        fscore: f32,
        support: usize,
    ) -> Self {
        ClassMetrics {
            class: average.to_string(),
            average: average.into(),
            precision,
            recall,
            fscore,
            support,
        }
    }
}

/// The Classmetrics struct acts as a line in a dataframe when displayed.
impl Display for ClassMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}",
            self.class, self.precision, self.recall, self.fscore, self.support
        )
    }
}

/// Enumeration of the different types of averaging supported by this crate. &str can be parsed
/// to create an `Average`.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Average {
    None,
    Micro,
    Macro,
    Weighted,
}

impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Average {
    type Err = AverageParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Average::None),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            _ => Err(AverageParsingError(String::from(s))),
        }
    }
}

#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub struct AverageParsingError(String);

impl Display for AverageParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Impossible to parse the string ({}) into an Average",
            self.0
        )
    }
}
impl Error for AverageParsingError {}

/// The metrics of the classes (`Average::None`) are sorted before the overall metrics, which
/// follow the alphabetical order of their names.
impl PartialOrd for Average {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Average {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Average {
    fn rank(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Macro => 1,
            Self::Micro => 2,
            Self::Weighted => 3,
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum OverallAverage {
    Micro,
    Macro,
    Weighted,
}

impl Display for OverallAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str_content = match self {
            Self::Micro => "Overall_Micro",
            Self::Macro => "Overall_Macro",
            Self::Weighted => "Overall_Weighted",
        };
        write!(f, "{}", str_content)
    }
}

impl From<OverallAverage> for Average {
    fn from(value: OverallAverage) -> Self {
        match value {
            OverallAverage::Micro => Average::Micro,
            OverallAverage::Macro => Average::Macro,
            OverallAverage::Weighted => Average::Weighted,
        }
    }
}

/// Metrics of a single entity type, named as in SeqEval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeResults {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub number: usize,
}

/// Results of an evaluation, in the format returned by SeqEval: one entry per entity type and
/// the overall (micro averaged) metrics. The timings of the pipeline are included when a
/// pipeline was called.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResults {
    #[serde(flatten)]
    pub types: BTreeMap<String, TypeResults>,
    pub overall_precision: f32,
    pub overall_recall: f32,
    pub overall_f1: f32,
    pub overall_accuracy: f32,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceMetrics>,
    #[serde(skip)]
    pub report: Reporter,
}

impl EvaluationResults {
    pub fn new(report: Reporter, accuracy: f32) -> Self {
        let types = report
            .classes()
            .map(|c| {
                (
                    c.class.clone(),
                    TypeResults {
                        precision: c.precision,
                        recall: c.recall,
                        f1: c.fscore,
                        number: c.support,
                    },
                )
            })
            .collect();
        let (overall_precision, overall_recall, overall_f1) = report
            .overall(OverallAverage::Micro)
            .map(|m| (m.precision, m.recall, m.fscore))
            .unwrap_or_default();
        EvaluationResults {
            types,
            overall_precision,
            overall_recall,
            overall_f1,
            overall_accuracy: accuracy,
            performance: None,
            report,
        }
    }

    pub fn with_performance(mut self, performance: PerformanceMetrics) -> Self {
        self.performance = Some(performance);
        self
    }
}

impl Display for EvaluationResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.report)?;
        writeln!(f, "Accuracy, {}", self.overall_accuracy)?;
        if let Some(perf) = &self.performance {
            writeln!(f, "{}", perf)?;
        }
        Ok(())
    }
}
