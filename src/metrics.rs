/**
This module computes the metrics (precision, recall, f-score, support) of a ground-truth
sequence and a predicted sequence. The entities are compared as whole chunks, as done by SeqEval.
*/
use crate::entity::{ConversionError, Entities, InvalidToken, ParsingError};
use crate::reporter::{Average, ClassMetrics, OverallAverage, Reporter};
use core::fmt;
use itertools::multizip;
use log::{debug, warn};
use ndarray::{prelude::*, Array, Data, ScalarOperand, Zip};
use ndarray_stats::{errors::MultiInputError, SummaryStatisticsExt};
use num::{Float, Num, NumCast};
use std::{
    collections::BTreeSet,
    error::Error,
    fmt::{Debug, Display},
    str::FromStr,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNotUniqueOrEmpty(usize);

impl Display for ArrayNotUniqueOrEmpty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "This array contains more than one element or is empty. It has length: {} Cannot call `item` on it", self.0
        )
    }
}
impl Error for ArrayNotUniqueOrEmpty {}

trait ItemArrayExt<Output> {
    /// Returns the element out of the Array. Can return an error if the array is empty of if the
    /// array has a length superior to 1.
    fn item(&self) -> Result<Output, ArrayNotUniqueOrEmpty>;
}

impl<F: Clone, T: Data<Elem = F>> ItemArrayExt<F> for ArrayBase<T, Ix1> {
    fn item(&self) -> Result<F, ArrayNotUniqueOrEmpty> {
        match self.len() {
            1 => self.first().cloned().ok_or(ArrayNotUniqueOrEmpty(1)),
            n => Err(ArrayNotUniqueOrEmpty(n)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How do we handle cases with a division by zero? Do we set the metric to 1, return an error,
/// or set the metric to 0? SeqEval uses by default the `ReplaceBy0` strategy. The `ReturnError`
/// strategy stops the computation. It can be useful if you believe there should be no 0 in the
/// denominator.
pub enum DivByZeroStrat {
    /// The metric is set to `1` when its denominator is `0`
    ReplaceBy1,
    /// Returns an error
    ReturnError,
    /// The metric is set to `0` when its denominator is `0`
    #[default]
    ReplaceBy0,
}

impl Display for DivByZeroStrat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingDivisionByZeroStrategyError(String);

impl Display for ParsingDivisionByZeroStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not parse {} into a `DivByZeroStrat`. Valid values are: replaceby0, replaceby1, returnerror",
            self.0
        )
    }
}
impl Error for ParsingDivisionByZeroStrategyError {}

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivisionByZeroStrategyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "replaceby1" | "replacebyone" | "1" => Ok(DivByZeroStrat::ReplaceBy1),
            "replaceby0" | "replacebyzero" | "0" => Ok(DivByZeroStrat::ReplaceBy0),
            "returnerror" | "error" => Ok(DivByZeroStrat::ReturnError),
            _ => Err(ParsingDivisionByZeroStrategyError(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivisionByZeroError;

impl Display for DivisionByZeroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encountered division by zero")
    }
}

impl Error for DivisionByZeroError {}

/// Internal extension trait for Num's Float trait
pub trait FloatExt: Float + Send + Sync + Clone + ScalarOperand + Debug {}

impl<T: Float + Send + Sync + Clone + Copy + ScalarOperand + Debug> FloatExt for T {}

fn prf_divide<I: Debug + Num + Clone + Send + Sync + Copy, D: Dimension>(
    numerator: ArcArray<I, D>,
    denominator: ArrayViewMut<I, D>,
    parallel: bool,
    zero_division: DivByZeroStrat,
) -> Result<ArcArray<I, D>, DivisionByZeroError> {
    let (result, zero_mask) = if parallel {
        par_prf_divide_results_and_mask(numerator, denominator)
    } else {
        prf_divide_results_and_mask(numerator, denominator)
    };
    if zero_mask.iter().all(|m| *m != I::zero()) {
        return Ok(result);
    }
    match zero_division {
        DivByZeroStrat::ReturnError => Err(DivisionByZeroError),
        DivByZeroStrat::ReplaceBy1 => Ok(replace_masked(result, &zero_mask, I::one(), parallel)),
        DivByZeroStrat::ReplaceBy0 => Ok(result * zero_mask),
    }
}

/// Ratio of two counts, following the zero division strategy.
pub(crate) fn count_ratio(
    numerator: usize,
    denominator: usize,
    zero_division: DivByZeroStrat,
) -> Result<f32, ComputationError> {
    let mut denominator = array![denominator as f32];
    let ratio = prf_divide(
        array![numerator as f32].into_shared(),
        denominator.view_mut(),
        false,
        zero_division,
    )?;
    Ok(ratio.item()?)
}

#[derive(Debug, PartialEq, Clone, Copy)]
/// Error type to represent when two lists or arrays are not of the
/// same length (when they should be).
pub struct InconsistentLengthError(pub usize, pub usize);

impl Display for InconsistentLengthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inconsistent length between two lists. `y_true` is length {}, `y_pred` is length {}",
            self.0, self.1
        )
    }
}
impl Error for InconsistentLengthError {}

fn check_for_empty_slices<T>(y_true: &[T], y_pred: &[T]) -> Result<(), ComputationError> {
    if y_true.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_true")));
    };
    if y_pred.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_pred")));
    };
    Ok(())
}

pub(crate) fn check_consistent_length<T>(
    y_true: &[Vec<T>],
    y_pred: &[Vec<T>],
) -> Result<(), InconsistentLengthError> {
    if y_true.len() != y_pred.len() {
        return Err(InconsistentLengthError(y_true.len(), y_pred.len()));
    }
    for (t, p) in y_true.iter().zip(y_pred) {
        if t.len() != p.len() {
            return Err(InconsistentLengthError(t.len(), p.len()));
        }
    }
    Ok(())
}

/// Sorted tags, predicted sum, true positive sum and true sum
type TagsPredTPTrue<'b> = (Vec<&'b str>, Array1<usize>, Array1<usize>, Array1<usize>);

fn extract_tp_actual_correct<'b>(
    entities_true: &'b Entities<'_>,
    entities_pred: &'b Entities<'_>,
) -> TagsPredTPTrue<'b> {
    let entities_true_init = entities_true.positions_by_tag();
    let entities_pred_init = entities_pred.positions_by_tag();
    let target_names: BTreeSet<&str> = entities_true_init
        .keys()
        .chain(entities_pred_init.keys())
        .copied()
        .collect();
    let size = target_names.len();
    let mut tp_sum = Vec::with_capacity(size);
    let mut pred_sum = Vec::with_capacity(size);
    let mut true_sum = Vec::with_capacity(size);

    for type_name in target_names.iter() {
        let true_set = entities_true_init.get(type_name);
        let pred_set = entities_pred_init.get(type_name);
        true_sum.push(true_set.map(|s| s.len()).unwrap_or(0));
        pred_sum.push(pred_set.map(|s| s.len()).unwrap_or(0));
        let tp = match (true_set, pred_set) {
            (Some(t), Some(p)) => t.intersection(p).count(),
            _ => 0,
        };
        tp_sum.push(tp);
    }
    (
        target_names.into_iter().collect(),
        Array::from(pred_sum),
        Array::from(tp_sum),
        Array::from(true_sum),
    )
}

#[derive(Debug, Clone, PartialEq)]
/// Enum error encompassing many type of failures that could happen when computing the precison,
/// recall, f-score and the support.
pub enum ComputationError {
    BetaNotPositive,
    InconsistentLength(InconsistentLengthError),
    Conversion(ConversionError),
    DivisionByZero(DivisionByZeroError),
    InputError(MultiInputError),
    EmptyOrNotUnique(ArrayNotUniqueOrEmpty),
    EmptyInput(String),
}

impl Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BetaNotPositive => write!(f, "Beta value is not positive"),
            Self::InconsistentLength(length_err) => std::fmt::Display::fmt(length_err, f),
            Self::Conversion(conv_err) => std::fmt::Display::fmt(conv_err, f),
            Self::DivisionByZero(div_err) => std::fmt::Display::fmt(div_err, f),
            Self::InputError(input_err) => std::fmt::Display::fmt(input_err, f),
            Self::EmptyOrNotUnique(size_err) => std::fmt::Display::fmt(size_err, f),
            Self::EmptyInput(which) => write!(f, "Received an empty input {}", which),
        }
    }
}
impl Error for ComputationError {}

impl From<ParsingError> for ComputationError {
    fn from(value: ParsingError) -> Self {
        Self::Conversion(ConversionError::from(value))
    }
}

impl From<InvalidToken> for ComputationError {
    fn from(value: InvalidToken) -> Self {
        Self::Conversion(ConversionError::from(value))
    }
}

impl From<InconsistentLengthError> for ComputationError {
    fn from(value: InconsistentLengthError) -> Self {
        Self::InconsistentLength(value)
    }
}

impl From<ConversionError> for ComputationError {
    fn from(value: ConversionError) -> Self {
        Self::Conversion(value)
    }
}

impl From<DivisionByZeroError> for ComputationError {
    fn from(value: DivisionByZeroError) -> Self {
        Self::DivisionByZero(value)
    }
}

impl From<MultiInputError> for ComputationError {
    fn from(value: MultiInputError) -> Self {
        Self::InputError(value)
    }
}

impl From<ArrayNotUniqueOrEmpty> for ComputationError {
    fn from(value: ArrayNotUniqueOrEmpty) -> Self {
        Self::EmptyOrNotUnique(value)
    }
}

/// Type alias for representing the output of the `precision_recall_fscore_support`. Each arrays
/// contain a vector of f32. The first array contains the precision, the second the recall, the
/// third the f-score and the last one the support.
pub type PrecisionRecallFScoreTrueSum = (Array1<f32>, Array1<f32>, Array1<f32>, Array1<usize>);

/// Computes the precision, recall, fscore and support of the true and predicted tags. With
/// `Average::None`, the arrays hold one value per entity type, in the lexicographic order of the
/// types. Otherwise, they hold a single value.
///
/// * `y_true`: True tags, one vector per sentence
/// * `y_pred`: Predicted tags, one vector per sentence
/// * `beta`: Value of the `beta` parameter of the fscore. `beta=1` for F1 and `beta=0.5` for F0.5.
/// * `average`: What type of average to use.
/// * `zero_division`: What to do in case of division by zero.
/// * `strict`: Parse the entities with the strict IOB2 rules instead of the conlleval rules.
/// * `parallel`: Can we use multiple cores for computations?
pub fn precision_recall_fscore_support<S: AsRef<str>, F: FloatExt>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
    beta: F,
    average: Average,
    zero_division: DivByZeroStrat,
    strict: bool,
    parallel: bool,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    check_for_empty_slices(y_true, y_pred)?;
    check_consistent_length(y_true, y_pred)?;
    let entities_true = Entities::parse(y_true, strict)?;
    let entities_pred = Entities::parse(y_pred, strict)?;
    precision_recall_fscore_support_inner(
        &entities_true,
        &entities_pred,
        beta,
        average,
        zero_division,
        parallel,
    )
}

/// Value of an average taken over no class at all.
fn undefined_average(
    zero_division: DivByZeroStrat,
    support: usize,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    let value = match zero_division {
        DivByZeroStrat::ReturnError => {
            return Err(ComputationError::DivisionByZero(DivisionByZeroError))
        }
        DivByZeroStrat::ReplaceBy1 => 1.0,
        DivByZeroStrat::ReplaceBy0 => 0.0,
    };
    Ok((array![value], array![value], array![value], array![support]))
}

fn precision_recall_fscore_support_inner<F: FloatExt>(
    entities_true: &Entities,
    entities_pred: &Entities,
    beta: F,
    average: Average,
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    if beta.is_sign_negative() || beta.is_nan() {
        return Err(ComputationError::BetaNotPositive);
    };
    let (_, mut pred_sum, mut tp_sum, mut true_sum) =
        extract_tp_actual_correct(entities_true, entities_pred);
    let beta2 = beta.powi(2);
    if matches!(average, Average::Micro) {
        tp_sum = array![tp_sum.sum()];
        pred_sum = array![pred_sum.sum()];
        true_sum = array![true_sum.sum()];
    };
    let arc_tp_sum = tp_sum.mapv(|x| x as f32).to_shared();
    let precision = prf_divide(
        arc_tp_sum.clone(), // ArcArray are (often) inexpensive to clone.
        pred_sum.mapv(|x| x as f32).view_mut(),
        parallel,
        zero_division,
    )?;
    let recall = prf_divide(
        arc_tp_sum,
        true_sum.mapv(|x| x as f32).view_mut(),
        parallel,
        zero_division,
    )?;
    let beta2_cast: f32 = <f32 as NumCast>::from(beta2).ok_or(ComputationError::BetaNotPositive)?;
    let f_score: ArcArray<f32, Ix1> = if beta2_cast.is_infinite() {
        recall.clone()
    } else {
        let denom = precision.mapv(|p| beta2_cast * p).to_shared() + recall.view();
        let denom_non_zero = if parallel {
            par_replace(denom, 0.0, 1.0)
        } else {
            replace(denom, 0.0, 1.0)
        };
        (1.0 + beta2_cast) * precision.clone() * recall.view() / denom_non_zero
    };
    match average {
        Average::None | Average::Micro => Ok((
            precision.into_owned(),
            recall.into_owned(),
            f_score.into_owned(),
            true_sum,
        )),
        Average::Weighted => {
            let support = true_sum.sum();
            if support == 0 {
                debug!("No true entity, the weighted average is undefined");
                return undefined_average(zero_division, support);
            };
            let weights = true_sum.mapv(|x| x as f32).into_shared();
            let final_precision = array![precision.weighted_mean(&weights)?];
            let final_recall = array![recall.weighted_mean(&weights)?];
            let final_f_score = array![f_score.weighted_mean(&weights)?];
            Ok((final_precision, final_recall, final_f_score, array![support]))
        }
        Average::Macro => {
            let support = true_sum.sum();
            match (precision.mean(), recall.mean(), f_score.mean()) {
                (Some(p), Some(r), Some(f)) => Ok((array![p], array![r], array![f], array![support])),
                _ => {
                    debug!("No entity at all, the macro average is undefined");
                    undefined_average(zero_division, support)
                }
            }
        }
    }
}

/// This function computes the result in parallel. For a synchronous
/// version of this function, see `prf_divide_results_and_mask`.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: Denominator of the division
fn par_prf_divide_results_and_mask<I: Debug + Num + Clone + Send + Sync, D: Dimension>(
    numerator: ArcArray<I, D>,
    mut denominator: ArrayViewMut<I, D>,
) -> (ArcArray<I, D>, Array<I, D>) {
    let zero_at_mask = Zip::from(&mut denominator).par_map_collect(|d| {
        if *d == I::zero() {
            I::zero()
        } else {
            I::one()
        }
    });
    denominator.par_mapv_inplace(|v| if v == I::zero() { I::one() } else { v });
    (numerator / denominator, zero_at_mask)
}

/// This function computes the result synchronously. For a parallel
/// version of this function, see `par_prf_divide_results_and_mask`.
///
/// * `numerator`: Numerator of the division
/// * `denominator`: Denominator of the division
fn prf_divide_results_and_mask<I: Debug + Num + Clone, D: Dimension>(
    numerator: ArcArray<I, D>,
    mut denominator: ArrayViewMut<I, D>,
) -> (ArcArray<I, D>, Array<I, D>) {
    let zero_at_mask =
        Zip::from(&mut denominator)
            .map_collect(|d| if *d == I::zero() { I::zero() } else { I::one() });
    denominator.mapv_inplace(|v| if v == I::zero() { I::one() } else { v });
    (numerator / denominator, zero_at_mask)
}

/// Sets the values of `array` to `new_value` wherever the mask is zero.
fn replace_masked<I: Num + Copy + Send + Sync, D: Dimension>(
    mut array: ArcArray<I, D>,
    mask: &Array<I, D>,
    new_value: I,
    parallel: bool,
) -> ArcArray<I, D> {
    let zip = Zip::from(&mut array).and(mask);
    let fill = |v: &mut I, m: &I| {
        if *m == I::zero() {
            *v = new_value
        }
    };
    if parallel {
        zip.par_for_each(fill);
    } else {
        zip.for_each(fill);
    }
    array
}

/// Helper function to replace values from an array.
fn replace<Data: PartialEq + Copy, D: Dimension>(
    mut array: ArcArray<Data, D>,
    replaced: Data,
    new_value: Data,
) -> ArcArray<Data, D> {
    array.mapv_inplace(|v| if v == replaced { new_value } else { v });
    array
}

/// Helper function to replace values from an array in parallel.
fn par_replace<Data: PartialEq + Send + Sync + Copy, D: Dimension>(
    mut array: ArcArray<Data, D>,
    replaced: Data,
    new_value: Data,
) -> ArcArray<Data, D> {
    array.par_mapv_inplace(|v| if v == replaced { new_value } else { v });
    array
}

/// Computes the precision, recall, fscore and support of every entity type found in the true or
/// the predicted tags, along with the micro, macro and weighted averages. The returned structure
/// can be used to prettyprint the results or to build `EvaluationResults`.
///
/// * `y_true`: True tags, one vector per sentence
/// * `y_pred`: Predicted tags, one vector per sentence
/// * `zero_division`: What to do in case of division by zero.
/// * `strict`: Parse the entities with the strict IOB2 rules instead of the conlleval rules.
/// * `parallel`: Can we use multiple cores for matrix computations?
pub fn classification_report<S: AsRef<str>>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
    zero_division: DivByZeroStrat,
    strict: bool,
    parallel: bool,
) -> Result<Reporter, ComputationError> {
    check_for_empty_slices(y_true, y_pred)?;
    check_consistent_length(y_true, y_pred)?;
    let entities_true = Entities::parse(y_true, strict)?;
    let entities_pred = Entities::parse(y_pred, strict)?;
    let (target_names, _, _, _) = extract_tp_actual_correct(&entities_true, &entities_pred);
    if target_names.is_empty() {
        warn!("No entity found in the true or the predicted tags");
    }
    let (p, r, f1, s) = precision_recall_fscore_support_inner::<f32>(
        &entities_true,
        &entities_pred,
        1.0,
        Average::None,
        zero_division,
        parallel,
    )?;
    let mut reporter = Reporter::default();
    for (name, precision, recall, fscore, support) in multizip((
        target_names.into_iter(),
        p.into_iter(),
        r.into_iter(),
        f1.into_iter(),
        s.into_iter(),
    )) {
        reporter.insert(ClassMetrics::new_class(
            String::from(name),
            precision,
            recall,
            fscore,
            support,
        ));
    }
    for avg in [
        OverallAverage::Micro,
        OverallAverage::Macro,
        OverallAverage::Weighted,
    ] {
        let (p, r, f1, s) = precision_recall_fscore_support_inner::<f32>(
            &entities_true,
            &entities_pred,
            1.0,
            avg.into(),
            zero_division,
            parallel,
        )?;
        reporter.insert(ClassMetrics::new_overall(
            avg,
            p.item()?,
            r.item()?,
            f1.item()?,
            s.item()?,
        ));
    }
    Ok(reporter)
}

/// Fraction of the tags that are correctly predicted, over every sentence. The accuracy is 0 when
/// every sentence is empty.
///
/// ```rust
/// use zsev::accuracy_score;
///
/// let y_true = vec![vec!["B-PER", "I-PER", "O"]];
/// let y_pred = vec![vec!["B-PER", "O", "O"]];
/// let accuracy = accuracy_score(&y_true, &y_pred).unwrap();
/// assert!((accuracy - 2.0 / 3.0).abs() < 1e-6);
/// ```
pub fn accuracy_score<S: AsRef<str>>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
) -> Result<f32, ComputationError> {
    check_for_empty_slices(y_true, y_pred)?;
    check_consistent_length(y_true, y_pred)?;
    let (correct, total) = y_true
        .iter()
        .flatten()
        .zip(y_pred.iter().flatten())
        .fold((0usize, 0usize), |(correct, total), (t, p)| {
            let hit = if t.as_ref() == p.as_ref() { 1 } else { 0 };
            (correct + hit, total + 1)
        });
    if total == 0 {
        warn!("Every sentence is empty, the accuracy is set to 0");
        return Ok(0.0);
    }
    Ok(correct as f32 / total as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::{to_str_vecs, TokensToTest};
    use quickcheck::{QuickCheck, TestResult};
    use rstest::rstest;

    pub trait CloseEnough {
        fn are_close(&self, other: &Self, eps: f32) -> bool;
    }

    // ClassMetrics does not have the default PartialEq implementation.
    impl CloseEnough for ClassMetrics {
        fn are_close(&self, other: &Self, eps: f32) -> bool {
            self == other
                && f32::abs(self.precision - other.precision) < eps
                && f32::abs(self.recall - other.recall) < eps
                && f32::abs(self.fscore - other.fscore) < eps
                && self.support == other.support
        }
    }

    impl CloseEnough for Reporter {
        fn are_close(&self, other: &Self, eps: f32) -> bool {
            self.classes.len() == other.classes.len()
                && self
                    .classes
                    .iter()
                    .zip(other.classes.iter())
                    .all(|(c1, c2)| c1.are_close(c2, eps))
        }
    }

    fn misc_per() -> (Vec<Vec<&'static str>>, Vec<Vec<&'static str>>) {
        let y_true = vec![
            vec!["O", "O", "O", "B-MISC", "I-MISC", "I-MISC", "O"],
            vec!["B-PER", "I-PER", "O"],
        ];
        let y_pred = vec![
            vec!["O", "O", "B-MISC", "I-MISC", "I-MISC", "I-MISC", "O"],
            vec!["B-PER", "I-PER", "O"],
        ];
        (y_true, y_pred)
    }

    #[test]
    fn test_reporter_output() {
        let y_true = vec![vec!["B-A", "B-B", "O", "B-A"]];
        let y_pred = vec![vec!["O", "B-B", "B-C", "B-A"]];
        let actual =
            classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, true, false)
                .unwrap();
        let expected = Reporter {
            classes: BTreeSet::from_iter(vec![
                ClassMetrics::new_class(String::from("A"), 1.0, 0.5, 0.6666666666666666, 2),
                ClassMetrics::new_class(String::from("B"), 1.0, 1.0, 1.0, 1),
                ClassMetrics::new_class(String::from("C"), 0.0, 0.0, 0.0, 0),
                ClassMetrics::new_overall(
                    OverallAverage::Macro,
                    0.66666666666666,
                    0.5,
                    0.55555555555555,
                    3,
                ),
                ClassMetrics::new_overall(
                    OverallAverage::Micro,
                    0.66666666666666,
                    0.66666666666666,
                    0.66666666666666,
                    3,
                ),
                ClassMetrics::new_overall(
                    OverallAverage::Weighted,
                    1.0,
                    0.66666666666666,
                    0.77777777777777,
                    3,
                ),
            ]),
        };
        assert!(actual.are_close(&expected, 1e-6));
    }

    #[test]
    fn test_classification_report() {
        let (y_true, y_pred) = misc_per();
        let reporter =
            classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, true, true)
                .unwrap();
        // NOTE: Do not change the indentation
        let expected = "Class, Precision, Recall, Fscore, Support
Overall_Weighted, 0.5, 0.5, 0.5, 2
Overall_Micro, 0.5, 0.5, 0.5, 2
Overall_Macro, 0.5, 0.5, 0.5, 2
MISC, 0, 0, 0, 1
PER, 1, 1, 1, 1\n";
        assert_eq!(reporter.to_string(), expected);
    }

    #[test]
    fn test_classification_report_inconsistent_length() {
        let test_cases: Vec<(Vec<Vec<&str>>, Vec<Vec<&str>>, ComputationError)> = vec![
            (
                vec![vec!["B-PER"], vec!["I-PER"]],
                vec![vec![]],
                ComputationError::InconsistentLength(InconsistentLengthError(2, 1)),
            ),
            (
                vec![vec![]],
                vec![],
                ComputationError::EmptyInput(String::from("y_pred")),
            ),
            (
                vec![vec!["O", "B-PER"]],
                vec![vec!["O"]],
                ComputationError::InconsistentLength(InconsistentLengthError(2, 1)),
            ),
        ];
        for (y_true, y_pred, expected) in test_cases {
            let actual =
                classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy1, false, true);
            assert_eq!(actual, Err(expected))
        }
    }

    #[test]
    fn test_classification_report_without_entities() {
        let y_true = vec![vec!["O", "O"]];
        let y_pred = vec![vec!["O", "O"]];
        let reporter =
            classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, false, false)
                .unwrap();
        assert_eq!(reporter.classes().count(), 0);
        let micro = reporter.overall(OverallAverage::Micro).unwrap();
        assert_eq!((micro.precision, micro.support), (0.0, 0));
        let erroring =
            classification_report(&y_true, &y_pred, DivByZeroStrat::ReturnError, false, false);
        assert_eq!(
            erroring,
            Err(ComputationError::DivisionByZero(DivisionByZeroError))
        );
    }

    #[test]
    fn test_entities_do_not_match_across_sentences() {
        let y_true = vec![vec!["B-PER", "O"], vec!["O", "O"]];
        let y_pred = vec![vec!["O", "O"], vec!["B-PER", "O"]];
        let (p, r, _, s) = precision_recall_fscore_support(
            &y_true,
            &y_pred,
            1.0,
            Average::Micro,
            DivByZeroStrat::ReplaceBy0,
            false,
            false,
        )
        .unwrap();
        assert_eq!((p[0], r[0], s[0]), (0.0, 0.0, 1));
    }

    #[test]
    fn test_par_divide_results_and_mask() {
        let numerator = array![[1., 2., 4., 5.]].into_shared();
        let mut cloned = numerator.clone();
        let mut same_cloned = numerator.clone();
        let (div_result, zero_mask) =
            prf_divide_results_and_mask(numerator.clone(), same_cloned.view_mut());
        let (par_div_result, par_zero_mask) =
            par_prf_divide_results_and_mask(numerator, cloned.view_mut());
        assert_eq!(zero_mask, Array::<f64, _>::ones(div_result.raw_dim()));
        assert_eq!(par_zero_mask, Array::<f64, _>::ones(par_div_result.raw_dim()));
        assert_eq!(div_result, array![[1., 1., 1., 1.,]]);
        assert_eq!(par_div_result, array![[1., 1., 1., 1.,]]);
    }

    #[rstest]
    #[case(DivByZeroStrat::ReplaceBy0, Ok(vec![0.5, 0.0, 0.0]))]
    #[case(DivByZeroStrat::ReplaceBy1, Ok(vec![0.5, 0.0, 1.0]))]
    #[case(DivByZeroStrat::ReturnError, Err(DivisionByZeroError))]
    fn test_prf_divide_zero_division(
        #[case] zero_division: DivByZeroStrat,
        #[case] expected: Result<Vec<f32>, DivisionByZeroError>,
    ) {
        let numerator = array![1.0_f32, 0.0, 0.0].into_shared();
        for parallel in [false, true] {
            let mut denominator = array![2.0_f32, 3.0, 0.0];
            let actual = prf_divide(
                numerator.clone(),
                denominator.view_mut(),
                parallel,
                zero_division,
            )
            .map(|a| a.to_vec());
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_replace_0s_by_1s() {
        let to_be_replaced =
            array![[[1.0, 0.0, 0.0, -1.0, 100.0], [10., 0.0, 0.0, 5.0, 10.]]].to_shared();
        let synchronous_actual = replace(to_be_replaced.clone(), 0.0, 1.0);
        let parallel_actual = par_replace(to_be_replaced, 0.0, 1.0);
        let expected = array![[[1.0, 1.0, 1.0, -1.0, 100.0], [10., 1.0, 1.0, 5.0, 10.]]];
        assert_eq!(synchronous_actual, expected);
        assert_eq!(parallel_actual, expected);
    }

    #[test]
    fn test_check_lengths() {
        let y_true = vec![vec![1, 2, 3], vec![11, 23, 90], vec![10, 2, 1, 7]];
        let y_pred = vec![vec![1, 20, 30], vec![111, 23, 90], vec![10, 20, 1, 7]];
        let y_pred_not_same_length = vec![vec![1, 2], vec![11, 23, 90], vec![10, 2, 1, 7]];
        let y_pred_not_same_lengths = vec![vec![11, 23, 90], vec![10, 2, 1, 7]];
        assert!(check_consistent_length(&y_true, &y_pred).is_ok());
        assert_eq!(
            check_consistent_length(&y_true, &y_pred_not_same_length),
            Err(InconsistentLengthError(3, 2))
        );
        assert_eq!(
            check_consistent_length(&y_true, &y_pred_not_same_lengths),
            Err(InconsistentLengthError(3, 2))
        );
    }

    #[test]
    fn test_extract_tp_actual_correct() {
        let (y_true, y_pred) = misc_per();
        let entities_true = Entities::strict(&y_true).unwrap();
        let entities_pred = Entities::strict(&y_pred).unwrap();
        let (names, predicted_sum, true_positive_sum, true_sum) =
            extract_tp_actual_correct(&entities_true, &entities_pred);
        assert_eq!(names, vec!["MISC", "PER"]);
        assert_eq!(
            (vec![1, 1], vec![0, 1], vec![1, 1]),
            (
                predicted_sum.to_vec(),
                true_positive_sum.to_vec(),
                true_sum.to_vec(),
            )
        );
    }

    #[rstest]
    #[case(Average::Micro, true)]
    #[case(Average::Macro, true)]
    #[case(Average::Weighted, true)]
    #[case(Average::Micro, false)]
    #[case(Average::Macro, false)]
    #[case(Average::Weighted, false)]
    fn test_precision_recall_fscore_support_averages(
        #[case] average: Average,
        #[case] strict: bool,
    ) {
        let (y_true, y_pred) = misc_per();
        let (precision, recall, fscore, support) = precision_recall_fscore_support(
            &y_true,
            &y_pred,
            1.0,
            average,
            DivByZeroStrat::ReplaceBy0,
            strict,
            true,
        )
        .unwrap();
        assert_eq!(
            (0.5, 0.5, 0.5, 2),
            (
                precision.item().unwrap(),
                recall.item().unwrap(),
                fscore.item().unwrap(),
                support.item().unwrap()
            )
        );
    }

    #[test]
    fn test_precision_recall_fscore_support_no_average() {
        let (y_true, y_pred) = misc_per();
        let actual = precision_recall_fscore_support(
            &y_true,
            &y_pred,
            1.0,
            Average::None,
            DivByZeroStrat::ReplaceBy0,
            false,
            false,
        )
        .unwrap();
        let expected = (
            array![0. as f32, 1. as f32],
            array![0. as f32, 1. as f32],
            array![0. as f32, 1. as f32],
            array![1, 1],
        );
        assert_eq!(actual, expected)
    }

    #[rstest]
    #[case(Average::Micro, true, 0.0)]
    #[case(Average::Macro, true, 0.0)]
    #[case(Average::Weighted, true, 0.0)]
    #[case(Average::Micro, false, 1.0)]
    fn test_f1_score(#[case] average: Average, #[case] strict: bool, #[case] expected: f32) {
        // A leading `I-` starts an entity with the conlleval rules only.
        let y_true = vec![vec!["B-ORG", "I-ORG"]];
        let y_pred = vec![vec!["I-ORG", "I-ORG"]];
        let (_, _, f1, _) = precision_recall_fscore_support(
            &y_true,
            &y_pred,
            1.0,
            average,
            DivByZeroStrat::ReplaceBy0,
            strict,
            false,
        )
        .unwrap();
        assert_eq!(f1.item().unwrap(), expected)
    }

    #[test]
    fn test_fbeta_uses_beta_on_precision() {
        // precision = 1, recall = 0.5
        let y_true = vec![vec!["B-A", "O", "B-A"]];
        let y_pred = vec![vec!["B-A", "O", "O"]];
        let (_, _, f, _) = precision_recall_fscore_support(
            &y_true,
            &y_pred,
            2.0,
            Average::Micro,
            DivByZeroStrat::ReplaceBy0,
            false,
            false,
        )
        .unwrap();
        // (1 + 4) * 1 * 0.5 / (4 * 1 + 0.5)
        assert!((f[0] - 0.5555556).abs() < 1e-6);
        let (_, r, f, _) = precision_recall_fscore_support(
            &y_true,
            &y_pred,
            f32::INFINITY,
            Average::Micro,
            DivByZeroStrat::ReplaceBy0,
            false,
            false,
        )
        .unwrap();
        assert_eq!(f, r);
    }

    #[test]
    fn test_strict_rejects_bilou_tags() {
        let y_true = vec![vec!["S-PER", "O"]];
        let y_pred = vec![vec!["O", "O"]];
        let res =
            classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, true, false);
        assert!(matches!(res, Err(ComputationError::Conversion(_))));
        assert!(
            classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0, false, false)
                .is_ok()
        );
    }

    #[rstest]
    #[case(vec![vec!["B-PER", "I-PER", "O"]], vec![vec!["B-PER", "O", "O"]], 2.0 / 3.0)]
    #[case(vec![vec!["O"], vec!["B-LOC"]], vec![vec!["O"], vec!["B-LOC"]], 1.0)]
    #[case(vec![vec!["O"], vec![]], vec![vec!["B-A"], vec![]], 0.0)]
    fn test_accuracy_score(
        #[case] y_true: Vec<Vec<&str>>,
        #[case] y_pred: Vec<Vec<&str>>,
        #[case] expected: f32,
    ) {
        let actual = accuracy_score(&y_true, &y_pred).unwrap();
        assert!((actual - expected).abs() < 1e-6)
    }

    #[test]
    fn test_accuracy_score_errors() {
        let empty: Vec<Vec<&str>> = vec![vec![]];
        assert_eq!(accuracy_score(&empty, &empty), Ok(0.0));
        let y_true = vec![vec!["O", "O"]];
        let y_pred = vec![vec!["O"]];
        assert_eq!(
            accuracy_score(&y_true, &y_pred),
            Err(ComputationError::InconsistentLength(
                InconsistentLengthError(2, 1)
            ))
        );
    }

    #[rstest]
    #[case("replaceby0", DivByZeroStrat::ReplaceBy0)]
    #[case("ReplaceBy1", DivByZeroStrat::ReplaceBy1)]
    #[case("error", DivByZeroStrat::ReturnError)]
    fn test_parse_div_by_zero_strat(#[case] input: &str, #[case] expected: DivByZeroStrat) {
        assert_eq!(input.parse::<DivByZeroStrat>().unwrap(), expected)
    }

    impl quickcheck::Arbitrary for OverallAverage {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let values: [OverallAverage; 3] = [
                OverallAverage::Micro,
                OverallAverage::Macro,
                OverallAverage::Weighted,
            ];
            *g.choose(&values).unwrap()
        }
    }

    /// Gives the predicted sentences the shape of the true sentences.
    fn align_shapes(
        y_true: Vec<Vec<TokensToTest>>,
        y_pred: Vec<Vec<TokensToTest>>,
    ) -> (Vec<Vec<&'static str>>, Vec<Vec<&'static str>>) {
        let y_true_str = to_str_vecs(y_true);
        let mut pred_iter = to_str_vecs(y_pred).into_iter().flatten().cycle();
        let y_pred_str = y_true_str
            .iter()
            .map(|s| s.iter().map(|t| pred_iter.next().unwrap_or(*t)).collect())
            .collect();
        (y_true_str, y_pred_str)
    }

    #[test]
    fn test_err_on_negative_beta() {
        fn err_on_beta(
            y_true: Vec<Vec<TokensToTest>>,
            y_pred: Vec<Vec<TokensToTest>>,
            beta: f32,
            average: OverallAverage,
            parallel: bool,
            strict: bool,
        ) -> TestResult {
            if y_true.is_empty() || beta.is_nan() {
                return TestResult::discard();
            }
            let (y_true_str, y_pred_str) = align_shapes(y_true, y_pred);
            let beta_neg = -beta.abs() - 0.1;
            let res = precision_recall_fscore_support(
                &y_true_str,
                &y_pred_str,
                beta_neg,
                average.into(),
                DivByZeroStrat::ReplaceBy0,
                strict,
                parallel,
            );
            match res {
                Err(ComputationError::BetaNotPositive) => TestResult::passed(),
                _ => TestResult::failed(),
            }
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(
            err_on_beta
                as fn(
                    Vec<Vec<TokensToTest>>,
                    Vec<Vec<TokensToTest>>,
                    f32,
                    OverallAverage,
                    bool,
                    bool,
                ) -> TestResult,
        )
    }

    #[test]
    fn test_propertie_averages_are_bounded() {
        fn averages_are_bounded(
            y_true: Vec<Vec<TokensToTest>>,
            y_pred: Vec<Vec<TokensToTest>>,
            average: OverallAverage,
            parallel: bool,
            strict: bool,
        ) -> TestResult {
            if y_true.is_empty() {
                return TestResult::discard();
            }
            let (y_true_str, y_pred_str) = align_shapes(y_true, y_pred);
            let res = precision_recall_fscore_support(
                &y_true_str,
                &y_pred_str,
                1.0,
                average.into(),
                DivByZeroStrat::ReplaceBy0,
                strict,
                parallel,
            );
            let (p, r, f, s) = match res {
                Ok(v) => v,
                Err(_) => return TestResult::failed(),
            };
            let in_bounds = |a: &Array1<f32>| a.iter().all(|v| (0.0..=1.0).contains(v));
            let same_dim = p.dim() == 1 && r.dim() == 1 && f.dim() == 1 && s.dim() == 1;
            TestResult::from_bool(same_dim && in_bounds(&p) && in_bounds(&r) && in_bounds(&f))
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(
            averages_are_bounded
                as fn(
                    Vec<Vec<TokensToTest>>,
                    Vec<Vec<TokensToTest>>,
                    OverallAverage,
                    bool,
                    bool,
                ) -> TestResult,
        )
    }
}
