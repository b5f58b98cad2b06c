//! Confusion matrix state and the per-batch updater.
//!
//! The matrix is the only mutable state of the IoU metric. Rows are indexed by
//! the true label and columns by the predicted label. Counts are exact `u64`
//! integers; floating point only appears when a report is computed.

use serde::{Deserialize, Serialize};

use crate::error::{LabelRole, MetricError, MetricResult};

/// Running `num_classes x num_classes` pixel counts.
///
/// `get(t, p)` is the number of pixels with true label `t` predicted as `p`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfusionMatrix")]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<u64>,
}

/// Unchecked serialized form, validated on the way in.
#[derive(Deserialize)]
struct RawConfusionMatrix {
    num_classes: usize,
    counts: Vec<u64>,
}

impl TryFrom<RawConfusionMatrix> for ConfusionMatrix {
    type Error = MetricError;

    fn try_from(raw: RawConfusionMatrix) -> MetricResult<Self> {
        let cells = cell_count(raw.num_classes)?;
        if raw.counts.len() != cells {
            return Err(MetricError::InvalidConfiguration {
                reason: format!(
                    "expected {cells} counts for {} classes, got {}",
                    raw.num_classes,
                    raw.counts.len()
                ),
            });
        }

        Ok(Self {
            num_classes: raw.num_classes,
            counts: raw.counts,
        })
    }
}

fn cell_count(num_classes: usize) -> MetricResult<usize> {
    if num_classes == 0 {
        return Err(MetricError::InvalidConfiguration {
            reason: "num_classes must be positive, got 0".to_string(),
        });
    }
    num_classes
        .checked_mul(num_classes)
        .ok_or_else(|| MetricError::InvalidConfiguration {
            reason: format!("num_classes is too large: {num_classes}"),
        })
}

impl ConfusionMatrix {
    /// Creates a zero-valued matrix.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidConfiguration`] if `num_classes` is zero.
    pub fn new(num_classes: usize) -> MetricResult<Self> {
        let cells = cell_count(num_classes)?;

        Ok(Self {
            num_classes,
            counts: vec![0; cells],
        })
    }

    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Row-major view of all counts.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Count of pixels with true label `target` predicted as `prediction`.
    ///
    /// # Panics
    ///
    /// Panics if either index is not below `num_classes`.
    pub fn get(&self, target: usize, prediction: usize) -> u64 {
        assert!(
            target < self.num_classes && prediction < self.num_classes,
            "index ({target}, {prediction}) out of bounds for {} classes",
            self.num_classes
        );
        self.counts[target * self.num_classes + prediction]
    }

    /// All predictions recorded for pixels whose true label is `target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is not below `num_classes`.
    pub fn row(&self, target: usize) -> &[u64] {
        assert!(
            target < self.num_classes,
            "row {target} out of range for {} classes",
            self.num_classes
        );
        let start = target * self.num_classes;
        &self.counts[start..start + self.num_classes]
    }

    /// Sum of column `prediction`: every pixel predicted as that class.
    pub fn column_sum(&self, prediction: usize) -> u64 {
        self.counts
            .iter()
            .skip(prediction)
            .step_by(self.num_classes)
            .sum()
    }

    /// Total number of pixels folded in since the last reset.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Number of correctly classified pixels.
    pub fn trace(&self) -> u64 {
        (0..self.num_classes).map(|c| self.get(c, c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&count| count == 0)
    }

    /// Zeroes all entries in place.
    pub fn reset(&mut self) {
        self.counts.fill(0);
    }

    /// Adds `other` into `self` entrywise.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::CollectiveMismatch`] if the class counts differ.
    /// Neither matrix is modified in that case.
    pub fn merge(&mut self, other: &Self) -> MetricResult<()> {
        self.ensure_compatible(other)?;
        for (count, &incoming) in self.counts.iter_mut().zip(&other.counts) {
            *count += incoming;
        }
        Ok(())
    }

    /// Returns the entrywise sum of two matrices without touching either.
    pub fn merged(&self, other: &Self) -> MetricResult<Self> {
        let mut sum = self.clone();
        sum.merge(other)?;
        Ok(sum)
    }

    /// Folds a sequence of matrices into one.
    ///
    /// Returns `Ok(None)` for an empty sequence.
    pub fn sum_all<'a, I>(matrices: I) -> MetricResult<Option<Self>>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut iter = matrices.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut sum = first.clone();
        for matrix in iter {
            sum.merge(matrix)?;
        }
        Ok(Some(sum))
    }

    pub(crate) fn ensure_compatible(&self, other: &Self) -> MetricResult<()> {
        if self.num_classes != other.num_classes {
            return Err(MetricError::CollectiveMismatch {
                expected: self.num_classes,
                actual: other.num_classes,
            });
        }
        Ok(())
    }

    fn class_index(&self, label: i64, position: usize, role: LabelRole) -> MetricResult<usize> {
        usize::try_from(label)
            .ok()
            .filter(|&class| class < self.num_classes)
            .ok_or(MetricError::OutOfRangeLabel {
                label,
                position,
                role,
                num_classes: self.num_classes,
            })
    }
}

/// Folds one batch of labels into `matrix`.
///
/// Pixels whose target equals `ignore_index` are skipped, whatever their
/// prediction. The whole batch is validated before the first count is
/// written, so a failed call leaves `matrix` untouched.
///
/// # Errors
///
/// - [`MetricError::LengthMismatch`] if the slices differ in length.
/// - [`MetricError::OutOfRangeLabel`] if a non-ignored target, or the
///   prediction paired with it, is outside `[0, num_classes)`.
pub fn update(
    matrix: &mut ConfusionMatrix,
    predictions: &[i64],
    targets: &[i64],
    ignore_index: Option<i64>,
) -> MetricResult<()> {
    if predictions.len() != targets.len() {
        return Err(MetricError::LengthMismatch {
            predictions: predictions.len(),
            targets: targets.len(),
        });
    }

    for (position, prediction, target) in counted_pixels(predictions, targets, ignore_index) {
        matrix.class_index(target, position, LabelRole::Target)?;
        matrix.class_index(prediction, position, LabelRole::Prediction)?;
    }

    let num_classes = matrix.num_classes;
    for (_, prediction, target) in counted_pixels(predictions, targets, ignore_index) {
        // Both labels were validated above.
        let cell = target as usize * num_classes + prediction as usize;
        matrix.counts[cell] += 1;
    }

    Ok(())
}

/// Yields `(position, prediction, target)` for every pixel that is not ignored.
fn counted_pixels<'a>(
    predictions: &'a [i64],
    targets: &'a [i64],
    ignore_index: Option<i64>,
) -> impl Iterator<Item = (usize, i64, i64)> + 'a {
    predictions
        .iter()
        .zip(targets)
        .enumerate()
        .filter(move |&(_, (_, &target))| Some(target) != ignore_index)
        .map(|(position, (&prediction, &target))| (position, prediction, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_from(num_classes: usize, predictions: &[i64], targets: &[i64]) -> ConfusionMatrix {
        let mut matrix = ConfusionMatrix::new(num_classes).unwrap();
        update(&mut matrix, predictions, targets, None).unwrap();
        matrix
    }

    #[test]
    fn test_zero_classes_rejected() {
        match ConfusionMatrix::new(0) {
            Err(MetricError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("num_classes must be positive"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn test_update_counts_rows_by_target() {
        let matrix = matrix_from(3, &[0, 0, 1, 1, 2, 2], &[0, 1, 1, 1, 2, 0]);

        assert_eq!(matrix.get(0, 0), 1);
        assert_eq!(matrix.get(1, 0), 1);
        assert_eq!(matrix.get(1, 1), 2);
        assert_eq!(matrix.get(0, 2), 1);
        assert_eq!(matrix.row(1), &[1, 2, 0]);
        assert_eq!(matrix.column_sum(0), 2);
        assert_eq!(matrix.trace(), 4);
    }

    #[test]
    fn test_total_counts_only_non_ignored_pixels() {
        let mut matrix = ConfusionMatrix::new(4).unwrap();
        let batches: [(&[i64], &[i64]); 3] = [
            (&[0, 1, 2, 3], &[0, 255, 2, 255]),
            (&[3, 3], &[3, 1]),
            (&[9, 1, 0], &[255, 255, 255]),
        ];

        let mut expected = 0;
        for (predictions, targets) in batches {
            update(&mut matrix, predictions, targets, Some(255)).unwrap();
            expected += targets.iter().filter(|&&t| t != 255).count() as u64;
        }

        assert_eq!(matrix.total(), expected);
        assert_eq!(matrix.total(), 4);
    }

    #[test]
    fn test_ignored_pixels_do_not_affect_matrix() {
        let mut first = ConfusionMatrix::new(3).unwrap();
        let mut second = ConfusionMatrix::new(3).unwrap();

        update(&mut first, &[0, 1, 2, 2], &[0, -1, 2, -1], Some(-1)).unwrap();
        update(&mut second, &[0, 0, 2, 1], &[0, -1, 2, -1], Some(-1)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_out_of_range_target_leaves_matrix_unchanged() {
        let mut matrix = matrix_from(2, &[0, 1], &[0, 1]);
        let before = matrix.clone();

        let result = update(&mut matrix, &[0, 1, 1], &[0, 1, 2], None);

        match result {
            Err(MetricError::OutOfRangeLabel {
                label,
                position,
                role,
                num_classes,
            }) => {
                assert_eq!(label, 2);
                assert_eq!(position, 2);
                assert_eq!(role, LabelRole::Target);
                assert_eq!(num_classes, 2);
            }
            other => panic!("Expected OutOfRangeLabel error, got {other:?}"),
        }
        assert_eq!(matrix, before);
    }

    #[test]
    fn test_negative_prediction_rejected() {
        let mut matrix = ConfusionMatrix::new(2).unwrap();

        let result = update(&mut matrix, &[0, -3], &[0, 1], None);

        assert!(matches!(
            result,
            Err(MetricError::OutOfRangeLabel {
                label: -3,
                role: LabelRole::Prediction,
                ..
            })
        ));
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_prediction_equal_to_ignore_index_is_out_of_range() {
        let mut matrix = ConfusionMatrix::new(2).unwrap();

        let result = update(&mut matrix, &[255], &[1], Some(255));

        assert!(matches!(
            result,
            Err(MetricError::OutOfRangeLabel { label: 255, .. })
        ));
    }

    #[test]
    fn test_length_mismatch_leaves_matrix_unchanged() {
        let mut matrix = matrix_from(2, &[1], &[1]);
        let before = matrix.clone();

        let result = update(&mut matrix, &[0, 1], &[0], None);

        assert_eq!(
            result,
            Err(MetricError::LengthMismatch {
                predictions: 2,
                targets: 1
            })
        );
        assert_eq!(matrix, before);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = matrix_from(3, &[0, 1, 2, 2], &[0, 2, 2, 1]);
        let b = matrix_from(3, &[1, 1, 0], &[1, 0, 0]);

        assert_eq!(a.merged(&b).unwrap(), b.merged(&a).unwrap());
    }

    #[test]
    fn test_merge_is_associative() {
        let a = matrix_from(3, &[0, 1, 2, 2], &[0, 2, 2, 1]);
        let b = matrix_from(3, &[1, 1, 0], &[1, 0, 0]);
        let c = matrix_from(3, &[2, 2, 2, 0, 1], &[2, 1, 0, 0, 1]);

        let left = a.merged(&b).unwrap().merged(&c).unwrap();
        let right = a.merged(&b.merged(&c).unwrap()).unwrap();

        assert_eq!(left, right);
        assert_eq!(left.total(), 12);
    }

    #[test]
    fn test_merge_mismatch_leaves_operands_unchanged() {
        let mut a = matrix_from(2, &[0, 1], &[1, 1]);
        let b = matrix_from(3, &[2], &[2]);
        let (a_before, b_before) = (a.clone(), b.clone());

        assert_eq!(
            a.merge(&b),
            Err(MetricError::CollectiveMismatch {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn test_sum_all() {
        let parts = [
            matrix_from(2, &[0], &[0]),
            matrix_from(2, &[1], &[0]),
            matrix_from(2, &[1], &[1]),
        ];

        let sum = ConfusionMatrix::sum_all(&parts).unwrap().unwrap();

        assert_eq!(sum.counts(), &[1, 1, 0, 1]);
        assert!(ConfusionMatrix::sum_all(&[]).unwrap().is_none());
    }

    #[test]
    fn test_reset_zeroes_counts() {
        let mut matrix = matrix_from(2, &[0, 1, 1], &[1, 1, 0]);
        assert!(!matrix.is_empty());

        matrix.reset();

        assert!(matrix.is_empty());
        assert_eq!(matrix.num_classes(), 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_row_out_of_range_panics() {
        let matrix = ConfusionMatrix::new(2).unwrap();

        let _ = matrix.row(2);
    }

    #[test]
    fn test_json_round_trip() {
        let matrix = matrix_from(3, &[0, 2, 1, 1], &[0, 1, 1, 2]);

        let json = serde_json::to_string(&matrix).unwrap();
        let restored: ConfusionMatrix = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, matrix);
    }

    #[test]
    fn test_deserialize_rejects_zero_classes() {
        let err = serde_json::from_str::<ConfusionMatrix>(r#"{"num_classes":0,"counts":[]}"#)
            .unwrap_err();

        assert!(err.to_string().contains("num_classes must be positive"));
    }

    #[test]
    fn test_deserialize_rejects_wrong_count_length() {
        let err = serde_json::from_str::<ConfusionMatrix>(r#"{"num_classes":2,"counts":[5]}"#)
            .unwrap_err();

        assert!(err.to_string().contains("expected 4 counts for 2 classes, got 1"));
    }
}
