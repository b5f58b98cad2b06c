//! IoU (Intersection over Union) computation from a confusion matrix.
//!
//! A class whose union is empty for the accumulation window has no defined IoU.
//! Such classes are reported as `None` and left out of the mean.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::metrics::confusion::ConfusionMatrix;

/// Snapshot of the metric values derived from one confusion matrix.
///
/// Every ratio is `None` when its denominator is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IouReport {
    /// IoU of each class, indexed by class id.
    pub per_class: Vec<Option<f64>>,
    /// Unweighted mean of the defined per-class values.
    pub mean: Option<f64>,
    /// `TP / (TP + FP)` per class.
    pub precision: Vec<Option<f64>>,
    /// `TP / (TP + FN)` per class.
    pub recall: Vec<Option<f64>>,
    /// `TN / (TN + FP)` per class.
    pub specificity: Vec<Option<f64>>,
    /// Fraction of counted pixels that were classified correctly.
    pub accuracy: Option<f64>,
    /// Number of pixels the report was computed from.
    pub total_pixels: u64,
}

impl IouReport {
    pub fn num_classes(&self) -> usize {
        self.per_class.len()
    }

    /// Number of classes with a defined IoU.
    pub fn defined_classes(&self) -> usize {
        self.per_class.iter().flatten().count()
    }

    /// Mean IoU as a plain float, `NaN` when undefined.
    pub fn mean_or_nan(&self) -> f64 {
        self.mean.unwrap_or(f64::NAN)
    }

    /// Per-class IoU as plain floats, `NaN` for undefined classes.
    pub fn per_class_or_nan(&self) -> Vec<f64> {
        self.per_class
            .iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect()
    }
}

impl fmt::Display for IouReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mIoU {}", Formatted(self.mean))?;
        for (class, value) in self.per_class.iter().enumerate() {
            write!(f, " | {class}: {}", Formatted(*value))?;
        }
        Ok(())
    }
}

struct Formatted(Option<f64>);

impl fmt::Display for Formatted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:.5}"),
            None => f.write_str("NaN"),
        }
    }
}

/// Per-class outcome counts derived from one row and one column of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCounts {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_negatives: u64,
}

impl ClassCounts {
    pub fn from_matrix(matrix: &ConfusionMatrix, class: usize) -> Self {
        let true_positives = matrix.get(class, class);
        let false_positives = matrix.column_sum(class) - true_positives;
        let false_negatives = matrix.row(class).iter().sum::<u64>() - true_positives;
        let true_negatives =
            matrix.total() - true_positives - false_positives - false_negatives;

        Self {
            true_positives,
            false_positives,
            false_negatives,
            true_negatives,
        }
    }

    pub fn iou(&self) -> Option<f64> {
        ratio(
            self.true_positives,
            self.true_positives + self.false_positives + self.false_negatives,
        )
    }

    pub fn precision(&self) -> Option<f64> {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> Option<f64> {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn specificity(&self) -> Option<f64> {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Computes IoU and the related ratios from `matrix` without modifying it.
pub fn compute(matrix: &ConfusionMatrix) -> IouReport {
    let classes: Vec<ClassCounts> = (0..matrix.num_classes())
        .map(|class| ClassCounts::from_matrix(matrix, class))
        .collect();

    let per_class: Vec<Option<f64>> = classes.iter().map(ClassCounts::iou).collect();
    let defined: Vec<f64> = per_class.iter().flatten().copied().collect();
    let mean = (!defined.is_empty()).then(|| defined.iter().sum::<f64>() / defined.len() as f64);

    IouReport {
        mean,
        precision: classes.iter().map(ClassCounts::precision).collect(),
        recall: classes.iter().map(ClassCounts::recall).collect(),
        specificity: classes.iter().map(ClassCounts::specificity).collect(),
        accuracy: ratio(matrix.trace(), matrix.total()),
        total_pixels: matrix.total(),
        per_class,
    }
}
