use thiserror::Error;

/// Which side of a batch an offending label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRole {
    Prediction,
    Target,
}

impl core::fmt::Display for LabelRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Prediction => f.write_str("prediction"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// The error type for segmentation metric operations.
///
/// Every variant describes a local, synchronous failure of a single call. The
/// operation that returned it has left its operands exactly as they were.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// Error for when a metric is configured with invalid parameters,
    /// e.g. zero classes or an empty worker group.
    #[error("Invalid metric configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when a batch carries a different number of predictions and targets.
    #[error("Length mismatch: {predictions} predictions vs {targets} targets")]
    LengthMismatch {
        /// Number of predicted labels in the batch.
        predictions: usize,
        /// Number of target labels in the batch.
        targets: usize,
    },

    /// Error for when a non-ignored label falls outside `[0, num_classes)`.
    #[error("Out of range {role} label {label} at position {position} (num_classes = {num_classes})")]
    OutOfRangeLabel {
        /// The offending label value.
        label: i64,
        /// Position of the label inside the flattened batch.
        position: usize,
        /// Whether the label is a prediction or a target.
        role: LabelRole,
        /// Number of classes of the matrix being updated.
        num_classes: usize,
    },

    /// Error for when two confusion matrices with different class counts are combined.
    #[error("Collective mismatch: expected {expected} classes, got {actual}")]
    CollectiveMismatch {
        /// Class count of the receiving matrix.
        expected: usize,
        /// Class count of the offending matrix.
        actual: usize,
    },

    /// Error for when a participant left a worker group while others still
    /// expected it in an all-reduce round.
    #[error("Collective abandoned: rank {rank} left the group")]
    CollectiveAbandoned {
        /// Rank of the participant that left.
        rank: usize,
    },

    /// Error for when tensor data cannot be read back as integer labels.
    #[error("Tensor conversion failed: {reason}")]
    TensorConversion {
        /// Description of the conversion failure.
        reason: String,
    },

    /// Error for when prediction and target tensors have different shapes.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },
}

/// A specialized `Result` type for segmentation metric operations.
pub type MetricResult<T> = Result<T, MetricError>;
