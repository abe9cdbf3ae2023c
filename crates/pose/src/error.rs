use thiserror::Error;

/// Malformed backend output or a configuration that disagrees with it.
///
/// These are never recoverable at the decoding layer.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Backend returned no {0} output")]
    MissingOutput(&'static str),

    #[error("Unsupported {name} rank {}: shape {shape:?}", .shape.len())]
    UnsupportedRank {
        name: &'static str,
        shape: Vec<usize>,
    },

    #[error("Offset field has {0} channels, expected an even count")]
    OddOffsetChannels(usize),

    #[error("Offset field shape {offset:?} does not match confidence map shape {scmap:?}")]
    OffsetShapeMismatch {
        scmap: Vec<usize>,
        offset: Vec<usize>,
    },

    #[error("Expected {expected} joints, got {actual}")]
    JointCountMismatch { expected: usize, actual: usize },

    #[error("Expected batch size {expected}, got {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("Confidence map has an empty spatial grid")]
    EmptyGrid,

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
