//! Error types for loading and validating trained models.

/// Errors raised while reading, writing or validating a trained model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The safetensors container could not be parsed or written
    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    /// The embedded model configuration is not valid JSON for a known layout
    #[error("Invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    /// A weight buffer does not match its declared shape
    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// The file carries no `model_config` metadata entry
    #[error("Model file has no model_config metadata")]
    MissingConfig,

    /// Only sequential models can be loaded
    #[error("Unsupported model class: {0}")]
    UnsupportedModel(String),

    /// Weights must be stored as 32-bit floats
    #[error("Tensor {name} has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    /// A layer expects a weight that is not present in the file
    #[error("Layer {layer} is missing weight {param}")]
    MissingWeight { layer: String, param: String },

    /// A weight exists but its shape disagrees with the architecture
    #[error("Weight {name} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A layer cannot be applied to the shape flowing into it
    #[error("Invalid layer {layer}: {reason}")]
    InvalidLayer { layer: String, reason: String },

    /// The first layer does not declare `batch_input_shape`
    #[error("Model does not declare an input shape")]
    MissingInputShape,
}

/// Result type for trained model operations
pub type Result<T> = std::result::Result<T, Error>;
