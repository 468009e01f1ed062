/// Errors raised while converting or persisting a Core ML package.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The trained model could not be loaded or is internally inconsistent
    #[error(transparent)]
    Model(#[from] trained_model::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protobuf encoding or decoding failed
    #[error("Protobuf error: {0}")]
    Protobuf(#[from] protobuf::Error),

    /// Conversion options are inconsistent with the model
    #[error("Invalid conversion options: {0}")]
    Options(String),

    /// An input marked as an image cannot be represented as one
    #[error("Input {name} cannot be an image: {reason}")]
    InvalidImageInput { name: String, reason: String },

    /// A description was assigned to a feature the package does not have
    #[error("Package has no {kind} feature named {name}")]
    UnknownFeature { kind: &'static str, name: String },

    /// Every layer of the model was dropped during conversion
    #[error("Model produces no layers to convert")]
    EmptyNetwork,
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, Error>;
