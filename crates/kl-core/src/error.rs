use crate::id::ModelId;

/// Alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur when configuring or manipulating models.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// The requested model ID does not exist in the registry.
    #[error("model not found: {0}")]
    ModelNotFound(ModelId),

    /// A model was created under a parent that does not exist.
    #[error("parent model not found: {0}")]
    ParentNotFound(ModelId),

    /// A sibling with the same name already exists.
    #[error("model name \"{name}\" already used in {scope}")]
    DuplicateName {
        /// The colliding name.
        name: String,
        /// The scope in which the name collided (parent name or "world").
        scope: String,
    },

    /// A configuration section named a type that is not a known model type.
    #[error("unknown model type \"{0}\"")]
    UnknownModelType(String),

    /// A configuration value could not be interpreted.
    #[error("malformed value for \"{key}\": {value} (expected {expected})")]
    MalformedValue {
        /// The configuration key.
        key: String,
        /// The offending value, rendered as text.
        value: String,
        /// What the key requires.
        expected: &'static str,
    },

    /// A device refers to a sibling model that is absent or of the wrong type.
    #[error("model \"{model}\" cannot resolve its reference to \"{reference}\"")]
    MissingReference {
        /// The name of the referring model.
        model: String,
        /// The name (or description) of the missing model.
        reference: String,
    },
}
