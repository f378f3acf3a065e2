use kl_core::CoreError;

/// Alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised while loading, driving, or saving a world.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A kernel error: lookup miss, bad configuration value, name collision.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A world file could not be read or written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A world file is not valid JSON or does not match the expected layout.
    #[error("invalid world file: {0}")]
    Json(#[from] serde_json::Error),

    /// A section refers to a parent section that does not precede it.
    #[error("section {section} refers to parent section {parent}, which does not precede it")]
    BadParent {
        /// Index of the offending section.
        section: usize,
        /// The parent index it names.
        parent: usize,
    },

    /// A section's parent section was rejected, so the section is skipped too.
    #[error("section {section} skipped because its parent section {parent} was rejected")]
    ParentSkipped {
        /// Index of the skipped section.
        section: usize,
        /// Index of the rejected parent section.
        parent: usize,
    },
}
