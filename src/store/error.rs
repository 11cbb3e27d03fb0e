#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on series file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to replace series file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Series file header has no '{0}' column")]
    MissingTimestampColumn(&'static str),
}
