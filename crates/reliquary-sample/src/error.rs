use reliquary::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("{id} is a {actual}, expected a {expected}")]
    WrongType {
        id: String,
        expected: &'static str,
        actual: String,
    },

    #[error("{0} has no title")]
    Untitled(String),
}
