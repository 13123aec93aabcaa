#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid container name: {0:?}")]
    InvalidContainerName(String),
    #[error("container reported without any name")]
    MissingName,
}
pub type Result<T> = std::result::Result<T, Error>;
