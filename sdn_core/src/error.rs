use crate::{crypto::CryptoError, network::NetworkError, record::RecordError};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the engine, directory and naming layers report.
///
/// Only [`Error::VersionConflict`] is ever retried automatically; all other
/// kinds reach the caller on first occurrence.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    AlreadyExists,

    #[error("version conflict")]
    VersionConflict,

    #[error("signer is not an owner of the record")]
    NotOwner,

    #[error("record failed verification: {0}")]
    Corrupt(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("an entry named {0:?} already exists")]
    DuplicateName(String),

    #[error("no entry named {0:?}")]
    EntryNotFound(String),

    #[error("invalid entry name {0:?}")]
    InvalidName(String),

    #[error("{0:?} is not a directory")]
    NotADirectory(String),

    #[error("{0:?} is not a file")]
    NotAFile(String),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("name {0:?} is already registered")]
    NameTaken(String),

    #[error("name {0:?} is not registered")]
    NameNotFound(String),

    #[error("content incomplete: chunk {index} is missing")]
    IncompleteContent { index: usize },

    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("network error: {0}")]
    Network(#[source] anyhow::Error),
}

impl Error {
    /// True for failures a fresh attempt may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::VersionConflict)
    }
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::NotFound => Error::NotFound,
            NetworkError::AlreadyExists => Error::AlreadyExists,
            NetworkError::VersionConflict => Error::VersionConflict,
            NetworkError::NotOwner => Error::NotOwner,
            NetworkError::Rejected(reason) => Error::Network(anyhow::anyhow!(reason)),
            NetworkError::Backend(err) => Error::Network(err),
        }
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed | CryptoError::DataTooShort(_) => {
                Error::DecryptionFailed
            }
            CryptoError::EncryptionFailed => Error::Malformed(err.to_string()),
        }
    }
}

impl From<minicbor::decode::Error> for Error {
    fn from(err: minicbor::decode::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_version_conflict_is_retryable() {
        assert!(Error::VersionConflict.is_retryable());
        assert!(!Error::NotOwner.is_retryable());
        assert!(!Error::NotFound.is_retryable());
        assert!(!Error::Corrupt("bad".into()).is_retryable());
        assert!(!Error::Malformed("bad".into()).is_retryable());
    }

    #[test]
    fn network_errors_map_one_to_one() {
        assert!(matches!(
            Error::from(NetworkError::VersionConflict),
            Error::VersionConflict
        ));
        assert!(matches!(
            Error::from(NetworkError::AlreadyExists),
            Error::AlreadyExists
        ));
        assert!(matches!(Error::from(NetworkError::NotOwner), Error::NotOwner));
        assert!(matches!(Error::from(NetworkError::NotFound), Error::NotFound));
    }
}
