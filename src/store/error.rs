#[derive(Debug)]
pub enum StoreError {
    /// No room with this number.
    NotFound(String),
    LimitExceeded(&'static str),
    /// The room no longer has the status the caller checked against.
    StatusChanged { number: String, found: String },
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(number) => write!(f, "room not found: {number}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::StatusChanged { number, found } => {
                write!(f, "room {number} changed to {found} in the meantime")
            }
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
