use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("open input failed: {0}")]
    Open(String),

    #[error("output negotiation failed: {0}")]
    Negotiate(String),

    #[error("malformed stream: {0}")]
    Malformed(String),

    #[error("unit references unknown stream {0}")]
    UnknownStream(usize),

    #[error("unknown transport: {0}")]
    UnknownTransport(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
