//! Resolution of source/sink URLs to byte streams

use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use url::Url;

use crate::error::{Result, TransportError};

pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where FLV bytes come from or go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    File(PathBuf),
    /// `host:port` of a peer speaking raw FLV
    Tcp(String),
}

impl Endpoint {
    /// Accepts `file://` and `tcp://` URLs and bare filesystem paths
    pub fn parse(url: &str) -> Result<Self> {
        match Url::parse(url) {
            Ok(parsed) => match parsed.scheme() {
                "file" => parsed
                    .to_file_path()
                    .map(Endpoint::File)
                    .map_err(|_| TransportError::UnsupportedUrl(url.to_string())),
                "tcp" => {
                    let host = parsed
                        .host_str()
                        .ok_or_else(|| TransportError::UnsupportedUrl(url.to_string()))?;
                    let port = parsed
                        .port()
                        .ok_or_else(|| TransportError::UnsupportedUrl(format!("{} (missing port)", url)))?;
                    Ok(Endpoint::Tcp(format!("{}:{}", host, port)))
                }
                // Windows drive letters parse as one-letter schemes
                scheme if scheme.len() == 1 => Ok(Endpoint::File(PathBuf::from(url))),
                _ => Err(TransportError::UnsupportedUrl(url.to_string())),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Endpoint::File(PathBuf::from(url))),
            Err(_) => Err(TransportError::UnsupportedUrl(url.to_string())),
        }
    }

    pub async fn open_reader(&self) -> Result<ByteReader> {
        match self {
            Endpoint::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| TransportError::Open(format!("{}: {}", path.display(), e)))?;
                Ok(Box::new(file))
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| TransportError::Open(format!("{}: {}", addr, e)))?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
        }
    }

    pub async fn open_writer(&self) -> Result<ByteWriter> {
        match self {
            Endpoint::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| TransportError::Negotiate(format!("{}: {}", parent.display(), e)))?;
                }
                let file = tokio::fs::File::create(path)
                    .await
                    .map_err(|e| TransportError::Negotiate(format!("{}: {}", path.display(), e)))?;
                Ok(Box::new(file))
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| TransportError::Negotiate(format!("{}: {}", addr, e)))?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
        }
    }
}
