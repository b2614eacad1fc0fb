//! Sensor-Bus Namespace Access
//!
//! The namespace is a tree of device nodes and properties addressed by
//! slash-delimited paths. A path ending in `/` is a container whose query
//! result enumerates child names as a comma-separated list; any other path
//! is a leaf whose query result is a scalar value. [`Namespace`] is the
//! seam the walker traverses through; [`owserver::OwserverClient`] is the
//! wire implementation.

use async_trait::async_trait;
use bytes::Bytes;

pub mod owserver;

/// Namespace access error types
#[derive(Debug)]
pub enum NamespaceError {
    /// Could not reach the namespace server
    Connect(String),
    /// IO error mid-exchange
    Io(String),
    /// The request did not complete within the configured timeout
    Timeout,
    /// The server spoke something other than the expected protocol
    Protocol(String),
    /// The server answered with a negative return code for this path
    Query(i32),
}

impl std::fmt::Display for NamespaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamespaceError::Connect(msg) => write!(f, "connect failed: {}", msg),
            NamespaceError::Io(msg) => write!(f, "IO error: {}", msg),
            NamespaceError::Timeout => write!(f, "request timed out"),
            NamespaceError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            NamespaceError::Query(code) => write!(f, "query failed with code {}", code),
        }
    }
}

impl std::error::Error for NamespaceError {}

/// Query access to the namespace tree.
///
/// `get` returns a comma-separated child-name list for a container path
/// and the raw scalar value for a leaf path. Child names of containers
/// carry a trailing `/`.
#[async_trait]
pub trait Namespace {
    async fn get(&self, path: &str) -> Result<Bytes, NamespaceError>;
}

/// Whether a path denotes a container node.
pub fn is_container(path: &str) -> bool {
    path.ends_with('/')
}

/// Form a child path. Child paths are only ever built by appending an
/// enumerated name to the parent path.
pub fn join_child(parent: &str, child: &str) -> String {
    format!("{}{}", parent, child)
}

/// Split an enumeration result into child names, dropping empty tokens
/// from malformed listings.
pub fn split_children(listing: &str) -> impl Iterator<Item = &str> {
    listing.split(',').filter(|name| !name.is_empty())
}
