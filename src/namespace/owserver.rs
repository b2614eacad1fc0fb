//! owserver Protocol Client
//!
//! Speaks the owserver TCP protocol: each message is a 24-byte header of
//! six big-endian i32 fields followed by the payload. Requests use the
//! GETSLASH message so directory entries come back with a trailing `/`,
//! which is how the rest of the bridge tells containers from leaves. The
//! server may interleave keepalive pings (negative payload length) while
//! it works a slow bus; those are skipped. A connection is opened per
//! request - owserver drops the link after answering unless persistence
//! is negotiated, and one short-lived connection per node read keeps the
//! client stateless.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use super::{is_container, split_children, Namespace, NamespaceError};
use crate::config::OwfsConfig;

const HEADER_LEN: usize = 24;
const PROTOCOL_VERSION: i32 = 0;

/// Combined read: value for a leaf, slash-terminated listing for a directory
const MSG_GETSLASH: i32 = 10;

/// Request flag every owserver client sets
const FLAG_OWNET: i32 = 0x0000_0100;

/// Upper bound advertised for the answer size
const MAX_READ: i32 = 65536;

/// Client for one owserver endpoint.
pub struct OwserverClient {
    address: String,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
struct ResponseHeader {
    version: i32,
    payload: i32,
    ret: i32,
    flags: i32,
    size: i32,
    offset: i32,
}

impl OwserverClient {
    pub fn new(cfg: &OwfsConfig) -> Self {
        Self {
            address: cfg.address.clone(),
            timeout: cfg.timeout_duration(),
        }
    }

    /// The configured endpoint.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn request(&self, path: &str) -> Result<Bytes, NamespaceError> {
        timeout(self.timeout, self.exchange(path))
            .await
            .map_err(|_| NamespaceError::Timeout)?
    }

    async fn exchange(&self, path: &str) -> Result<Bytes, NamespaceError> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| NamespaceError::Connect(e.to_string()))?;

        let frame = encode_request(path);
        stream
            .write_all(&frame)
            .await
            .map_err(|e| NamespaceError::Io(e.to_string()))?;

        loop {
            let mut raw = [0u8; HEADER_LEN];
            stream
                .read_exact(&mut raw)
                .await
                .map_err(|e| NamespaceError::Io(e.to_string()))?;
            let header = decode_header(&raw);

            // Negative payload length marks a keepalive ping sent while the
            // server is still working the bus.
            if header.payload < 0 {
                trace!("owserver ping for {}", path);
                continue;
            }
            if header.ret < 0 {
                return Err(NamespaceError::Query(header.ret));
            }

            let mut data = vec![0u8; header.payload as usize];
            stream
                .read_exact(&mut data)
                .await
                .map_err(|e| NamespaceError::Io(e.to_string()))?;

            // The payload may carry a NUL terminator past the advertised size.
            let mut len = data.len();
            if header.size >= 0 && (header.size as usize) < len {
                len = header.size as usize;
            }
            while len > 0 && data[len - 1] == 0 {
                len -= 1;
            }
            data.truncate(len);
            return Ok(Bytes::from(data));
        }
    }
}

#[async_trait]
impl Namespace for OwserverClient {
    async fn get(&self, path: &str) -> Result<Bytes, NamespaceError> {
        let data = self.request(path).await?;
        if !is_container(path) {
            return Ok(data);
        }
        // Directory entries arrive as absolute paths; rewrite them to child
        // names so callers can form child paths by appending to the parent.
        let listing = String::from_utf8_lossy(&data);
        let names: Vec<String> = split_children(&listing)
            .map(|entry| relative_name(path, entry))
            .collect();
        Ok(Bytes::from(names.join(",")))
    }
}

fn encode_request(path: &str) -> Vec<u8> {
    let payload = path.len() + 1; // NUL-terminated
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload);
    frame.put_i32(PROTOCOL_VERSION);
    frame.put_i32(payload as i32);
    frame.put_i32(MSG_GETSLASH);
    frame.put_i32(FLAG_OWNET);
    frame.put_i32(MAX_READ);
    frame.put_i32(0); // offset
    frame.put_slice(path.as_bytes());
    frame.put_u8(0);
    frame.to_vec()
}

fn decode_header(raw: &[u8; HEADER_LEN]) -> ResponseHeader {
    let mut buf = &raw[..];
    ResponseHeader {
        version: buf.get_i32(),
        payload: buf.get_i32(),
        ret: buf.get_i32(),
        flags: buf.get_i32(),
        size: buf.get_i32(),
        offset: buf.get_i32(),
    }
}

/// Rewrite a directory entry to a name relative to the queried path,
/// keeping the trailing `/` that marks a sub-container.
fn relative_name(parent: &str, entry: &str) -> String {
    match entry.strip_prefix(parent) {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => {
            let (stem, container) = match entry.strip_suffix('/') {
                Some(stem) => (stem, true),
                None => (entry, false),
            };
            let base = stem.rsplit('/').next().unwrap_or(stem);
            if container {
                format!("{}/", base)
            } else {
                base.to_string()
            }
        }
    }
}
