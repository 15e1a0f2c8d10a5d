//! Error types for typewire.

use thiserror::Error;

use crate::codec::WireValue;
use crate::protocol::{MethodId, ProtocolId};

/// Main error type for all typewire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A wire value failed to convert to its expected typed shape.
    #[error("import error: {0}")]
    Import(String),

    /// A value matched none of the expected variants.
    #[error("variant error: {0}")]
    Variant(String),

    /// An incoming call named a method the protocol does not register.
    #[error("method not found: {protocol}.{method}")]
    MethodNotFound {
        /// Protocol the caller addressed.
        protocol: ProtocolId,
        /// Method the caller asked for.
        method: MethodId,
    },

    /// An incoming call named a protocol never registered on the connection.
    #[error("protocol not found: {protocol}")]
    ProtocolNotFound {
        /// Protocol the caller addressed.
        protocol: ProtocolId,
    },

    /// A call was attempted before the client connected.
    #[error("not connected")]
    NotConnected,

    /// A server was constructed with an empty protocol list.
    #[error("no protocols")]
    NoProtocols,

    /// A remote call failed with a wire error no unwrapper claimed.
    #[error("call failed: {0:?}")]
    Call(WireValue),

    /// Opaque transport-level failure, propagated without reinterpretation.
    #[error("transport error: {0}")]
    Transport(String),

    /// MsgPack encode error.
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmpv::encode::Error),

    /// MsgPack decode error.
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmpv::decode::Error),

    /// A handler's domain error, inspected by the protocol's error wrapper.
    #[error("handler error: {0}")]
    App(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RpcError {
    /// Import failure naming the expected shape and the actual wire tag.
    pub(crate) fn import_mismatch(expected: &'static str, actual: &str) -> Self {
        RpcError::Import(format!(
            "cannot import {expected} field, wrong type given ({actual})"
        ))
    }

    /// Wrap an application error for the server-side error wrapper.
    pub fn app<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RpcError::App(Box::new(err))
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
