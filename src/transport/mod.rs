//! Transport boundary: the black-box capability this layer binds to.
//!
//! Byte framing, the msgpack codec engine, socket establishment and the
//! accept loop all live behind these traits. The binding layer only ever
//! sees:
//! - [`Connector`] / [`Connection`] — dial and single in-flight invoke
//! - [`Listener`] / [`ServerConnection`] — bind/accept and per-connection
//!   program registration
//!
//! [`memory`] provides a complete in-process implementation used by the
//! integration tests.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::WireValue;
use crate::error::{Result, RpcError};
use crate::protocol::{BoxFuture, MethodId, ProtocolId};

/// One outgoing remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The target protocol's exported numeric id.
    pub program: WireValue,
    /// The target method.
    pub method: MethodId,
    /// Positional arguments.
    pub args: Vec<WireValue>,
}

/// The remote's answer to an invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The call succeeded; the raw decoded result.
    Result(WireValue),
    /// The call failed; the wire-exported error payload.
    Error(WireValue),
}

/// An established client-side connection.
///
/// Each `invoke` is a single in-flight call whose future resolves or
/// rejects exactly once, driven entirely by the transport. Hard transport
/// failures use the `Err` channel; remote errors arrive as
/// [`Reply::Error`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Issue one remote call.
    async fn invoke(&self, call: Invocation) -> Result<Reply>;

    /// Close the connection. Best effort.
    async fn close(&self) -> Result<()>;
}

/// Dials transport connections from a [`ConnOpts`] variant.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish one connection.
    async fn connect(&self, opts: &ConnOpts) -> Result<Arc<dyn Connection>>;
}

/// Produces the error a dispatch miss on a method reports to the caller.
pub type MethodNotFoundFn = Arc<dyn Fn(ProtocolId, MethodId) -> RpcError + Send + Sync>;

/// Produces the error a dispatch miss on a whole protocol reports.
pub type ProtocolNotFoundFn = Arc<dyn Fn(ProtocolId) -> RpcError + Send + Sync>;

/// Converts an error into its wire payload, or declines.
pub type WireErrorFn = Arc<dyn Fn(&RpcError) -> Option<WireValue> + Send + Sync>;

/// A transport-facing cooked method: decoded arguments in, success value or
/// wire-exported error out.
pub type CookedMethod = Arc<
    dyn Fn(Vec<WireValue>) -> BoxFuture<'static, std::result::Result<WireValue, WireValue>>
        + Send
        + Sync,
>;

/// The cooked method table registered for one protocol.
#[derive(Default)]
pub struct MethodTable {
    methods: HashMap<MethodId, CookedMethod>,
}

impl MethodTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cooked method.
    pub fn insert(&mut self, id: MethodId, method: CookedMethod) {
        self.methods.insert(id, method);
    }

    /// Look up a cooked method.
    pub fn get(&self, id: MethodId) -> Option<&CookedMethod> {
        self.methods.get(&id)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// The per-connection handle the transport exposes to the server.
///
/// The server installs the connection's error translators and registers one
/// cooked table per protocol, keyed by the decimal exported protocol id.
pub trait ServerConnection: Send + Sync {
    /// Register a protocol's cooked method table.
    fn add_program(&self, program: &str, table: MethodTable);

    /// Install the wrapper turning uncaught failures into wire errors.
    fn set_error_wrapper(&self, f: WireErrorFn);

    /// Install the method-miss error factory.
    fn set_method_not_found_error_maker(&self, f: MethodNotFoundFn);

    /// Install the protocol-miss error factory.
    fn set_program_not_found_error_maker(&self, f: ProtocolNotFoundFn);
}

/// Invoked by the transport for every accepted connection.
pub type NewConnectionHook = Arc<dyn Fn(Arc<dyn ServerConnection>) + Send + Sync>;

/// A bound transport listener.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Bind and begin accepting; each new connection is handed to `hook`.
    async fn listen(&self, hook: NewConnectionHook) -> Result<()>;

    /// The bound port, when the address family has one.
    fn local_port(&self) -> Option<u16>;

    /// Stop accepting.
    async fn close(&self) -> Result<()>;
}

/// Connection options: exactly one address variant is active per client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnOpts {
    /// Network-address connection.
    Net {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Suppress transport-level logging.
        null_log: bool,
    },
    /// Local-socket connection.
    Unix {
        /// Socket path.
        path: String,
        /// Suppress transport-level logging.
        null_log: bool,
    },
}

impl ConnOpts {
    /// Network-address options.
    pub fn net(host: impl Into<String>, port: u16) -> Self {
        ConnOpts::Net {
            host: host.into(),
            port,
            null_log: false,
        }
    }

    /// Local-socket options.
    pub fn unix(path: impl Into<String>) -> Self {
        ConnOpts::Unix {
            path: path.into(),
            null_log: false,
        }
    }

    /// Suppress transport-level logging on this connection.
    pub fn with_null_log(mut self) -> Self {
        match &mut self {
            ConnOpts::Net { null_log, .. } | ConnOpts::Unix { null_log, .. } => *null_log = true,
        }
        self
    }

    /// Whether transport-level logging is suppressed.
    pub fn null_log(&self) -> bool {
        match self {
            ConnOpts::Net { null_log, .. } | ConnOpts::Unix { null_log, .. } => *null_log,
        }
    }

    /// The port, for the network variant.
    pub fn port(&self) -> Option<u16> {
        match self {
            ConnOpts::Net { port, .. } => Some(*port),
            ConnOpts::Unix { .. } => None,
        }
    }

    /// Rendezvous key for this address.
    pub(crate) fn addr_key(&self) -> String {
        match self {
            ConnOpts::Net { host, port, .. } => format!("{host}:{port}"),
            ConnOpts::Unix { path, .. } => path.clone(),
        }
    }
}

impl std::fmt::Display for ConnOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.addr_key())
    }
}
