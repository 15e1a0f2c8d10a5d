//! RPC server: registers protocols and dispatches incoming calls.
//!
//! For every accepted connection the server:
//! 1. builds one handler context bound to that connection's transport handle
//! 2. runs every protocol factory against the context
//! 3. installs the effective error wrapper and the not-found error makers
//! 4. cooks each protocol's method table and registers it under the
//!    protocol's exported numeric id
//!
//! # Example
//!
//! ```ignore
//! let server = Server::new(
//!     listener,
//!     Arc::new(|conn| Counter::new(conn)),
//!     vec![Arc::new(|h: &Arc<Counter>| counter_protocol(h))],
//!     ServerOpts::default(),
//! )?;
//! server.listen().await?;
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::WireValue;
use crate::error::{Result, RpcError};
use crate::protocol::{ErrorWrapper, Exportable, Protocol};
use crate::transport::{
    CookedMethod, Listener, MethodTable, NewConnectionHook, ServerConnection,
};

/// Builds one handler context per accepted connection.
pub type HandlerFactory<H> = Arc<dyn Fn(Arc<dyn ServerConnection>) -> H + Send + Sync>;

/// Builds one protocol descriptor from a connection's handler context.
pub type ProtocolFactory<H> = Arc<dyn Fn(&Arc<H>) -> Protocol + Send + Sync>;

/// Server construction options.
#[derive(Default)]
pub struct ServerOpts {
    /// Overrides the first registered protocol's error wrapper.
    pub error_wrapper: Option<ErrorWrapper>,
}

/// A listening RPC server.
pub struct Server<H> {
    listener: Arc<dyn Listener>,
    make_handler: HandlerFactory<H>,
    protocols: Vec<ProtocolFactory<H>>,
    error_wrapper: Option<ErrorWrapper>,
    port: Option<u16>,
}

impl<H: Send + Sync + 'static> Server<H> {
    /// Construct a server.
    ///
    /// Fails fast with [`RpcError::NoProtocols`] when `protocols` is empty,
    /// before any listen attempt; a server must expose at least one
    /// protocol.
    pub fn new(
        listener: Arc<dyn Listener>,
        make_handler: HandlerFactory<H>,
        protocols: Vec<ProtocolFactory<H>>,
        opts: ServerOpts,
    ) -> Result<Self> {
        if protocols.is_empty() {
            return Err(RpcError::NoProtocols);
        }
        Ok(Server {
            listener,
            make_handler,
            protocols,
            error_wrapper: opts.error_wrapper,
            port: None,
        })
    }

    /// Bind and start accepting connections.
    ///
    /// On success the bound port is recorded; see [`Server::port`].
    pub async fn listen(&mut self) -> Result<()> {
        let make_handler = self.make_handler.clone();
        let protocols = self.protocols.clone();
        let error_wrapper = self.error_wrapper.clone();
        let hook: NewConnectionHook = Arc::new(move |conn| {
            register_connection(&make_handler, &protocols, error_wrapper.clone(), conn);
        });

        self.listener.listen(hook).await?;
        self.port = self.listener.local_port();
        info!(port = ?self.port, "server listening");
        Ok(())
    }

    /// The bound port, once listening on a port-bearing address.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Stop accepting connections.
    pub async fn stop(&self) -> Result<()> {
        self.listener.close().await
    }
}

/// Per-connection setup: handler context, descriptors, translators, cooked
/// tables.
fn register_connection<H>(
    make_handler: &HandlerFactory<H>,
    protocols: &[ProtocolFactory<H>],
    error_wrapper: Option<ErrorWrapper>,
    conn: Arc<dyn ServerConnection>,
) {
    let handler = Arc::new(make_handler(conn.clone()));
    let built: Vec<Protocol> = protocols.iter().map(|make| make(&handler)).collect();

    // Explicit override, else the first registered protocol's wrapper.
    let effective = error_wrapper.or_else(|| built.first().map(|p| p.error_wrapper().clone()));
    if let Some(wrapper) = effective {
        conn.set_error_wrapper(Arc::new(move |err| {
            wrapper(Some(err)).map(|we| we.export())
        }));
    }

    conn.set_method_not_found_error_maker(Arc::new(|protocol, method| {
        RpcError::MethodNotFound { protocol, method }
    }));
    conn.set_program_not_found_error_maker(Arc::new(|protocol| RpcError::ProtocolNotFound {
        protocol,
    }));

    for protocol in built {
        let table = cook_protocol(&protocol);
        debug!(
            protocol = protocol.name(),
            id = %protocol.id(),
            methods = table.len(),
            "protocol registered"
        );
        conn.add_program(&protocol.id().to_string(), table);
    }
}

/// Cook a protocol into its transport-facing method table.
///
/// Each cooked method runs the application handler and resolves with the
/// success value, or with the protocol's wire-exported error when the
/// handler fails. A wrapper that declines yields a null wire error.
fn cook_protocol(protocol: &Protocol) -> MethodTable {
    let mut table = MethodTable::new();
    for (id, desc) in protocol.methods() {
        let handler = desc.handler.clone();
        let wrapper = protocol.error_wrapper().clone();
        let cooked: CookedMethod = Arc::new(move |args| {
            let fut = handler(args);
            let wrapper = wrapper.clone();
            Box::pin(async move {
                match fut.await {
                    Ok(v) => Ok(v),
                    Err(err) => {
                        let wire = wrapper(Some(&err)).map(|we| we.export());
                        Err(wire.unwrap_or(WireValue::Null))
                    }
                }
            })
        });
        table.insert(id, cooked);
    }
    table
}
