//! In-process transport implementing the boundary traits.
//!
//! A [`MemoryHub`] is the rendezvous: listeners register under their
//! address, connectors dial by the same address. Every call round-trips
//! through [`MsgpackCodec`] — request envelope `[program, method, args]`,
//! reply envelope `[is_error, payload]` — so exchanges prove wire-safety
//! end to end.
//!
//! Each connection runs a dedicated dispatch task fed by an mpsc channel;
//! every request is answered through its own oneshot, so concurrently
//! in-flight calls complete independently and in no particular order.
//!
//! # Example
//!
//! ```ignore
//! let hub = MemoryHub::new();
//! let listener = hub.listener(ConnOpts::net("127.0.0.1", 0));
//! listener.listen(hook).await?;
//! let conn = hub.connector().connect(&ConnOpts::net("127.0.0.1", port)).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::codec::{import_uint, MsgpackCodec, WireValue};
use crate::error::{Result, RpcError};
use crate::protocol::{MethodId, ProtocolId};
use crate::transport::{
    ConnOpts, Connection, Connector, Invocation, Listener, MethodNotFoundFn, MethodTable,
    NewConnectionHook, ProtocolNotFoundFn, Reply, ServerConnection, WireErrorFn,
};

/// Base of the ephemeral port range handed out for port-zero listens.
const EPHEMERAL_PORT_BASE: u16 = 49152;

/// Capacity of each connection's request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
struct ListenerEntry {
    hook: NewConnectionHook,
    null_log: bool,
}

struct HubState {
    listeners: HashMap<String, ListenerEntry>,
    next_port: u16,
}

/// Rendezvous point connecting in-process listeners and connectors.
#[derive(Clone)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    /// A hub with no registered listeners.
    pub fn new() -> Self {
        MemoryHub {
            state: Arc::new(Mutex::new(HubState {
                listeners: HashMap::new(),
                next_port: EPHEMERAL_PORT_BASE,
            })),
        }
    }

    /// A listener that will bind the given address on this hub.
    pub fn listener(&self, opts: ConnOpts) -> MemoryListener {
        MemoryListener {
            hub: self.state.clone(),
            opts,
            state: Mutex::new(ListenerState {
                key: None,
                port: None,
                closed: false,
            }),
        }
    }

    /// A connector dialing addresses on this hub.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            hub: self.state.clone(),
        }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

struct ListenerState {
    key: Option<String>,
    port: Option<u16>,
    closed: bool,
}

/// In-process listener.
pub struct MemoryListener {
    hub: Arc<Mutex<HubState>>,
    opts: ConnOpts,
    state: Mutex<ListenerState>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn listen(&self, hook: NewConnectionHook) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RpcError::Transport("listener closed".to_string()));
        }
        if state.key.is_some() {
            return Err(RpcError::Transport("listener already bound".to_string()));
        }

        // Port zero asks for an ephemeral hub-local port.
        let mut hub = self.hub.lock();
        let opts = match &self.opts {
            ConnOpts::Net {
                host,
                port: 0,
                null_log,
            } => {
                let port = hub.next_port;
                hub.next_port = hub.next_port.wrapping_add(1);
                ConnOpts::Net {
                    host: host.clone(),
                    port,
                    null_log: *null_log,
                }
            }
            other => other.clone(),
        };

        let key = opts.addr_key();
        if hub.listeners.contains_key(&key) {
            return Err(RpcError::Transport(format!("address in use: {key}")));
        }
        hub.listeners.insert(
            key.clone(),
            ListenerEntry {
                hook,
                null_log: opts.null_log(),
            },
        );
        drop(hub);

        if !opts.null_log() {
            info!(addr = %key, "memory transport listening");
        }
        state.port = opts.port();
        state.key = Some(key);
        Ok(())
    }

    fn local_port(&self) -> Option<u16> {
        self.state.lock().port
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(key) = state.key.take() {
            self.hub.lock().listeners.remove(&key);
            if !self.opts.null_log() {
                info!(addr = %key, "memory transport listener closed");
            }
        }
        state.closed = true;
        Ok(())
    }
}

/// In-process connector.
pub struct MemoryConnector {
    hub: Arc<Mutex<HubState>>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, opts: &ConnOpts) -> Result<Arc<dyn Connection>> {
        let key = opts.addr_key();
        let entry = self
            .hub
            .lock()
            .listeners
            .get(&key)
            .cloned()
            .ok_or_else(|| RpcError::Transport(format!("connection refused: {key}")))?;

        let shared = Arc::new(ConnState {
            programs: Mutex::new(HashMap::new()),
            error_wrapper: Mutex::new(None),
            method_not_found: Mutex::new(None),
            program_not_found: Mutex::new(None),
            null_log: entry.null_log || opts.null_log(),
        });

        // The server installs its translators and program tables inside the
        // hook, before any request can reach the dispatch task.
        (entry.hook)(Arc::new(MemoryServerConnection {
            shared: shared.clone(),
        }) as Arc<dyn ServerConnection>);

        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        tokio::spawn(dispatch_loop(rx, shared.clone()));

        if !shared.null_log {
            debug!(addr = %key, "memory transport connected");
        }
        Ok(Arc::new(MemoryConnection {
            tx: Mutex::new(Some(tx)),
        }))
    }
}

struct ConnState {
    programs: Mutex<HashMap<String, MethodTable>>,
    error_wrapper: Mutex<Option<WireErrorFn>>,
    method_not_found: Mutex<Option<MethodNotFoundFn>>,
    program_not_found: Mutex<Option<ProtocolNotFoundFn>>,
    null_log: bool,
}

/// Server-side handle for one accepted connection.
pub struct MemoryServerConnection {
    shared: Arc<ConnState>,
}

impl ServerConnection for MemoryServerConnection {
    fn add_program(&self, program: &str, table: MethodTable) {
        if !self.shared.null_log {
            debug!(program, methods = table.len(), "program registered");
        }
        self.shared
            .programs
            .lock()
            .insert(program.to_string(), table);
    }

    fn set_error_wrapper(&self, f: WireErrorFn) {
        *self.shared.error_wrapper.lock() = Some(f);
    }

    fn set_method_not_found_error_maker(&self, f: MethodNotFoundFn) {
        *self.shared.method_not_found.lock() = Some(f);
    }

    fn set_program_not_found_error_maker(&self, f: ProtocolNotFoundFn) {
        *self.shared.program_not_found.lock() = Some(f);
    }
}

struct Request {
    frame: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>>>,
}

/// Client side of an established in-process connection.
pub struct MemoryConnection {
    tx: Mutex<Option<mpsc::Sender<Request>>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn invoke(&self, call: Invocation) -> Result<Reply> {
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or_else(|| RpcError::Transport("connection closed".to_string()))?;

        let frame = encode_invocation(&call)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Request {
            frame,
            reply: reply_tx,
        })
        .await
        .map_err(|_| RpcError::Transport("connection closed".to_string()))?;

        let bytes = reply_rx
            .await
            .map_err(|_| RpcError::Transport("connection closed".to_string()))??;
        decode_reply(&bytes)
    }

    async fn close(&self) -> Result<()> {
        self.tx.lock().take();
        Ok(())
    }
}

async fn dispatch_loop(mut rx: mpsc::Receiver<Request>, state: Arc<ConnState>) {
    while let Some(req) = rx.recv().await {
        let state = state.clone();
        tokio::spawn(async move {
            let res = serve_frame(&state, &req.frame).await;
            let _ = req.reply.send(res);
        });
    }
    // Peer gone; this connection's descriptors are discarded.
    state.programs.lock().clear();
}

async fn serve_frame(state: &Arc<ConnState>, frame: &[u8]) -> Result<Vec<u8>> {
    let envelope = MsgpackCodec::decode(frame)?;
    let mut items = match envelope {
        WireValue::Array(items) if items.len() == 3 => items.into_iter(),
        _ => {
            return Err(RpcError::Transport(
                "malformed invocation envelope".to_string(),
            ))
        }
    };
    let program = items.next().unwrap_or(WireValue::Null);
    let method = items.next().unwrap_or(WireValue::Null);
    let args = items.next().unwrap_or(WireValue::Null);

    let protocol = ProtocolId::import(&program)?;
    let method = u32::try_from(import_uint(&method)?)
        .map(MethodId::new)
        .map_err(|_| RpcError::Import("method id out of range".to_string()))?;
    let args = match args {
        WireValue::Array(a) => a,
        _ => return Err(RpcError::Transport("malformed argument list".to_string())),
    };

    let reply = dispatch(state, protocol, method, args).await;
    encode_reply(&reply)
}

enum Lookup {
    Found(crate::transport::CookedMethod),
    NoProgram,
    NoMethod,
}

async fn dispatch(
    state: &Arc<ConnState>,
    protocol: ProtocolId,
    method: MethodId,
    args: Vec<WireValue>,
) -> Reply {
    let lookup = {
        let programs = state.programs.lock();
        match programs.get(&protocol.to_string()) {
            None => Lookup::NoProgram,
            Some(table) => match table.get(method) {
                None => Lookup::NoMethod,
                Some(cooked) => Lookup::Found(cooked.clone()),
            },
        }
    };

    let cooked = match lookup {
        Lookup::Found(cooked) => cooked,
        Lookup::NoProgram => {
            if !state.null_log {
                warn!(%protocol, "program not found");
            }
            let maker = state.program_not_found.lock().clone();
            let err = match maker {
                Some(make) => make(protocol),
                None => RpcError::ProtocolNotFound { protocol },
            };
            return wire_error(state, &err);
        }
        Lookup::NoMethod => {
            if !state.null_log {
                warn!(%protocol, %method, "method not found");
            }
            let maker = state.method_not_found.lock().clone();
            let err = match maker {
                Some(make) => make(protocol, method),
                None => RpcError::MethodNotFound { protocol, method },
            };
            return wire_error(state, &err);
        }
    };

    match cooked(args).await {
        Ok(v) => Reply::Result(v),
        Err(e) => Reply::Error(e),
    }
}

fn wire_error(state: &Arc<ConnState>, err: &RpcError) -> Reply {
    let wrapper = state.error_wrapper.lock().clone();
    let wrapped = wrapper.and_then(|w| w(err));
    Reply::Error(wrapped.unwrap_or(WireValue::Null))
}

fn encode_invocation(call: &Invocation) -> Result<Vec<u8>> {
    MsgpackCodec::encode(&WireValue::Array(vec![
        call.program.clone(),
        WireValue::Number(i64::from(call.method.value())),
        WireValue::Array(call.args.clone()),
    ]))
}

fn encode_reply(reply: &Reply) -> Result<Vec<u8>> {
    let (is_error, payload) = match reply {
        Reply::Result(v) => (false, v),
        Reply::Error(e) => (true, e),
    };
    MsgpackCodec::encode(&WireValue::Array(vec![
        WireValue::Bool(is_error),
        payload.clone(),
    ]))
}

fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    let envelope = MsgpackCodec::decode(bytes)?;
    match envelope {
        WireValue::Array(items) if items.len() == 2 => {
            let mut items = items.into_iter();
            let is_error = items.next().unwrap_or(WireValue::Null);
            let payload = items.next().unwrap_or(WireValue::Null);
            match is_error {
                WireValue::Bool(true) => Ok(Reply::Error(payload)),
                WireValue::Bool(false) => Ok(Reply::Result(payload)),
                _ => Err(RpcError::Transport("malformed reply envelope".to_string())),
            }
        }
        _ => Err(RpcError::Transport("malformed reply envelope".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CookedMethod;

    fn noop_hook() -> NewConnectionHook {
        Arc::new(|_conn| {})
    }

    fn echo_table() -> MethodTable {
        let mut table = MethodTable::new();
        let echo: CookedMethod = Arc::new(|args| {
            Box::pin(async move { Ok(args.into_iter().next().unwrap_or(WireValue::Null)) })
        });
        table.insert(MethodId::new(0), echo);
        table
    }

    #[tokio::test]
    async fn test_listen_assigns_ephemeral_port() {
        let hub = MemoryHub::new();
        let listener = hub.listener(ConnOpts::net("127.0.0.1", 0));
        assert_eq!(listener.local_port(), None);

        listener.listen(noop_hook()).await.unwrap();
        assert!(listener.local_port().is_some());
    }

    #[tokio::test]
    async fn test_connect_refused_without_listener() {
        let hub = MemoryHub::new();
        let err = hub
            .connector()
            .connect(&ConnOpts::net("127.0.0.1", 9))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RpcError::Transport(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[tokio::test]
    async fn test_duplicate_bind_rejected() {
        let hub = MemoryHub::new();
        let a = hub.listener(ConnOpts::unix("/tmp/a.sock"));
        let b = hub.listener(ConnOpts::unix("/tmp/a.sock"));
        a.listen(noop_hook()).await.unwrap();
        let err = b.listen(noop_hook()).await.unwrap_err();
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_invoke_round_trips_through_msgpack() {
        let hub = MemoryHub::new();
        let listener = hub.listener(ConnOpts::unix("/tmp/echo.sock").with_null_log());
        let hook: NewConnectionHook = Arc::new(|conn| {
            conn.add_program("1", echo_table());
        });
        listener.listen(hook).await.unwrap();

        let conn = hub
            .connector()
            .connect(&ConnOpts::unix("/tmp/echo.sock"))
            .await
            .unwrap();
        let reply = conn
            .invoke(Invocation {
                program: WireValue::Number(1),
                method: MethodId::new(0),
                args: vec![WireValue::String("hi".to_string())],
            })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Result(WireValue::String("hi".to_string())));
    }

    #[tokio::test]
    async fn test_dispatch_miss_without_makers_yields_null_error() {
        // No error wrapper installed: the miss still becomes a wire error.
        let hub = MemoryHub::new();
        let listener = hub.listener(ConnOpts::unix("/tmp/miss.sock").with_null_log());
        listener.listen(noop_hook()).await.unwrap();

        let conn = hub
            .connector()
            .connect(&ConnOpts::unix("/tmp/miss.sock"))
            .await
            .unwrap();
        let reply = conn
            .invoke(Invocation {
                program: WireValue::Number(5),
                method: MethodId::new(0),
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Error(WireValue::Null));
    }

    #[tokio::test]
    async fn test_installed_makers_and_wrapper_shape_the_wire_error() {
        let hub = MemoryHub::new();
        let listener = hub.listener(ConnOpts::unix("/tmp/makers.sock").with_null_log());
        let hook: NewConnectionHook = Arc::new(|conn| {
            conn.add_program("1", echo_table());
            conn.set_error_wrapper(Arc::new(|e| Some(WireValue::String(e.to_string()))));
            conn.set_method_not_found_error_maker(Arc::new(|protocol, method| {
                RpcError::MethodNotFound { protocol, method }
            }));
            conn.set_program_not_found_error_maker(Arc::new(|protocol| {
                RpcError::ProtocolNotFound { protocol }
            }));
        });
        listener.listen(hook).await.unwrap();

        let conn = hub
            .connector()
            .connect(&ConnOpts::unix("/tmp/makers.sock"))
            .await
            .unwrap();

        let reply = conn
            .invoke(Invocation {
                program: WireValue::Number(1),
                method: MethodId::new(42),
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Error(WireValue::String("method not found: 1.42".to_string()))
        );

        let reply = conn
            .invoke(Invocation {
                program: WireValue::Number(2),
                method: MethodId::new(0),
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Error(WireValue::String("protocol not found: 2".to_string()))
        );
    }

    #[tokio::test]
    async fn test_invoke_after_close_fails() {
        let hub = MemoryHub::new();
        let listener = hub.listener(ConnOpts::unix("/tmp/close.sock").with_null_log());
        listener.listen(noop_hook()).await.unwrap();

        let conn = hub
            .connector()
            .connect(&ConnOpts::unix("/tmp/close.sock"))
            .await
            .unwrap();
        conn.close().await.unwrap();

        let err = conn
            .invoke(Invocation {
                program: WireValue::Number(1),
                method: MethodId::new(0),
                args: vec![],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection closed"));
    }

    #[tokio::test]
    async fn test_connect_refused_after_listener_close() {
        let hub = MemoryHub::new();
        let listener = hub.listener(ConnOpts::unix("/tmp/stop.sock").with_null_log());
        listener.listen(noop_hook()).await.unwrap();
        listener.close().await.unwrap();

        let err = hub
            .connector()
            .connect(&ConnOpts::unix("/tmp/stop.sock"))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("refused"));
    }
}
