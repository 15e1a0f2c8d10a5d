//! RPC client: owns one transport connection and issues typed calls.
//!
//! The client moves through `Unconnected -> Connected -> Closed`:
//! 1. `connect` dials the configured [`ConnOpts`] variant
//! 2. `call` maps one remote call to one transport invoke
//! 3. `close` releases the connection
//!
//! # Example
//!
//! ```ignore
//! let mut client = Client::new(connector, ConnOpts::net("127.0.0.1", 4000));
//! client.connect().await?;
//! let res = client
//!     .call(PROTOCOL, MethodId::new(0), vec![export_int(41)], |_| None)
//!     .await?;
//! let n = import_int(&res)?;
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::codec::WireValue;
use crate::error::{Result, RpcError};
use crate::protocol::{Exportable, MethodId, ProtocolId};
use crate::transport::{ConnOpts, Connection, Connector, Invocation, Reply};

/// A client for one remote peer.
pub struct Client {
    opts: ConnOpts,
    connector: Arc<dyn Connector>,
    conn: Option<Arc<dyn Connection>>,
}

impl Client {
    /// A client that will dial `opts` through `connector`.
    pub fn new(connector: Arc<dyn Connector>, opts: ConnOpts) -> Self {
        Client {
            opts,
            connector,
            conn: None,
        }
    }

    /// Establish the transport connection.
    ///
    /// On failure the error propagates and no state changes. A repeat call
    /// dials a fresh connection and closes the previously stored one (best
    /// effort) once the new one is established.
    pub async fn connect(&mut self) -> Result<()> {
        let conn = self.connector.connect(&self.opts).await?;
        if let Some(old) = self.conn.replace(conn) {
            if let Err(err) = old.close().await {
                debug!(%err, "closing replaced connection failed");
            }
        }
        debug!(addr = %self.opts, "client connected");
        Ok(())
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Invoke a remote method.
    ///
    /// Fails immediately with [`RpcError::NotConnected`], without touching
    /// the transport, unless connected. On success resolves with the raw
    /// decoded result; importing it into a typed value is the caller's job.
    /// A remote wire error is passed to `unwrap_error`; when the unwrapper
    /// declines, the call fails with [`RpcError::Call`] carrying the raw
    /// payload.
    pub async fn call(
        &self,
        protocol: ProtocolId,
        method: MethodId,
        args: Vec<WireValue>,
        unwrap_error: impl FnOnce(&WireValue) -> Option<RpcError>,
    ) -> Result<WireValue> {
        let conn = self.conn.as_ref().ok_or(RpcError::NotConnected)?.clone();
        let call = Invocation {
            program: protocol.export(),
            method,
            args,
        };
        match conn.invoke(call).await? {
            Reply::Result(v) => Ok(v),
            Reply::Error(e) => match unwrap_error(&e) {
                Some(err) => Err(err),
                None => Err(RpcError::Call(e)),
            },
        }
    }

    /// Close the connection. Best effort; a no-op if never connected.
    pub async fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts connects, invokes and closes; echoes the first argument.
    struct MockTransport {
        connects: AtomicUsize,
        invokes: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    struct MockConnection {
        invokes: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        reply: Reply,
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn invoke(&self, call: Invocation) -> Result<Reply> {
            self.invokes.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Result(_) => Ok(Reply::Result(
                    call.args.into_iter().next().unwrap_or(WireValue::Null),
                )),
                other => Ok(other.clone()),
            }
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl MockTransport {
        fn new() -> Self {
            MockTransport {
                connects: AtomicUsize::new(0),
                invokes: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Connector for MockTransport {
        async fn connect(&self, _opts: &ConnOpts) -> Result<Arc<dyn Connection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockConnection {
                invokes: self.invokes.clone(),
                closes: self.closes.clone(),
                reply: Reply::Result(WireValue::Null),
            }))
        }
    }

    #[tokio::test]
    async fn test_call_before_connect_never_touches_transport() {
        let transport = Arc::new(MockTransport::new());
        let client = Client::new(transport.clone(), ConnOpts::net("h", 1));

        let err = client
            .call(ProtocolId::new(1), MethodId::new(0), vec![], |_| None)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NotConnected));
        assert_eq!(transport.invokes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_call_resolves_with_raw_result() {
        let transport = Arc::new(MockTransport::new());
        let mut client = Client::new(transport.clone(), ConnOpts::net("h", 1));
        client.connect().await.unwrap();
        assert!(client.is_connected());

        let res = client
            .call(
                ProtocolId::new(1),
                MethodId::new(0),
                vec![WireValue::Number(41)],
                |_| None,
            )
            .await
            .unwrap();
        assert_eq!(res, WireValue::Number(41));
        assert_eq!(transport.invokes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wire_error_goes_through_unwrapper() {
        let transport = Arc::new(MockTransport::new());
        let conn: Arc<dyn Connection> = Arc::new(MockConnection {
            invokes: transport.invokes.clone(),
            closes: transport.closes.clone(),
            reply: Reply::Error(WireValue::String("boom".to_string())),
        });
        let mut client = Client::new(transport.clone(), ConnOpts::net("h", 1));
        client.conn = Some(conn);

        let err = client
            .call(ProtocolId::new(1), MethodId::new(0), vec![], |e| {
                Some(RpcError::Transport(format!("unwrapped: {e:?}")))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unwrapped"));

        // Unwrapper declines: generic call failure carrying the payload.
        let err = client
            .call(ProtocolId::new(1), MethodId::new(0), vec![], |_| None)
            .await
            .unwrap_err();
        match err {
            RpcError::Call(v) => assert_eq!(v, WireValue::String("boom".to_string())),
            other => panic!("expected Call, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_repeat_connect_replaces_and_closes() {
        let transport = Arc::new(MockTransport::new());
        let mut client = Client::new(transport.clone(), ConnOpts::net("h", 1));

        client.connect().await.unwrap();
        assert_eq!(transport.closes.load(Ordering::SeqCst), 0);

        client.connect().await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_noop_when_never_connected() {
        let transport = Arc::new(MockTransport::new());
        let mut client = Client::new(transport.clone(), ConnOpts::net("h", 1));
        client.close().await.unwrap();
        assert_eq!(transport.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_call_after_close_fails() {
        let transport = Arc::new(MockTransport::new());
        let mut client = Client::new(transport.clone(), ConnOpts::net("h", 1));
        client.connect().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);

        let err = client
            .call(ProtocolId::new(1), MethodId::new(0), vec![], |_| None)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NotConnected));
    }
}
