//! Protocol descriptors: named method tables plus error wrapping.
//!
//! A [`Protocol`] is built once per accepted connection from a factory
//! closing over that connection's handler context, and is immutable from
//! then on. The descriptor owns the application-facing handlers; the
//! server cooks them into the transport-facing table at registration time.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::codec::WireValue;
use crate::error::{Result, RpcError};
use crate::protocol::{Exportable, MethodId, ProtocolId};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An application method handler: positional wire arguments in, wire value
/// or error out.
pub type MethodHandler =
    Arc<dyn Fn(Vec<WireValue>) -> BoxFuture<'static, Result<WireValue>> + Send + Sync>;

/// Converts an application error into its exportable wire form.
///
/// Called with `Some(err)` for an uncaught handler failure or a dispatch
/// miss, and may be called with `None` where a protocol encodes "no error"
/// as a concrete wire value. Returning `None` declines to produce a
/// payload.
pub type ErrorWrapper =
    Arc<dyn Fn(Option<&RpcError>) -> Option<Box<dyn Exportable + Send>> + Send + Sync>;

/// One remotely invocable operation within a protocol.
pub struct MethodDescription {
    /// Human-readable method name, for diagnostics.
    pub name: String,
    /// The handler invoked with the decoded argument list.
    pub handler: MethodHandler,
}

/// A named, immutable table of remote methods keyed by [`MethodId`].
pub struct Protocol {
    name: String,
    id: ProtocolId,
    methods: HashMap<MethodId, MethodDescription>,
    error_wrapper: ErrorWrapper,
}

impl Protocol {
    /// Start building a protocol descriptor.
    pub fn builder(name: impl Into<String>, id: ProtocolId) -> ProtocolBuilder {
        ProtocolBuilder {
            name: name.into(),
            id,
            methods: HashMap::new(),
            error_wrapper: None,
        }
    }

    /// The protocol's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The protocol's numeric identity.
    pub fn id(&self) -> ProtocolId {
        self.id
    }

    /// Look up a method by id.
    pub fn method(&self, id: MethodId) -> Option<&MethodDescription> {
        self.methods.get(&id)
    }

    /// Iterate over the registered methods.
    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &MethodDescription)> {
        self.methods.iter().map(|(id, m)| (*id, m))
    }

    /// This protocol's error wrapper.
    pub fn error_wrapper(&self) -> &ErrorWrapper {
        &self.error_wrapper
    }
}

/// Builder for [`Protocol`].
pub struct ProtocolBuilder {
    name: String,
    id: ProtocolId,
    methods: HashMap<MethodId, MethodDescription>,
    error_wrapper: Option<ErrorWrapper>,
}

impl ProtocolBuilder {
    /// Register a method handler.
    ///
    /// Registering the same id twice keeps the later handler.
    pub fn method<F, Fut>(mut self, id: MethodId, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<WireValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<WireValue>> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.methods.insert(
            id,
            MethodDescription {
                name: name.into(),
                handler,
            },
        );
        self
    }

    /// Set the protocol's error wrapper.
    pub fn error_wrapper<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&RpcError>) -> Option<Box<dyn Exportable + Send>> + Send + Sync + 'static,
    {
        self.error_wrapper = Some(Arc::new(f));
        self
    }

    /// Finish the descriptor.
    ///
    /// Without an explicit error wrapper, failures export as their display
    /// string.
    pub fn build(self) -> Protocol {
        let error_wrapper = self.error_wrapper.unwrap_or_else(|| {
            Arc::new(|err| {
                let v = match err {
                    Some(e) => WireValue::String(e.to_string()),
                    None => WireValue::Null,
                };
                Some(Box::new(v) as Box<dyn Exportable + Send>)
            })
        });
        Protocol {
            name: self.name,
            id: self.id,
            methods: self.methods,
            error_wrapper,
        }
    }
}
