//! Host functions — the fixed table of capabilities callable from scripts.
//!
//! Scripts cannot import anything; every capability beyond the builtin
//! whitelist is pre-registered by the embedding executor as a host
//! function. Host calls are async so a host function can reach an LM
//! provider or other awaitable resource.

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// An async capability injected into the sandbox under a fixed name.
///
/// Errors are plain strings: they surface to the script as `HostError`
/// failures and flow back to the driving model as feedback, never as
/// kernel errors.
pub trait HostFn: Send + Sync {
    /// Invoke the capability with evaluated argument values.
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, String>>;
}

impl<F> HostFn for F
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, String>> {
        self(args)
    }
}

/// Build a host function from an async closure.
pub fn host_fn<F, Fut>(f: F) -> Arc<dyn HostFn>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    struct Closure<F>(F);

    impl<F, Fut> HostFn for Closure<F>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, String>> {
            Box::pin((self.0)(args))
        }
    }

    Arc::new(Closure(f))
}
