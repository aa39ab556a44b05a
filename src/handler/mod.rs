use crate::context::Context;
use crate::error::Cause;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Middleware and route task. Any `Fn(Context) -> impl Future<Output = ()>` qualifies.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture<'static, ()>;
}

impl<F, R> Handler for F
where
    F: Fn(Context) -> R + Send + Sync + 'static,
    R: Future<Output = ()> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, ()> {
        Box::pin((self)(ctx))
    }
}

/// Declared-error and uncaught-error task; receives the cause recorded by `throw`.
pub trait ErrorHandler: Send + Sync + 'static {
    fn call(&self, cause: Cause, ctx: Context) -> BoxFuture<'static, ()>;
}

impl<F, R> ErrorHandler for F
where
    F: Fn(Cause, Context) -> R + Send + Sync + 'static,
    R: Future<Output = ()> + Send + 'static,
{
    fn call(&self, cause: Cause, ctx: Context) -> BoxFuture<'static, ()> {
        Box::pin((self)(cause, ctx))
    }
}

pub(crate) type BoxedHandler = Arc<dyn Handler>;
pub(crate) type BoxedErrorHandler = Arc<dyn ErrorHandler>;
