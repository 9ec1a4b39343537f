//! Handler trait and type erasure.
//!
//! Routes hold handlers of *different* concrete types in one table, so each
//! is erased behind `Arc<dyn ErasedHandler>`. The chain from user code to
//! vtable call:
//!
//! ```text
//! async fn show(ctx: Context, res: Response, params: Params)
//!     -> Result<Response, HttpError> { … }          ← user writes this
//!        ↓ r.get(show)
//! show.into_boxed_handler()                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                          ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx, res, params)  at request time    ← one virtual dispatch
//! ```
//!
//! The per-request cost is one `Arc` clone plus one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::app::Context;
use crate::error::HttpError;
use crate::pattern::Params;
use crate::response::Response;

pub(crate) type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<Response, HttpError>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of [`Handler::into_boxed_handler`]; external crates cannot
/// usefully interact with it.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context, res: Response, params: Params) -> HandlerFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(ctx: Context, res: Response, params: Params)
///     -> Result<Response, HttpError>
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it, which
/// keeps the dispatch surface stable.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Context, Response, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HttpError>> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Context, Response, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HttpError>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context, Response, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HttpError>> + Send + 'static,
{
    fn call(&self, ctx: Context, res: Response, params: Params) -> HandlerFuture {
        Box::pin((self.0)(ctx, res, params))
    }
}
