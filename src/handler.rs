//! The handler function type shared by adapters, middleware and the router.

use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerError;
use crate::message::Message;

/// A message handler.
///
/// Returning `Ok` lets the adapter acknowledge the message, `Err` makes it
/// reject, unless the handler already settled the message itself.
pub type Handler = Arc<dyn Fn(&Context, &Message) -> Result<(), HandlerError> + Send + Sync>;

/// Box a closure as a [`Handler`].
///
/// ```
/// use relaybus::{handler_fn, Context, Message};
///
/// let handler = handler_fn(|_ctx, msg| {
///     assert_eq!(msg.payload_str(), Some("{}"));
///     Ok(())
/// });
/// handler(&Context::new(), &Message::new(b"{}".to_vec())).unwrap();
/// ```
pub fn handler_fn<F>(f: F) -> Handler
where
    F: Fn(&Context, &Message) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}
