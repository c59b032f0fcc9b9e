//! Router - binds handlers and middleware to a subscriber.

mod error;
mod router;

pub use error::RouterError;
pub use router::Router;
