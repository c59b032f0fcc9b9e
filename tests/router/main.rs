//! Router integration tests.

#![cfg(feature = "memory")]

mod support;
mod lifecycle;
