// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Composable event filter pipeline.
//!
//! A [`Handler`] consumes one event; a [`Middleware`] wraps a handler to
//! produce a new one. The chain is built once at sink construction by
//! folding right to left, so the first registered middleware is the first to
//! see each event:
//!
//! ```text
//! append(ev) → dedup → rate_limit → ... → buffer append
//! ```

pub mod dedup;
pub mod ratelimit;

use std::sync::Arc;

use crate::event::Event;
use crate::sink::SinkError;

/// Terminal or wrapped event consumer.
pub type Handler = Arc<dyn Fn(Event) -> Result<(), SinkError> + Send + Sync>;

/// Wraps a handler, producing a new handler.
pub type Middleware = Box<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Fold middlewares over the terminal handler, right to left, so that
/// registration order equals invocation order.
pub fn compose(middlewares: Vec<Middleware>, terminal: Handler) -> Handler {
    middlewares
        .into_iter()
        .rev()
        .fold(terminal, |next, middleware| middleware(next))
}
