//! The I/O seam between the dispatcher and whatever performs HTTP.
//!
//! # Design
//! The core never opens sockets. A `Transport` receives a fully assembled
//! `HttpRequest` together with a `ResponseCallback`, and reports back
//! through the callback: any number of progress notifications, then
//! exactly one response or error. Terminal methods consume the callback so
//! a transport cannot report twice.
//!
//! The transport may call back synchronously from `send` (as test stubs
//! do) or later from another thread.

use std::fmt;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse, Progress};

/// Performs the HTTP round-trip for the dispatcher.
pub trait Transport: Send + Sync {
    /// Start executing `request`. Returning `Err` means the request could
    /// not be dispatched at all; the callback is then dropped unused.
    fn send(&self, request: HttpRequest, callback: ResponseCallback) -> Result<(), TransportError>;
}

type TerminalFn = Box<dyn FnOnce(Result<HttpResponse, TransportError>) + Send>;
type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;

/// Completion handle a transport reports through.
pub struct ResponseCallback {
    terminal: TerminalFn,
    progress: ProgressFn,
}

impl ResponseCallback {
    pub(crate) fn new(
        terminal: impl FnOnce(Result<HttpResponse, TransportError>) + Send + 'static,
        progress: impl Fn(Progress) + Send + Sync + 'static,
    ) -> Self {
        Self {
            terminal: Box::new(terminal),
            progress: Box::new(progress),
        }
    }

    pub fn on_progress(&self, progress: Progress) {
        (self.progress)(progress)
    }

    pub fn on_response(self, response: HttpResponse) {
        (self.terminal)(Ok(response))
    }

    pub fn on_error(self, err: TransportError) {
        (self.terminal)(Err(err))
    }
}

impl fmt::Debug for ResponseCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCallback").finish_non_exhaustive()
    }
}
