//! The HTTP execution primitive.
//!
//! A transport starts one request and reports raw output as events: the
//! response head followed by the body on stdout, diagnostics on stderr, and a
//! final exit status. Exit codes follow curl's numbering so that failures of
//! every transport go through the same classifier.

pub mod curl;
pub mod http;
pub mod process;

pub use curl::CurlTransport;
pub use http::HttpTransport;

use crate::config::Timeouts;
use crate::error::Result;
use std::fmt;
use std::path::Path;
use tokio::sync::mpsc;

/// Events delivered in the order the transport produced them. `Exited` is
/// always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exited(TransportExit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl TransportExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// The transport went away without reporting a status.
    pub fn lost() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for TransportExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("no exit status"),
        }
    }
}

/// Everything a transport needs to issue one POST.
#[derive(Debug, Clone, Copy)]
pub struct TransportCall<'a> {
    pub url: &'a str,
    pub headers: &'a [(String, String)],
    /// Staged request body.
    pub body_path: &'a Path,
    pub timeouts: Timeouts,
}

pub trait Transport: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Start the request. Must be called from within a Tokio runtime.
    fn spawn(&self, call: TransportCall<'_>) -> Result<TransportHandle>;
}

/// Termination hooks for a running transport.
pub trait TransportControl: Send {
    /// Ask the transport to stop cooperatively.
    fn interrupt(&mut self);

    fn kill(&mut self);

    /// Drop any artifacts the transport created. Failures are logged.
    fn release(&mut self) {}
}

/// Exclusive ownership of one running transport.
pub struct TransportHandle {
    events: mpsc::Receiver<TransportEvent>,
    control: Box<dyn TransportControl>,
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

impl TransportHandle {
    pub fn new(events: mpsc::Receiver<TransportEvent>, control: Box<dyn TransportControl>) -> Self {
        Self { events, control }
    }

    /// Next event; `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn interrupt(&mut self) {
        self.control.interrupt();
    }

    pub fn kill(&mut self) {
        self.control.kill();
    }

    pub fn release(&mut self) {
        self.events.close();
        self.control.release();
    }
}
