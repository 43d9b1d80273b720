//! SoulBrowser CDP capability surface.
//!
//! Upper layers never talk to a browser directly; they go through [`PageSession`], a minimal
//! "send a DevTools command to this page" capability. The concrete transport that launches or
//! attaches to Chromium plugs in behind [`transport::CdpTransport`].

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("command timed out")]
        Timeout,
        #[error("target node not found")]
        TargetNotFound,
        #[error("script evaluation failed")]
        EvaluationFailed,
        #[error("unexpected protocol response")]
        UnexpectedResponse,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn is_not_found(&self) -> bool {
            self.kind == AdapterErrorKind::TargetNotFound
        }
    }
}

pub mod commands;
pub mod protocol;
pub mod scripted;
pub mod scripts;
pub mod session;
pub mod transport;

pub use commands::{AxSnapshotConfig, AxSnapshotResult, RemoteObjectId};
pub use error::{AdapterError, AdapterErrorKind};
pub use scripted::ScriptedSession;
pub use session::PageSession;
pub use transport::{CdpTransport, NoopTransport, TransportSession};
