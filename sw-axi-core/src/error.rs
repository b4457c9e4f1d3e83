use crate::session::State;
use crate::wire::MessageKind;
use std::io;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while talking to the router.
#[derive(Error, Debug)]
pub enum Error {
    /// A session operation was invoked in a state that doesn't allow it. No I/O was performed.
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: State,
    },
    #[error("can only communicate over UNIX domain sockets: {0}")]
    InvalidUri(String),
    #[error("socket path too long ({len} > {max} bytes): {path}")]
    PathTooLong { path: String, len: usize, max: usize },
    /// Peers and IP blocks are only known once the bridge has been started.
    #[error("the bridge needs to be started in order to enumerate {0}")]
    NotStarted(&'static str),
    #[error("the bridge is not running")]
    NotRunning,

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Codec {
        context: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("got an unexpected {kind} message {context}")]
    UnexpectedMessage {
        context: &'static str,
        kind: MessageKind,
    },
    #[error("got a response for an unknown master: {0}")]
    UnknownMaster(u64),
    #[error("got a response for an unknown request: {id} (master {master})")]
    UnknownRequest { master: u64, id: u64 },
    #[error("got a request meant for an unknown slave: {0}")]
    UnknownSlave(u64),

    /// The router sent an explicit ERROR message.
    #[error("{context}: {message}")]
    Peer {
        context: &'static str,
        message: String,
    },

    /// The response to a request came back with `ok == false`; carries the response's message.
    #[error("{0}")]
    Response(String),
    /// The session went away before the request was answered.
    #[error("session closed before the request completed")]
    SessionClosed,
    #[error("the {0} worker panicked")]
    WorkerPanicked(&'static str),
}

impl Error {
    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Returns `true` for errors caused by calling an operation at the wrong time or with bad
    /// arguments. These never touch the network and leave the session as it was.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. }
                | Self::InvalidUri(_)
                | Self::PathTooLong { .. }
                | Self::NotStarted(_)
                | Self::NotRunning
        )
    }

    /// Returns `true` for errors after which the session is gone.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Codec { .. }
                | Self::UnexpectedMessage { .. }
                | Self::UnknownMaster(_)
                | Self::UnknownRequest { .. }
                | Self::UnknownSlave(_)
                | Self::Peer { .. }
        )
    }
}
