//! Connection to the router and the protocol state machine driving it.
//!
//! A [`SessionClient`] moves strictly forward through the [`State`]s:
//!
//! ```text
//! DISCONNECTED -> CONNECTED -> COMMITTED -> PEER_INFO_RECEIVED -> STARTED -> LOGGED_OUT
//! ```
//!
//! Every protocol step is one blocking method. A method called in a state that doesn't allow it
//! fails with [`Error::InvalidState`] without touching the connection. Any I/O failure, codec
//! failure, unexpected message, or ERROR message from the router disconnects the session before
//! the error is returned, so a session never claims to be connected over a broken connection.

use crate::error::{Error, Result};
use crate::transaction::Transaction;
use crate::transport::{self, Transport, UnixTransport};
use crate::wire::{self, Message};
use crate::{IpConfig, SystemInfo};
use log::{debug, info, trace};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Valid states of a session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum State {
    Disconnected,
    Connected,
    Committed,
    PeerInfoReceived,
    Started,
    LoggedOut,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            State::Disconnected => "DISCONNECTED",
            State::Connected => "CONNECTED",
            State::Committed => "COMMITTED",
            State::PeerInfoReceived => "PEER_INFO_RECEIVED",
            State::Started => "STARTED",
            State::LoggedOut => "LOGGED_OUT",
        })
    }
}

/// What [`SessionClient::receive_transaction`] got from the router.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Incoming {
    Transaction(Transaction),
    /// The router cleanly ended the transaction stream; nothing else will arrive.
    Done,
}

#[derive(Debug)]
struct Inner {
    state: State,
    transport: Option<Arc<dyn Transport>>,
    router_info: Option<SystemInfo>,
}

/// Client side of the router protocol.
///
/// All methods take `&self`, so one session can be shared between a thread receiving
/// transactions and a thread sending them. The lock around the session state is never held
/// during I/O.
#[derive(Debug)]
pub struct SessionClient {
    inner: Mutex<Inner>,
}

impl Default for SessionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClient {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Disconnected,
                transport: None,
                router_info: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> State {
        self.lock().state
    }

    /// The router's identity, as received while connecting. `None` when disconnected.
    pub fn router_info(&self) -> Option<SystemInfo> {
        self.lock().router_info.clone()
    }

    /// Connect to the router listening at `uri` and exchange identities.
    ///
    /// Only `unix://<path>` URIs are supported. Returns the router's [`SystemInfo`].
    pub fn connect(&self, uri: &str, name: &str) -> Result<SystemInfo> {
        self.check_disconnected()?;
        let path = transport::parse_uri(uri)?;
        debug!("Connecting to {}", path.display());
        let transport = UnixTransport::connect(&path)
            .map_err(|e| Error::io("unable to connect to the UNIX socket", e))?;
        self.connect_transport(Arc::new(transport), name)
    }

    /// Exchange identities with the router over an already established `transport`.
    pub fn connect_transport(&self, transport: Arc<dyn Transport>, name: &str) -> Result<SystemInfo> {
        {
            let mut inner = self.lock();
            if inner.state != State::Disconnected || inner.transport.is_some() {
                return Err(Error::InvalidState {
                    operation: "connect",
                    state: inner.state,
                });
            }
            inner.transport = Some(transport.clone());
        }

        let local = SystemInfo::local(name);
        self.send(&transport, "error while sending the system info", &Message::SystemInfo(local))?;

        match self.receive(&transport, "error while receiving the router's system info")? {
            Message::SystemInfo(router_info) => {
                let mut inner = self.lock();
                if inner.transport.is_none() {
                    return Err(Error::InvalidState {
                        operation: "connect",
                        state: inner.state,
                    });
                }
                inner.state = State::Connected;
                inner.router_info = Some(router_info.clone());
                info!("Connected to router {} ({})", router_info.name, router_info.system_name);
                Ok(router_info)
            }
            other => Err(self.unexpected("while connecting", "router refused the connection", other)),
        }
    }

    /// Register an IP block, returning the id the router assigned to it.
    pub fn register_ip(&self, config: &IpConfig) -> Result<u64> {
        let transport = self.expect_state("register IP", &[State::Connected])?;
        self.send(
            &transport,
            "error while sending the IP_INFO message",
            &Message::IpInfo(config.clone()),
        )?;

        match self.receive(&transport, "error while receiving the response to IP registration")? {
            Message::IpAck(id) => {
                debug!("Registered IP {} as {}", config.name, id);
                Ok(id)
            }
            other => Err(self.unexpected("while registering IP", "cannot register IP", other)),
        }
    }

    /// Confirm that all IP has been registered. Further registrations will fail.
    pub fn commit_ip(&self) -> Result<()> {
        let transport = self.expect_state("commit IP", &[State::Connected])?;
        self.send(&transport, "error while sending the COMMIT message", &Message::Commit)?;

        match self.receive(&transport, "error while receiving the commit acknowledgement")? {
            Message::Ack => {
                self.advance(State::Committed);
                Ok(())
            }
            other => Err(self.unexpected("while committing IP", "cannot commit IP", other)),
        }
    }

    /// Retrieve the system information of the next peer.
    ///
    /// Returns `None` once the router has sent the entire peer list.
    pub fn retrieve_peer_info(&self) -> Result<Option<SystemInfo>> {
        let transport = self.expect_state(
            "retrieve peer info",
            &[State::Committed, State::PeerInfoReceived],
        )?;

        match self.receive(&transport, "error while receiving the peer info")? {
            Message::SystemInfo(info) => Ok(Some(info)),
            Message::Ack => {
                self.advance(State::PeerInfoReceived);
                Ok(None)
            }
            other => Err(self.unexpected(
                "while receiving the peer list",
                "error while receiving the peer list",
                other,
            )),
        }
    }

    /// Retrieve the configuration of the next IP block registered with the router.
    ///
    /// Returns `None` once the router has sent the entire IP list.
    pub fn retrieve_ip_config(&self) -> Result<Option<IpConfig>> {
        let transport = self.expect_state(
            "retrieve IP config",
            &[State::PeerInfoReceived, State::Started],
        )?;

        match self.receive(&transport, "error while receiving the IP info")? {
            Message::IpInfo(config) => Ok(Some(config)),
            Message::Ack => {
                self.advance(State::Started);
                Ok(None)
            }
            other => Err(self.unexpected(
                "while receiving the IP list",
                "error while receiving the IP list",
                other,
            )),
        }
    }

    /// Block until the router sends the next transaction, or signals the end of the stream.
    pub fn receive_transaction(&self) -> Result<Incoming> {
        let transport = self.expect_state("receive transactions", &[State::Started])?;

        match self.receive(&transport, "error while receiving a transaction")? {
            Message::Transaction(txn) => Ok(Incoming::Transaction(txn)),
            Message::Done => Ok(Incoming::Done),
            other => Err(self.unexpected(
                "instead of a transaction",
                "error while receiving a transaction",
                other,
            )),
        }
    }

    pub fn send_transaction(&self, txn: &Transaction) -> Result<()> {
        let transport = self.expect_state("send transactions", &[State::Started])?;
        self.send(
            &transport,
            "error while sending a transaction",
            &Message::Transaction(txn.clone()),
        )
    }

    /// Notify the router that the master `id` won't issue any more requests.
    pub fn send_termination(&self, id: u64) -> Result<()> {
        let transport = self.expect_state("send termination messages", &[State::Started])?;
        self.send(
            &transport,
            "error while sending the TERMINATE message",
            &Message::Terminate(id),
        )
    }

    /// Tell the router this bridge is done. Nothing may be sent afterwards.
    pub fn send_logout(&self) -> Result<()> {
        let transport = self.expect_state("log out", &[State::Started])?;
        self.send(&transport, "error while sending the DONE message", &Message::Done)?;
        self.advance(State::LoggedOut);
        Ok(())
    }

    /// Close the connection. It is safe to call this any number of times, from any thread.
    pub fn disconnect(&self) {
        let transport = {
            let mut inner = self.lock();
            inner.state = State::Disconnected;
            inner.router_info = None;
            inner.transport.take()
        };

        if let Some(transport) = transport {
            transport.shutdown();
            info!("Disconnected from the router");
        }
    }

    fn check_disconnected(&self) -> Result<()> {
        let inner = self.lock();
        match inner.state {
            State::Disconnected if inner.transport.is_none() => Ok(()),
            state => Err(Error::InvalidState {
                operation: "connect",
                state,
            }),
        }
    }

    /// Returns the transport if the session is in one of the `allowed` states.
    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[State],
    ) -> Result<Arc<dyn Transport>> {
        let inner = self.lock();
        match &inner.transport {
            Some(transport) if allowed.contains(&inner.state) => Ok(transport.clone()),
            _ => Err(Error::InvalidState {
                operation,
                state: inner.state,
            }),
        }
    }

    /// Move to `state`, unless the session has been disconnected in the meantime.
    fn advance(&self, state: State) {
        let mut inner = self.lock();
        if inner.transport.is_some() {
            trace!("Session state {} -> {}", inner.state, state);
            inner.state = state;
        }
    }

    fn send(
        &self,
        transport: &Arc<dyn Transport>,
        context: &'static str,
        message: &Message,
    ) -> Result<()> {
        let frame = wire::encode(message).map_err(|source| {
            self.disconnect();
            Error::Codec { context, source }
        })?;
        transport.send_frame(&frame).map_err(|source| {
            self.disconnect();
            Error::io(context, source)
        })?;
        trace!("Sent a {} message", message.kind());
        Ok(())
    }

    fn receive(&self, transport: &Arc<dyn Transport>, context: &'static str) -> Result<Message> {
        let frame = transport.recv_frame().map_err(|source| {
            self.disconnect();
            Error::io(context, source)
        })?;
        let message = wire::decode(&frame).map_err(|source| {
            self.disconnect();
            Error::Codec { context, source }
        })?;
        trace!("Received a {} message", message.kind());
        Ok(message)
    }

    /// Turn a message that doesn't belong in the current exchange into an error, disconnecting.
    fn unexpected(
        &self,
        context: &'static str,
        peer_context: &'static str,
        message: Message,
    ) -> Error {
        self.disconnect();
        match message {
            Message::Error(message) => Error::Peer {
                context: peer_context,
                message,
            },
            other => Error::UnexpectedMessage {
                context,
                kind: other.kind(),
            },
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
