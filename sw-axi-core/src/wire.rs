//! Messages exchanged with the router, and their binary encoding.
//!
//! The set of messages is closed: anything that doesn't decode into a [`Message`] is rejected.
//! Messages are encoded with `bincode`, the variant index serving as the message tag.

use crate::transaction::Transaction;
use crate::{IpConfig, SystemInfo};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Message {
    SystemInfo(SystemInfo),
    IpInfo(IpConfig),
    /// Acknowledges an IP registration, carrying the id the router assigned to it.
    IpAck(u64),
    Commit,
    Ack,
    Error(String),
    Transaction(Transaction),
    /// The master with the given id has finished issuing requests.
    Terminate(u64),
    Done,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::SystemInfo(_) => MessageKind::SystemInfo,
            Message::IpInfo(_) => MessageKind::IpInfo,
            Message::IpAck(_) => MessageKind::IpAck,
            Message::Commit => MessageKind::Commit,
            Message::Ack => MessageKind::Ack,
            Message::Error(_) => MessageKind::Error,
            Message::Transaction(_) => MessageKind::Transaction,
            Message::Terminate(_) => MessageKind::Terminate,
            Message::Done => MessageKind::Done,
        }
    }
}

/// Payload-free tag of a [`Message`], used in diagnostics.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MessageKind {
    SystemInfo,
    IpInfo,
    IpAck,
    Commit,
    Ack,
    Error,
    Transaction,
    Terminate,
    Done,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::SystemInfo => write!(f, "SYSTEM_INFO"),
            MessageKind::IpInfo => write!(f, "IP_INFO"),
            MessageKind::IpAck => write!(f, "IP_ACK"),
            MessageKind::Commit => write!(f, "COMMIT"),
            MessageKind::Ack => write!(f, "ACK"),
            MessageKind::Error => write!(f, "ERROR"),
            MessageKind::Transaction => write!(f, "TRANSACTION"),
            MessageKind::Terminate => write!(f, "TERMINATE"),
            MessageKind::Done => write!(f, "DONE"),
        }
    }
}

pub fn encode(message: &Message) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(message)
}

pub fn decode(bytes: &[u8]) -> Result<Message, bincode::Error> {
    bincode::deserialize(bytes)
}
