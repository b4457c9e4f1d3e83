//! Bus transactions as they travel between IP blocks.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    ReadReq,
    WriteReq,
    ReadResp,
    WriteResp,
}

impl TransactionType {
    pub fn is_request(self) -> bool {
        matches!(self, Self::ReadReq | Self::WriteReq)
    }

    pub fn is_response(self) -> bool {
        !self.is_request()
    }

    /// The type of the response answering a request of this type, or the request type a
    /// response answers.
    pub fn counterpart(self) -> Self {
        match self {
            Self::ReadReq => Self::ReadResp,
            Self::WriteReq => Self::WriteResp,
            Self::ReadResp => Self::ReadReq,
            Self::WriteResp => Self::WriteReq,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            TransactionType::ReadReq => "READ_REQ",
            TransactionType::WriteReq => "WRITE_REQ",
            TransactionType::ReadResp => "READ_RESP",
            TransactionType::WriteResp => "WRITE_RESP",
        })
    }
}

/// One bus operation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txn_type: TransactionType,
    /// The IP block that initiated the transaction.
    pub initiator: u64,
    /// The IP block that processes the transaction; set by the router for requests.
    pub target: u64,
    /// Correlation id; set by the initiator, echoed by every hop.
    pub id: u64,
    pub address: u64,
    /// Size of the requested data in bytes.
    pub size: u64,
    /// Payload of write requests and read responses.
    pub data: Vec<u8>,
    /// Status of a response.
    pub ok: bool,
    /// Error message of a response that is not ok.
    pub message: String,
}

impl Transaction {
    pub fn read_request(initiator: u64, address: u64, size: u64) -> Self {
        Self {
            txn_type: TransactionType::ReadReq,
            initiator,
            target: 0,
            id: 0,
            address,
            size,
            data: Vec::new(),
            ok: true,
            message: String::new(),
        }
    }

    pub fn write_request(initiator: u64, address: u64, data: Vec<u8>) -> Self {
        Self {
            txn_type: TransactionType::WriteReq,
            size: data.len() as u64,
            data,
            ..Self::read_request(initiator, address, 0)
        }
    }

    /// Build the successful response to this request, carrying `data`.
    ///
    /// Initiator, target, correlation id, address and size are copied over.
    pub fn respond(&self, data: Vec<u8>) -> Self {
        Self {
            txn_type: self.txn_type.counterpart(),
            initiator: self.initiator,
            target: self.target,
            id: self.id,
            address: self.address,
            size: self.size,
            data,
            ok: true,
            message: String::new(),
        }
    }

    /// Build a failed response to this request with an empty payload.
    pub fn respond_err(&self, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            ..self.respond(Vec::new())
        }
    }

    pub fn is_request(&self) -> bool {
        self.txn_type.is_request()
    }

    pub fn is_response(&self) -> bool {
        self.txn_type.is_response()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {}->{} [{:#018x}+{:#x}]",
            self.txn_type, self.id, self.initiator, self.target, self.address, self.size
        )?;
        if !self.ok {
            write!(f, " error: {}", self.message)?;
        }
        Ok(())
    }
}

/// Bus transaction data as seen by a master.
///
/// For writes, `data` is the payload. For reads, `data.len()` is the number of bytes requested,
/// and `data` is filled with the bytes read once the request completes.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Buffer {
    pub address: u64,
    pub data: Vec<u8>,
}

impl Buffer {
    pub fn new(address: u64, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    /// A zero-filled buffer for reading `size` bytes at `address`.
    pub fn zeroed(address: u64, size: usize) -> Self {
        Self {
            address,
            data: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
