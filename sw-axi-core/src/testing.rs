//! Scripted stand-in for the router, driving the other end of a socket pair.

use crate::transport::{Transport, UnixTransport};
use crate::wire::{self, Message};
use crate::{IpConfig, SystemInfo};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

pub(crate) struct Peer {
    transport: UnixTransport,
}

/// Returns the bridge-side transport and the router-side peer of a fresh socket pair.
pub(crate) fn pair() -> (Arc<dyn Transport>, Peer) {
    let (ours, theirs) = UnixStream::pair().unwrap();
    (
        Arc::new(UnixTransport::from_stream(ours).unwrap()),
        Peer::from_stream(theirs),
    )
}

pub(crate) fn router_info() -> SystemInfo {
    SystemInfo {
        name: "router".into(),
        system_name: "Linux Golang".into(),
        pid: 1,
        hostname: "localhost".into(),
    }
}

impl Peer {
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            transport: UnixTransport::from_stream(stream).unwrap(),
        }
    }

    pub fn send(&self, message: Message) {
        self.transport
            .send_frame(&wire::encode(&message).unwrap())
            .unwrap();
    }

    pub fn send_raw(&self, frame: &[u8]) {
        self.transport.send_frame(frame).unwrap();
    }

    pub fn recv(&self) -> Message {
        wire::decode(&self.transport.recv_frame().unwrap()).unwrap()
    }

    /// Receive and return the next message, or `None` if the bridge closed the connection.
    pub fn try_recv(&self) -> Option<Message> {
        let frame = self.transport.recv_frame().ok()?;
        Some(wire::decode(&frame).unwrap())
    }

    /// Answer the bridge's SYSTEM_INFO with the router's.
    pub fn accept(&self) -> SystemInfo {
        let Message::SystemInfo(info) = self.recv() else {
            panic!("expected SYSTEM_INFO");
        };
        self.send(Message::SystemInfo(router_info()));
        info
    }

    /// Acknowledge IP registrations, handing out ids from `first_id`, until the commit.
    pub fn accept_ip(&self, first_id: u64) -> Vec<IpConfig> {
        let mut registered = Vec::new();
        loop {
            match self.recv() {
                Message::IpInfo(mut config) => {
                    let id = first_id + registered.len() as u64;
                    self.send(Message::IpAck(id));
                    config.id = Some(id);
                    registered.push(config);
                }
                Message::Commit => {
                    self.send(Message::Ack);
                    return registered;
                }
                other => panic!("unexpected {} during registration", other.kind()),
            }
        }
    }

    /// Send the peer and IP lists, each followed by its ACK terminator.
    pub fn publish(&self, peers: &[SystemInfo], ips: &[IpConfig]) {
        for peer in peers {
            self.send(Message::SystemInfo(peer.clone()));
        }
        self.send(Message::Ack);
        for ip in ips {
            self.send(Message::IpInfo(ip.clone()));
        }
        self.send(Message::Ack);
    }
}
