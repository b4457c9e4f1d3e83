//! The bridge between local IP blocks and the rest of the interconnect.
//!
//! A [`Bridge`] goes through two phases. While setting up, slaves and masters are registered one
//! by one, the registration is committed, and [`Bridge::start`] learns about every peer and IP
//! block known to the router. Once started, two workers share the session:
//!
//! - the inbound worker receives transactions, completing the requests of local masters and
//!   handing requests aimed at local slaves to their [`Slave`] implementation;
//! - the outbound worker sends everything local masters and slaves produce, in queue order.
//!
//! Either worker stopping, for whatever reason, brings the other one down as well.

mod pending;

use crate::address_range::AddressRange;
use crate::bus::Slave;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::master::{Master, WorkItem};
use crate::queue::PendingQueue;
use crate::session::{Incoming, SessionClient, State};
use crate::transaction::{Transaction, TransactionType};
use crate::transport::Transport;
use crate::{IpConfig, SystemInfo};
use log::{debug, error, info, trace, warn};
use pending::PendingTable;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Message of the failed response sent when a local slave refuses a request.
pub const SLAVE_FAILURE_MESSAGE: &str = "Slave operation failed";

type Slaves = HashMap<u64, Mapped>;

/// A local slave and the addresses it was registered for.
struct Mapped {
    range: Option<AddressRange>,
    slave: Box<dyn Slave>,
}

pub struct Bridge {
    config: Config,
    session: Arc<SessionClient>,
    /// Registered slaves. Moved to the inbound worker once started.
    slaves: Slaves,
    queue: Arc<PendingQueue<WorkItem>>,
    pending: Arc<Mutex<PendingTable>>,
    peers: Option<Vec<SystemInfo>>,
    ip_blocks: Option<Vec<IpConfig>>,
    workers: Option<Workers>,
}

struct Workers {
    inbound: JoinHandle<Result<()>>,
    outbound: JoinHandle<Result<()>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("state", &self.session.state())
            .field("slaves", &self.slaves.keys().collect::<Vec<_>>())
            .field("running", &self.workers.is_some())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Create a disconnected bridge that will introduce itself as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(Config::new(name))
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            session: Arc::new(SessionClient::new()),
            slaves: HashMap::new(),
            queue: Arc::new(PendingQueue::new()),
            pending: Arc::default(),
            peers: None,
            ip_blocks: None,
            workers: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    /// The router's identity, or `None` while disconnected.
    pub fn router_info(&self) -> Option<SystemInfo> {
        self.session.router_info()
    }

    /// Connect to the router at `uri`.
    pub fn connect(&mut self, uri: &str) -> Result<SystemInfo> {
        self.session.connect(uri, &self.config.name)
    }

    /// Connect to the router at the configured URI.
    pub fn connect_default(&mut self) -> Result<SystemInfo> {
        self.session.connect(&self.config.uri, &self.config.name)
    }

    /// Talk to the router over an already established `transport`.
    pub fn connect_transport(&mut self, transport: Arc<dyn Transport>) -> Result<SystemInfo> {
        self.session.connect_transport(transport, &self.config.name)
    }

    /// Register `slave` as the block described by `config`, returning its id.
    ///
    /// Requests the router forwards to that id are handed to `slave` once the bridge is started.
    /// Requests falling outside `config`'s address range are refused without involving `slave`.
    pub fn register_slave<S: Slave + 'static>(&mut self, slave: S, config: IpConfig) -> Result<u64> {
        if !config.ip_type.is_slave() {
            warn!("Registering {} as a slave although it is a {}", config.name, config.ip_type);
        }
        let range = config.range();
        match range {
            None => warn!("Slave {} maps no addresses and will refuse every request", config.name),
            Some(range) => {
                if let Some(other) = self.overlapping(range) {
                    warn!("Slave {} at {range} overlaps a slave at {other}", config.name);
                }
            }
        }
        let id = self.session.register_ip(&config)?;
        self.slaves.insert(
            id,
            Mapped {
                range,
                slave: Box::new(slave),
            },
        );
        Ok(id)
    }

    fn overlapping(&self, range: AddressRange) -> Option<AddressRange> {
        self.slaves
            .values()
            .filter_map(|mapped| mapped.range)
            .find(|other| other.overlaps(range))
    }

    /// Register a full AXI software master called `name`.
    pub fn register_master(&mut self, name: &str) -> Result<Master> {
        self.register_master_ip(IpConfig::master(name))
    }

    /// Register a software master described by `config`.
    pub fn register_master_ip(&mut self, config: IpConfig) -> Result<Master> {
        let id = self.session.register_ip(&config)?;
        lock(&self.pending).add_master(id);
        Ok(Master::new(id, self.queue.clone()))
    }

    /// Finish registration. Must be called before [`start`](Self::start).
    pub fn commit_ip(&mut self) -> Result<()> {
        self.session.commit_ip()
    }

    /// Retrieve the peer and IP block lists, then start routing transactions.
    ///
    /// If retrieving the lists fails, the bridge is disconnected.
    pub fn start(&mut self) -> Result<()> {
        if self.workers.is_some() {
            return Err(Error::InvalidState {
                operation: "start the bridge",
                state: self.session.state(),
            });
        }
        let (peers, ip_blocks) = self.enumerate().map_err(|e| {
            if !e.is_usage() {
                self.disconnect();
            }
            e
        })?;
        info!(
            "Starting bridge {} with {} peers and {} IP blocks",
            self.config.name,
            peers.len(),
            ip_blocks.len()
        );
        self.peers = Some(peers);
        self.ip_blocks = Some(ip_blocks);

        let inbound = Inbound {
            session: self.session.clone(),
            queue: self.queue.clone(),
            pending: self.pending.clone(),
            slaves: std::mem::take(&mut self.slaves),
            clean: false,
        };
        let inbound = thread::Builder::new()
            .name("bridge-inbound".into())
            .spawn(move || inbound.run())
            .map_err(|e| {
                self.disconnect();
                Error::io("unable to spawn the inbound worker", e)
            })?;

        let outbound = Outbound {
            session: self.session.clone(),
            queue: self.queue.clone(),
            pending: self.pending.clone(),
            clean: false,
        };
        match thread::Builder::new()
            .name("bridge-outbound".into())
            .spawn(move || outbound.run())
        {
            Ok(outbound) => {
                self.workers = Some(Workers { inbound, outbound });
                Ok(())
            }
            Err(e) => {
                self.session.disconnect();
                let _ = inbound.join();
                self.disconnect();
                Err(Error::io("unable to spawn the outbound worker", e))
            }
        }
    }

    fn enumerate(&self) -> Result<(Vec<SystemInfo>, Vec<IpConfig>)> {
        let mut peers = Vec::new();
        while let Some(peer) = self.session.retrieve_peer_info()? {
            debug!("Peer: {peer}");
            peers.push(peer);
        }
        let mut ip_blocks = Vec::new();
        while let Some(ip) = self.session.retrieve_ip_config()? {
            debug!("IP block: {ip}");
            ip_blocks.push(ip);
        }
        Ok((peers, ip_blocks))
    }

    /// Every other system connected to the router, as learned when starting.
    pub fn peers(&self) -> Result<&[SystemInfo]> {
        self.peers.as_deref().ok_or(Error::NotStarted("peers"))
    }

    /// Every IP block registered with the router, including the local ones.
    pub fn ip_blocks(&self) -> Result<&[IpConfig]> {
        self.ip_blocks.as_deref().ok_or(Error::NotStarted("IP blocks"))
    }

    /// Block until both workers have stopped.
    ///
    /// Returns the error that stopped the inbound worker if there is one, otherwise the
    /// outbound worker's.
    pub fn wait_for_completion(&mut self) -> Result<()> {
        let workers = self.workers.take().ok_or(Error::NotRunning)?;
        let inbound = workers
            .inbound
            .join()
            .unwrap_or(Err(Error::WorkerPanicked("inbound")));
        let outbound = workers
            .outbound
            .join()
            .unwrap_or(Err(Error::WorkerPanicked("outbound")));
        inbound.and(outbound)
    }

    /// Close the connection and forget everything learned through it.
    ///
    /// Stops the workers if they are running, and releases every registered slave. Requests still
    /// waiting for a response complete with [`Error::SessionClosed`]. Calling this more than once
    /// is harmless.
    pub fn disconnect(&mut self) {
        self.session.disconnect();

        let queue = std::mem::replace(&mut self.queue, Arc::new(PendingQueue::new()));
        fail_requests(queue.close());
        if let Some(workers) = self.workers.take() {
            // Both workers notice the closed session; their outcome no longer matters.
            let _ = workers.inbound.join();
            let _ = workers.outbound.join();
        }
        let pending = std::mem::take(&mut self.pending);
        for waiter in lock(&pending).close() {
            waiter.fail(Error::SessionClosed);
        }

        self.slaves.clear();
        self.peers = None;
        self.ip_blocks = None;
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn lock(pending: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fail_requests(items: Vec<WorkItem>) {
    for item in items {
        if let WorkItem::Request { waiter, .. } = item {
            waiter.fail(Error::SessionClosed);
        }
    }
}

/// Receives transactions until the router is done. Its teardown runs on drop, so it happens even
/// if the worker panics.
struct Inbound {
    session: Arc<SessionClient>,
    queue: Arc<PendingQueue<WorkItem>>,
    pending: Arc<Mutex<PendingTable>>,
    slaves: Slaves,
    /// Set once the router ended the stream. Anything else takes the session down.
    clean: bool,
}

impl Inbound {
    fn run(mut self) -> Result<()> {
        let result = self.receive_all();
        match &result {
            Ok(()) => {
                debug!("Router ended the transaction stream");
                self.clean = true;
            }
            Err(e) => error!("Inbound worker stopped: {e}"),
        }
        result
    }

    fn receive_all(&mut self) -> Result<()> {
        loop {
            let txn = match self.session.receive_transaction()? {
                Incoming::Transaction(txn) => txn,
                Incoming::Done => return Ok(()),
            };
            trace!("Received {txn}");
            if txn.is_response() {
                let waiter = lock(&self.pending).take(&txn)?;
                waiter.complete(&txn);
            } else {
                let mapped = self
                    .slaves
                    .get_mut(&txn.target)
                    .ok_or(Error::UnknownSlave(txn.target))?;
                let response = serve(mapped.slave.as_mut(), mapped.range, &txn);
                if self.queue.push(WorkItem::Response(response)).is_err() {
                    debug!("Dropping the response to {txn}, the session is closing");
                }
            }
        }
    }
}

impl Drop for Inbound {
    fn drop(&mut self) {
        if !self.clean {
            self.session.disconnect();
        }
        self.queue.finish();
        for waiter in lock(&self.pending).close() {
            waiter.fail(Error::SessionClosed);
        }
    }
}

/// Let `slave` handle `request`, producing the response to send back.
///
/// Accesses reaching outside `range` are refused before `slave` sees them. A panicking handler
/// yields a failed response like a handler returning an error.
fn serve(slave: &mut dyn Slave, range: Option<AddressRange>, request: &Transaction) -> Transaction {
    let size = match request.txn_type {
        TransactionType::ReadReq => request.size,
        _ => request.data.len() as u64,
    };
    if !range.is_some_and(|range| range.contains_access(request.address, size)) {
        warn!(
            "Slave {} refused {request}: {size} bytes at {:#x} are not mapped by it",
            request.target, request.address
        );
        return request.respond_err(SLAVE_FAILURE_MESSAGE);
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match request.txn_type {
        TransactionType::ReadReq => match usize::try_from(size) {
            Ok(size) => {
                let mut buf = vec![0; size];
                slave.handle_read(&mut buf, request.address).map(|()| buf)
            }
            Err(_) => Err(crate::SlaveError::OutOfRange {
                address: request.address,
                size,
            }),
        },
        _ => slave
            .handle_write(request.address, &request.data)
            .map(|()| Vec::new()),
    }));
    match outcome {
        Ok(Ok(data)) => request.respond(data),
        Ok(Err(e)) => {
            warn!("Slave {} failed to handle {request}: {e}", request.target);
            request.respond_err(SLAVE_FAILURE_MESSAGE)
        }
        Err(_) => {
            error!("Slave {} panicked while handling {request}", request.target);
            request.respond_err(SLAVE_FAILURE_MESSAGE)
        }
    }
}

/// Sends queued work until the queue ends, then logs out. Like [`Inbound`], tears down on drop.
struct Outbound {
    session: Arc<SessionClient>,
    queue: Arc<PendingQueue<WorkItem>>,
    pending: Arc<Mutex<PendingTable>>,
    clean: bool,
}

impl Outbound {
    fn run(mut self) -> Result<()> {
        let result = self.send_all();
        match &result {
            Ok(()) => self.clean = true,
            Err(e) => error!("Outbound worker stopped: {e}"),
        }
        result
    }

    fn send_all(&self) -> Result<()> {
        while let Some(item) = self.queue.pop() {
            match item {
                WorkItem::Terminate(master) => self.session.send_termination(master)?,
                WorkItem::Response(txn) => {
                    trace!("Sending {txn}");
                    self.session.send_transaction(&txn)?;
                }
                WorkItem::Request { mut txn, waiter } => {
                    // Closed once the router is done; no response could be matched anymore.
                    if let Err(waiter) = lock(&self.pending).track(&mut txn, waiter) {
                        debug!("Not sending {txn}, the router is done");
                        waiter.fail(Error::SessionClosed);
                        continue;
                    }
                    trace!("Sending {txn}");
                    if let Err(e) = self.session.send_transaction(&txn) {
                        if let Some(waiter) = lock(&self.pending).forget(txn.initiator, txn.id) {
                            waiter.fail(Error::SessionClosed);
                        }
                        return Err(e);
                    }
                }
            }
        }
        debug!("Logging out");
        self.session.send_logout()
    }
}

impl Drop for Outbound {
    fn drop(&mut self) {
        fail_requests(self.queue.close());
        if !self.clean {
            self.session.disconnect();
        }
    }
}
