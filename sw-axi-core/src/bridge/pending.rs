use crate::error::{Error, Result};
use crate::master::Waiter;
use crate::transaction::Transaction;
use std::collections::HashMap;

/// Requests sent on behalf of local masters that haven't been answered yet.
///
/// Records are keyed by `(master id, correlation id)`. Correlation ids are handed out per master,
/// counting up from 0.
#[derive(Default)]
pub(crate) struct PendingTable {
    masters: HashMap<u64, MasterRecords>,
    closed: bool,
}

#[derive(Default)]
struct MasterRecords {
    next_id: u64,
    waiting: HashMap<u64, Waiter>,
}

impl PendingTable {
    pub fn add_master(&mut self, master: u64) {
        self.masters.entry(master).or_default();
    }

    /// Stamp `txn` with the next correlation id of its initiator and remember `waiter` for it.
    ///
    /// Once the table is closed nothing is tracked anymore and the waiter is handed back.
    pub fn track(&mut self, txn: &mut Transaction, waiter: Waiter) -> Result<(), Waiter> {
        if self.closed {
            return Err(waiter);
        }
        let records = self.masters.entry(txn.initiator).or_default();
        txn.id = records.next_id;
        records.next_id += 1;
        records.waiting.insert(txn.id, waiter);
        Ok(())
    }

    /// Remove and return the waiter a `response` answers.
    pub fn take(&mut self, response: &Transaction) -> Result<Waiter> {
        let records = self
            .masters
            .get_mut(&response.initiator)
            .ok_or(Error::UnknownMaster(response.initiator))?;
        records
            .waiting
            .remove(&response.id)
            .ok_or(Error::UnknownRequest {
                master: response.initiator,
                id: response.id,
            })
    }

    /// Forget the record for `(master, id)`, e.g. because the request never made it out.
    pub fn forget(&mut self, master: u64, id: u64) -> Option<Waiter> {
        self.masters.get_mut(&master)?.waiting.remove(&id)
    }

    /// Stop tracking requests, returning every waiter still outstanding.
    pub fn close(&mut self) -> Vec<Waiter> {
        self.closed = true;
        self.masters
            .values_mut()
            .flat_map(|records| records.waiting.drain().map(|(_, waiter)| waiter))
            .collect()
    }

    #[cfg(test)]
    pub fn outstanding(&self) -> usize {
        self.masters.values().map(|r| r.waiting.len()).sum()
    }
}
