// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory record repository.
//
// Each process owns its own mutex-guarded chain, so appends to unrelated
// processes never contend.  Ids come from one shared atomic counter and are
// drawn while the process lock is held, which keeps them strictly increasing
// within a process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use ledgerwerk_core::error::{LedgerError, Result};
use ledgerwerk_core::types::{GENESIS_HASH, RecordId, SecureRecord};
use tracing::debug;

use crate::repository::{PendingRecord, RecordRepository};

type Chain = Arc<Mutex<Vec<SecureRecord>>>;

/// Volatile repository for tests, benchmarks and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    chains: RwLock<HashMap<String, Chain>>,
    next_id: AtomicI64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain(&self, process_id: &str) -> Result<Option<Chain>> {
        let chains = self.chains.read().map_err(|_| poisoned())?;
        Ok(chains.get(process_id).cloned())
    }

    fn chain_or_create(&self, process_id: &str) -> Result<Chain> {
        if let Some(chain) = self.chain(process_id)? {
            return Ok(chain);
        }
        let mut chains = self.chains.write().map_err(|_| poisoned())?;
        Ok(chains.entry(process_id.to_owned()).or_default().clone())
    }

    fn all_chains(&self) -> Result<Vec<Chain>> {
        let chains = self.chains.read().map_err(|_| poisoned())?;
        Ok(chains.values().cloned().collect())
    }
}

fn lock(chain: &Chain) -> Result<MutexGuard<'_, Vec<SecureRecord>>> {
    chain.lock().map_err(|_| poisoned())
}

fn poisoned() -> LedgerError {
    LedgerError::Persistence("in-memory repository lock poisoned".into())
}

impl RecordRepository for MemoryRepository {
    fn append(&self, pending: PendingRecord) -> Result<SecureRecord> {
        let chain = self.chain_or_create(&pending.process_id)?;
        let mut records = lock(&chain)?;

        let prev_hash = records
            .last()
            .map(|tail| tail.chain_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_owned());
        let chain_hash = pending.chain_hash_after(&prev_hash);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        let record = pending.into_record(id, prev_hash, chain_hash);
        records.push(record.clone());
        debug!(record_id = id, process_id = %record.process_id, "record appended");
        Ok(record)
    }

    fn latest_chain_hash(&self, process_id: &str) -> Result<Option<String>> {
        match self.chain(process_id)? {
            Some(chain) => Ok(lock(&chain)?.last().map(|r| r.chain_hash.clone())),
            None => Ok(None),
        }
    }

    fn get(&self, id: RecordId) -> Result<Option<SecureRecord>> {
        for chain in self.all_chains()? {
            let records = lock(&chain)?;
            if let Ok(idx) = records.binary_search_by_key(&id, |r| r.id) {
                return Ok(Some(records[idx].clone()));
            }
        }
        Ok(None)
    }

    fn visit_process(
        &self,
        process_id: &str,
        visitor: &mut dyn FnMut(SecureRecord) -> Result<()>,
    ) -> Result<()> {
        let Some(chain) = self.chain(process_id)? else {
            return Ok(());
        };
        // Snapshot so the visitor never runs under the process lock.
        let snapshot = lock(&chain)?.clone();
        for record in snapshot {
            visitor(record)?;
        }
        Ok(())
    }

    fn process_ids(&self) -> Result<Vec<String>> {
        let mut firsts = Vec::new();
        for chain in self.all_chains()? {
            if let Some(first) = lock(&chain)?.first() {
                firsts.push((first.id, first.process_id.clone()));
            }
        }
        firsts.sort_unstable_by_key(|(id, _)| *id);
        Ok(firsts.into_iter().map(|(_, pid)| pid).collect())
    }

    fn count(&self) -> Result<u64> {
        let mut total = 0u64;
        for chain in self.all_chains()? {
            total += lock(&chain)?.len() as u64;
        }
        Ok(total)
    }
}
