//! sled-backed key/value storage with staged, all-or-nothing writes
use crate::error::LedgerError;
use crate::types::{BatchId, ReportId, SeqNo};
use sled::Batch;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key layout. All ledger state lives in the default tree under these prefixes.
pub(crate) mod keys {
    use super::*;

    pub const ROLE_PREFIX: &str = "role/";
    pub const BATCH_PREFIX: &str = "batch/";
    pub const REPORT_PREFIX: &str = "report/";
    pub const EVENT_PREFIX: &str = "event/";

    pub const NEXT_BATCH_ID: &str = "meta/next_batch_id";
    pub const NEXT_REPORT_ID: &str = "meta/next_report_id";
    pub const NEXT_SEQ: &str = "meta/next_seq";
    pub const HEAD_HASH: &str = "meta/head_hash";
    pub const PESTICIDE_CEILING: &str = "meta/pesticide_ceiling_ppm";

    pub fn role(principal: &str) -> Vec<u8> {
        format!("{ROLE_PREFIX}{principal}").into_bytes()
    }
    pub fn zone(zone: &str) -> Vec<u8> {
        format!("zone/{zone}").into_bytes()
    }
    pub fn season(year: i32) -> Vec<u8> {
        format!("season/{year}").into_bytes()
    }
    pub fn quota(year: i32, grower: &str) -> Vec<u8> {
        format!("quota/{year}/{grower}").into_bytes()
    }
    // zero padded so lexicographic order is numeric order
    pub fn batch(id: BatchId) -> Vec<u8> {
        format!("{BATCH_PREFIX}{id:020}").into_bytes()
    }
    pub fn report(id: ReportId) -> Vec<u8> {
        format!("{REPORT_PREFIX}{id:020}").into_bytes()
    }
    pub fn event(seq: SeqNo) -> Vec<u8> {
        format!("{EVENT_PREFIX}{seq:020}").into_bytes()
    }
}

/// Read access shared by committed storage and in-flight transactions.
pub trait KvRead {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError>;

    fn get<T>(&self, key: &[u8]) -> Result<Option<T>, LedgerError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    pub fn db(&self) -> &sled::Db {
        &self.instance
    }

    /// Decodes every value stored under `prefix`, in key order.
    pub fn scan_prefix<T>(&self, prefix: &str) -> Result<Vec<(Vec<u8>, T)>, LedgerError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut out = vec![];
        for entry in self.instance.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            out.push((key.to_vec(), minicbor::decode(&value)?));
        }
        Ok(out)
    }

    /// Decodes values with keys in `[from, to)`.
    pub fn range<T>(&self, from: Vec<u8>, to: Vec<u8>) -> Result<Vec<T>, LedgerError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut out = vec![];
        if from >= to {
            return Ok(out);
        }
        for entry in self.instance.range(from..to) {
            let (_, value) = entry?;
            out.push(minicbor::decode(&value)?);
        }
        Ok(out)
    }

    pub fn begin(&self) -> Tx<'_> {
        Tx {
            store: self,
            staged: BTreeMap::new(),
        }
    }
}

impl KvRead for Store {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.instance.get(key)?.map(|v| v.to_vec()))
    }
}

/// Writes staged against a [`Store`]. Reads see staged values first; nothing
/// reaches sled until [`Tx::commit`] applies the whole set as one batch.
pub struct Tx<'a> {
    store: &'a Store,
    staged: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Tx<'_> {
    pub fn put<T>(&mut self, key: Vec<u8>, value: &T) -> Result<(), LedgerError>
    where
        T: minicbor::Encode<()>,
    {
        let cbor = minicbor::to_vec(value)?;
        self.staged.insert(key, cbor);
        Ok(())
    }

    /// Like [`Store::scan_prefix`] but with staged writes layered on top.
    pub fn scan_prefix<T>(&self, prefix: &str) -> Result<Vec<(Vec<u8>, T)>, LedgerError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for entry in self.store.instance.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            merged.insert(key.to_vec(), value.to_vec());
        }
        for (key, value) in &self.staged {
            if key.starts_with(prefix.as_bytes()) {
                merged.insert(key.clone(), value.clone());
            }
        }

        let mut out = Vec::with_capacity(merged.len());
        for (key, value) in merged {
            out.push((key, minicbor::decode(&value)?));
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Applies every staged write atomically; returns how many keys were written.
    pub fn commit(self) -> Result<usize, LedgerError> {
        let written = self.staged.len();
        let mut batch = Batch::default();
        for (key, value) in self.staged {
            batch.insert(key, value);
        }
        self.store.instance.apply_batch(batch)?;
        Ok(written)
    }
}

impl KvRead for Tx<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        match self.staged.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => self.store.get_raw(key),
        }
    }
}

/// Reads a counter and stages its increment, returning the value handed out.
pub(crate) fn next_id(tx: &mut Tx<'_>, key: &str) -> Result<u64, LedgerError> {
    let current: u64 = tx.get(key.as_bytes())?.unwrap_or(1);
    tx.put(key.as_bytes().to_vec(), &(current + 1))?;
    Ok(current)
}
