//! Append-only, hash-chained audit log of every accepted mutation
//!
//! Each record carries the sha256 digest of the CBOR encoding of the record
//! before it, so rewriting any stored record breaks the chain from that point.
use crate::batch::{BatchStatus, ProcessingStep};
use crate::error::LedgerError;
use crate::lab_report::LabReport;
use crate::registry::Season;
use crate::store::{KvRead, Store, Tx, keys, next_id};
use crate::types::{BatchId, Principal, ReportId, Role, SeqNo, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub enum EventKind {
    #[n(0)]
    RoleGranted {
        #[n(0)]
        principal: Principal,
        #[n(1)]
        role: Role,
    },
    #[n(1)]
    RoleRevoked {
        #[n(0)]
        principal: Principal,
        #[n(1)]
        role: Role,
    },
    #[n(2)]
    ZoneApprovalSet {
        #[n(0)]
        zone: String,
        #[n(1)]
        approved: bool,
    },
    #[n(3)]
    SeasonConfigured {
        #[n(0)]
        season: Season,
    },
    #[n(4)]
    PesticideCeilingSet {
        #[n(0)]
        ceiling_ppm: f64,
    },
    #[n(5)]
    BatchCreated {
        #[n(0)]
        batch_id: BatchId,
        #[n(1)]
        species: String,
        #[n(2)]
        grower: Principal,
        #[n(3)]
        zone: String,
        #[n(4)]
        harvest_timestamp: TimeStamp<Utc>,
        #[n(5)]
        season_year: i32,
        #[n(6)]
        quantity: u64,
        #[n(7)]
        photo_ref: String,
    },
    #[n(6)]
    LabReportAttached {
        #[n(0)]
        report: LabReport, // as stored, after any forced fail
        #[n(1)]
        status: BatchStatus,
    },
    #[n(7)]
    ThresholdViolation {
        #[n(0)]
        batch_id: BatchId,
        #[n(1)]
        report_id: ReportId,
        #[n(2)]
        grower: Principal,
        #[n(3)]
        measured_ppm: f64,
        #[n(4)]
        ceiling_ppm: f64,
    },
    #[n(8)]
    ProcessingStepAdded {
        #[n(0)]
        batch_id: BatchId,
        #[n(1)]
        index: u64,
        #[n(2)]
        step: ProcessingStep,
        #[n(3)]
        status: BatchStatus,
    },
    #[n(9)]
    BatchRecalled {
        #[n(0)]
        batch_id: BatchId,
        #[n(1)]
        reason: String,
        #[n(2)]
        previous_status: BatchStatus,
    },
}

/// Payload-free discriminant of [`EventKind`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    RoleGranted,
    RoleRevoked,
    ZoneApprovalSet,
    SeasonConfigured,
    PesticideCeilingSet,
    BatchCreated,
    LabReportAttached,
    ThresholdViolation,
    ProcessingStepAdded,
    BatchRecalled,
}

impl EventKind {
    pub fn tag(&self) -> EventTag {
        match self {
            EventKind::RoleGranted { .. } => EventTag::RoleGranted,
            EventKind::RoleRevoked { .. } => EventTag::RoleRevoked,
            EventKind::ZoneApprovalSet { .. } => EventTag::ZoneApprovalSet,
            EventKind::SeasonConfigured { .. } => EventTag::SeasonConfigured,
            EventKind::PesticideCeilingSet { .. } => EventTag::PesticideCeilingSet,
            EventKind::BatchCreated { .. } => EventTag::BatchCreated,
            EventKind::LabReportAttached { .. } => EventTag::LabReportAttached,
            EventKind::ThresholdViolation { .. } => EventTag::ThresholdViolation,
            EventKind::ProcessingStepAdded { .. } => EventTag::ProcessingStepAdded,
            EventKind::BatchRecalled { .. } => EventTag::BatchRecalled,
        }
    }

    /// The batch this event touches, if any.
    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            EventKind::BatchCreated { batch_id, .. }
            | EventKind::ThresholdViolation { batch_id, .. }
            | EventKind::ProcessingStepAdded { batch_id, .. }
            | EventKind::BatchRecalled { batch_id, .. } => Some(*batch_id),
            EventKind::LabReportAttached { report, .. } => Some(report.batch_id),
            _ => None,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct EventRecord {
    #[n(0)]
    pub seq: SeqNo,
    #[n(1)]
    pub actor: Principal,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub kind: EventKind,
    #[n(4)]
    pub prev_hash: String, // sha256 hex of the previous record, zeros for the first
}

impl EventRecord {
    /// Returns the record's hash together with its CBOR encoding.
    pub fn build(&self) -> Result<(String, Vec<u8>), LedgerError> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

pub fn genesis_hash() -> String {
    hex::encode([0u8; 32])
}

/// Stages one record with the next sequence number and moves the chain head.
pub(crate) fn append(
    tx: &mut Tx<'_>,
    actor: &str,
    timestamp: TimeStamp<Utc>,
    kind: EventKind,
) -> Result<SeqNo, LedgerError> {
    let seq = next_id(tx, keys::NEXT_SEQ)?;
    let prev_hash: String = tx
        .get(keys::HEAD_HASH.as_bytes())?
        .unwrap_or_else(genesis_hash);

    let record = EventRecord {
        seq,
        actor: actor.to_string(),
        timestamp,
        kind,
        prev_hash,
    };
    let (hash, _) = record.build()?;

    tx.put(keys::event(seq), &record)?;
    tx.put(keys::HEAD_HASH.as_bytes().to_vec(), &hash)?;
    Ok(seq)
}

/// Read-only projections over committed records.
pub struct EventLog<'a> {
    store: &'a Store,
}

impl<'a> EventLog<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn len(&self) -> Result<u64, LedgerError> {
        let next: u64 = self.store.get(keys::NEXT_SEQ.as_bytes())?.unwrap_or(1);
        Ok(next - 1)
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    pub fn head_hash(&self) -> Result<String, LedgerError> {
        Ok(self
            .store
            .get(keys::HEAD_HASH.as_bytes())?
            .unwrap_or_else(genesis_hash))
    }

    pub fn get(&self, seq: SeqNo) -> Result<EventRecord, LedgerError> {
        self.store
            .get(&keys::event(seq))?
            .ok_or_else(|| LedgerError::NotFound(format!("event {seq}")))
    }

    /// Records with `from <= seq < to`, in sequence order.
    pub fn range(&self, from: SeqNo, to: SeqNo) -> Result<Vec<EventRecord>, LedgerError> {
        self.store.range(keys::event(from), keys::event(to))
    }

    pub fn all(&self) -> Result<Vec<EventRecord>, LedgerError> {
        Ok(self
            .store
            .scan_prefix::<EventRecord>(keys::EVENT_PREFIX)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    pub fn filter<F>(&self, predicate: F) -> Result<Vec<EventRecord>, LedgerError>
    where
        F: Fn(&EventRecord) -> bool,
    {
        Ok(self.all()?.into_iter().filter(|r| predicate(r)).collect())
    }

    pub fn by_kind(&self, tag: EventTag) -> Result<Vec<EventRecord>, LedgerError> {
        self.filter(|r| r.kind.tag() == tag)
    }

    pub fn by_batch(&self, batch_id: BatchId) -> Result<Vec<EventRecord>, LedgerError> {
        self.filter(|r| r.kind.batch_id() == Some(batch_id))
    }

    pub fn by_actor(&self, actor: &str) -> Result<Vec<EventRecord>, LedgerError> {
        self.filter(|r| r.actor == actor)
    }

    /// Walks the whole log recomputing hashes. Returns the number of records checked.
    pub fn verify_chain(&self) -> Result<u64, LedgerError> {
        let mut expected_prev = genesis_hash();
        let mut expected_seq = 1;
        for record in self.all()? {
            if record.seq != expected_seq || record.prev_hash != expected_prev {
                return Err(LedgerError::ChainBroken { seq: record.seq });
            }
            expected_prev = record.build()?.0;
            expected_seq += 1;
        }
        if expected_prev != self.head_hash()? {
            return Err(LedgerError::ChainBroken { seq: expected_seq });
        }
        Ok(expected_seq - 1)
    }
}
