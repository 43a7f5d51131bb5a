use crate::batch::BatchStatus;
use crate::types::{BatchId, SeqNo};

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("principal {principal} is not permitted to {operation}")]
    Unauthorized {
        principal: String,
        operation: &'static str,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("processing step {index} of batch {batch_id} is out of range ({len} stored)")]
    IndexOutOfRange {
        batch_id: BatchId,
        index: usize,
        len: usize,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("season window start must be before its end")]
    InvalidWindow,
    #[error("per-grower harvest ceiling must be positive")]
    InvalidQuota,
    #[error("zone {0} is not approved for harvesting")]
    ZoneNotApproved(String),
    #[error("no season configured for {0}")]
    SeasonNotConfigured(i32),
    #[error("harvest timestamp falls outside the {0} season window")]
    OutsideHarvestWindow(i32),
    #[error(
        "grower {grower} would exceed the {year} quota: {used} used + {requested} requested > {max}"
    )]
    QuotaExceeded {
        grower: String,
        year: i32,
        used: u64,
        requested: u64,
        max: u64,
    },
    #[error("external species verification did not pass")]
    VerificationFailed,
    #[error("batch {batch_id} is {status:?}, cannot {operation}")]
    InvalidBatchState {
        batch_id: BatchId,
        status: BatchStatus,
        operation: &'static str,
    },
    #[error("batch {0} has already been recalled")]
    AlreadyRecalled(BatchId),
    #[error("cannot remove the last administrator")]
    LastAdministrator,
    #[error("event chain broken at sequence {seq}")]
    ChainBroken { seq: SeqNo },
    #[error("event replay failed: {0}")]
    Replay(String),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("cbor codec error: {0}")]
    Codec(String),
    #[error("ledger write lock poisoned")]
    LockPoisoned,
}

impl From<minicbor::decode::Error> for LedgerError {
    fn from(value: minicbor::decode::Error) -> Self {
        LedgerError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for LedgerError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        LedgerError::Codec(value.to_string())
    }
}
