//! Batch records and the status state machine
use crate::error::LedgerError;
use crate::types::{BatchId, Principal, ReportId, TimeStamp};
use chrono::Utc;

/// Processing step type that moves a batch from `Processing` to `Complete`.
pub const FINAL_STEP_TYPE: &str = "FinalPackaging";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    #[n(0)]
    Harvested,
    #[n(1)]
    Tested,
    #[n(2)]
    Processing,
    #[n(3)]
    Complete,
    #[n(4)]
    Recalled,
}

impl BatchStatus {
    /// Position in `Harvested < Tested < Processing < Complete`. `Recalled` sits outside the order.
    pub fn stage(&self) -> Option<u8> {
        match self {
            BatchStatus::Harvested => Some(0),
            BatchStatus::Tested => Some(1),
            BatchStatus::Processing => Some(2),
            BatchStatus::Complete => Some(3),
            BatchStatus::Recalled => None,
        }
    }
    pub fn is_terminal(&self) -> bool {
        *self == BatchStatus::Recalled
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ProcessingStep {
    #[n(0)]
    pub processor: Principal,
    #[n(1)]
    pub step_type: String,
    #[n(2)]
    pub metadata_ref: String, // off-ledger pointer
    #[n(3)]
    pub timestamp: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    #[n(0)]
    pub id: BatchId,
    #[n(1)]
    pub species: String,
    #[n(2)]
    pub grower: Principal,
    #[n(3)]
    pub zone: String,
    #[n(4)]
    pub harvest_timestamp: TimeStamp<Utc>,
    #[n(5)]
    pub season_year: i32,
    #[n(6)]
    pub quantity: u64,
    #[n(7)]
    pub photo_ref: String,
    #[n(8)]
    pub status: BatchStatus,
    #[n(9)]
    pub recalled: bool,
    #[n(10)]
    pub recall_reason: Option<String>,
    #[n(11)]
    pub lab_report_ids: Vec<ReportId>,
    #[n(12)]
    pub processing_steps: Vec<ProcessingStep>,
}

impl Batch {
    fn invalid_state(&self, operation: &'static str) -> LedgerError {
        LedgerError::InvalidBatchState {
            batch_id: self.id,
            status: self.status,
            operation,
        }
    }

    /// Links a report. `Harvested` becomes `Tested`; `Tested` and `Processing` accept
    /// further reports unchanged.
    pub fn attach_lab_report(&mut self, report_id: ReportId) -> Result<BatchStatus, LedgerError> {
        let next = match self.status {
            BatchStatus::Harvested => BatchStatus::Tested,
            BatchStatus::Tested | BatchStatus::Processing => self.status,
            BatchStatus::Complete | BatchStatus::Recalled => {
                return Err(self.invalid_state("attach a lab report"));
            }
        };
        self.lab_report_ids.push(report_id);
        self.status = next;
        Ok(next)
    }

    /// Appends a processing step. The first step after testing starts processing;
    /// a `FinalPackaging` step while processing completes the batch.
    pub fn append_processing_step(
        &mut self,
        step: ProcessingStep,
    ) -> Result<BatchStatus, LedgerError> {
        let next = match self.status {
            BatchStatus::Tested => BatchStatus::Processing,
            BatchStatus::Processing if step.step_type == FINAL_STEP_TYPE => BatchStatus::Complete,
            BatchStatus::Processing => BatchStatus::Processing,
            BatchStatus::Harvested | BatchStatus::Complete | BatchStatus::Recalled => {
                return Err(self.invalid_state("add a processing step"));
            }
        };
        self.processing_steps.push(step);
        self.status = next;
        Ok(next)
    }

    /// One-way move to `Recalled`. Returns the status the batch held before.
    pub fn recall(&mut self, reason: &str) -> Result<BatchStatus, LedgerError> {
        if self.recalled || self.status.is_terminal() {
            return Err(LedgerError::AlreadyRecalled(self.id));
        }
        let previous = self.status;
        self.status = BatchStatus::Recalled;
        self.recalled = true;
        self.recall_reason = Some(reason.to_string());
        Ok(previous)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            id: self.id,
            species: self.species.clone(),
            grower: self.grower.clone(),
            zone: self.zone.clone(),
            harvest_timestamp: self.harvest_timestamp.clone(),
            season_year: self.season_year,
            quantity: self.quantity,
            photo_ref: self.photo_ref.clone(),
            status: self.status,
            recalled: self.recalled,
            lab_report_count: self.lab_report_ids.len(),
            processing_step_count: self.processing_steps.len(),
        }
    }
}

/// Read view returned by `get_batch_summary`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub id: BatchId,
    pub species: String,
    pub grower: Principal,
    pub zone: String,
    pub harvest_timestamp: TimeStamp<Utc>,
    pub season_year: i32,
    pub quantity: u64,
    pub photo_ref: String,
    pub status: BatchStatus,
    pub recalled: bool,
    pub lab_report_count: usize,
    pub processing_step_count: usize,
}

// used for constructing createBatch requests
#[derive(Debug, Clone, Default)]
pub struct BatchDraft {
    species: String,
    quantity: u64,
    zone: String,
    harvest_timestamp: Option<TimeStamp<Utc>>,
    season_year: Option<i32>,
    photo_ref: String,
    external_verification_passed: bool,
}

impl BatchDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_species(mut self, species: &str) -> Self {
        self.species = species.to_string();
        self
    }
    pub fn set_quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }
    pub fn set_zone(mut self, zone: &str) -> Self {
        self.zone = zone.to_string();
        self
    }
    pub fn set_harvest_timestamp(mut self, at: TimeStamp<Utc>) -> Self {
        self.harvest_timestamp = Some(at);
        self
    }
    pub fn set_season_year(mut self, year: i32) -> Self {
        self.season_year = Some(year);
        self
    }
    pub fn set_photo_ref(mut self, photo_ref: &str) -> Self {
        self.photo_ref = photo_ref.to_string();
        self
    }
    /// Outcome of the external species check, reported by the caller.
    pub fn set_external_verification(mut self, passed: bool) -> Self {
        self.external_verification_passed = passed;
        self
    }

    /// Shape checks that need no ledger state. The returned batch is `Harvested`
    /// and carries id 0 until the ledger assigns one.
    pub fn validate_and_finalise(self, grower: Principal) -> Result<Batch, LedgerError> {
        if self.species.trim().is_empty() {
            return Err(LedgerError::InvalidInput("species must not be empty".into()));
        }
        if self.quantity == 0 {
            return Err(LedgerError::InvalidInput("quantity must be positive".into()));
        }
        let Some(harvest_timestamp) = self.harvest_timestamp else {
            return Err(LedgerError::InvalidInput("harvest timestamp must be set".into()));
        };
        if !harvest_timestamp.is_encodable() {
            return Err(LedgerError::InvalidInput(
                "harvest timestamp must fall between 1677 and 2262".into(),
            ));
        }
        let Some(season_year) = self.season_year else {
            return Err(LedgerError::InvalidInput("season year must be set".into()));
        };
        if !self.external_verification_passed {
            return Err(LedgerError::VerificationFailed);
        }

        Ok(Batch {
            id: 0,
            species: self.species,
            grower,
            zone: self.zone,
            harvest_timestamp,
            season_year,
            quantity: self.quantity,
            photo_ref: self.photo_ref,
            status: BatchStatus::Harvested,
            recalled: false,
            recall_reason: None,
            lab_report_ids: vec![],
            processing_steps: vec![],
        })
    }
}
