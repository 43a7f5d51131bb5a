//! Laboratory reports. Append-only; each report belongs to exactly one batch.
use crate::error::LedgerError;
use crate::store::{KvRead, Tx, keys, next_id};
use crate::types::{BatchId, Principal, ReportId, TimeStamp};
use chrono::Utc;

/// Report type whose `pesticide_ppm` is checked against the regulator's ceiling.
pub const PESTICIDE_REPORT_TYPE: &str = "pesticide";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurements {
    #[n(0)]
    pub pesticide_ppm: f64,
    #[n(1)]
    pub moisture: f64, // percent
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct LabReport {
    #[n(0)]
    pub id: ReportId,
    #[n(1)]
    pub batch_id: BatchId,
    #[n(2)]
    pub lab: Principal,
    #[n(3)]
    pub report_type: String,
    #[n(4)]
    pub measurements: Measurements,
    #[n(5)]
    pub dna_barcode: String,
    #[n(6)]
    pub passed: bool,
    #[n(7)]
    pub external_document_ref: String,
    #[n(8)]
    pub timestamp: TimeStamp<Utc>,
}

impl LabReport {
    /// True when this is a pesticide report measuring above `ceiling_ppm`.
    pub fn exceeds_pesticide_ceiling(&self, ceiling_ppm: f64) -> bool {
        self.report_type == PESTICIDE_REPORT_TYPE && self.measurements.pesticide_ppm > ceiling_ppm
    }
}

// used for constructing addLabReport requests
#[derive(Debug, Clone, Default)]
pub struct LabReportDraft {
    report_type: String,
    measurements: Measurements,
    dna_barcode: String,
    document_ref: String,
    passed: bool,
}

impl LabReportDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_report_type(mut self, report_type: &str) -> Self {
        self.report_type = report_type.to_string();
        self
    }
    pub fn set_pesticide_ppm(mut self, ppm: f64) -> Self {
        self.measurements.pesticide_ppm = ppm;
        self
    }
    pub fn set_moisture(mut self, moisture: f64) -> Self {
        self.measurements.moisture = moisture;
        self
    }
    pub fn set_dna_barcode(mut self, barcode: &str) -> Self {
        self.dna_barcode = barcode.to_string();
        self
    }
    pub fn set_document_ref(mut self, document_ref: &str) -> Self {
        self.document_ref = document_ref.to_string();
        self
    }
    pub fn set_passed(mut self, passed: bool) -> Self {
        self.passed = passed;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.report_type.trim().is_empty() {
            return Err(LedgerError::InvalidInput("report type must not be empty".into()));
        }
        let Measurements {
            pesticide_ppm,
            moisture,
        } = self.measurements;
        if !pesticide_ppm.is_finite() || !moisture.is_finite() {
            return Err(LedgerError::InvalidInput(
                "measurements must be finite numbers".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn into_report(
        self,
        id: ReportId,
        batch_id: BatchId,
        lab: Principal,
        timestamp: TimeStamp<Utc>,
    ) -> LabReport {
        LabReport {
            id,
            batch_id,
            lab,
            report_type: self.report_type,
            measurements: self.measurements,
            dna_barcode: self.dna_barcode,
            passed: self.passed,
            external_document_ref: self.document_ref,
            timestamp,
        }
    }
}

/// Hands out the next report id without storing anything yet.
pub(crate) fn allocate_id(tx: &mut Tx<'_>) -> Result<ReportId, LedgerError> {
    next_id(tx, keys::NEXT_REPORT_ID)
}

/// Stages the immutable report record. No update or delete path exists.
pub(crate) fn append(tx: &mut Tx<'_>, report: &LabReport) -> Result<ReportId, LedgerError> {
    tx.put(keys::report(report.id), report)?;
    Ok(report.id)
}

pub fn get(kv: &impl KvRead, id: ReportId) -> Result<LabReport, LedgerError> {
    kv.get(&keys::report(id))?
        .ok_or_else(|| LedgerError::NotFound(format!("lab report {id}")))
}

pub fn count(kv: &impl KvRead) -> Result<u64, LedgerError> {
    let next: u64 = kv.get(keys::NEXT_REPORT_ID.as_bytes())?.unwrap_or(1);
    Ok(next - 1)
}
