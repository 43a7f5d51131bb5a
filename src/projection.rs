//! Rebuilds ledger state by folding the event log in sequence order
use crate::batch::{Batch, BatchStatus};
use crate::error::LedgerError;
use crate::event_log::{EventKind, EventRecord};
use crate::lab_report::LabReport;
use crate::registry::Season;
use crate::types::{BatchId, Principal, ReportId, Role, SeqNo};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LedgerProjection {
    pub roles: BTreeMap<Principal, BTreeSet<Role>>,
    pub zones: BTreeMap<String, bool>,
    pub seasons: BTreeMap<i32, Season>,
    pub pesticide_ceiling_ppm: Option<f64>,
    pub quotas: BTreeMap<(i32, Principal), u64>,
    pub batches: BTreeMap<BatchId, Batch>,
    pub reports: BTreeMap<ReportId, LabReport>,
    pub last_seq: SeqNo,
}

impl LedgerProjection {
    pub fn replay<'a, I>(records: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = &'a EventRecord>,
    {
        let mut projection = Self::default();
        for record in records {
            projection.apply(record)?;
        }
        Ok(projection)
    }

    pub fn apply(&mut self, record: &EventRecord) -> Result<(), LedgerError> {
        if record.seq <= self.last_seq {
            return Err(LedgerError::Replay(format!(
                "sequence {} does not follow {}",
                record.seq, self.last_seq
            )));
        }

        match &record.kind {
            EventKind::RoleGranted { principal, role } => {
                self.roles.entry(principal.clone()).or_default().insert(*role);
            }
            EventKind::RoleRevoked { principal, role } => {
                if let Some(held) = self.roles.get_mut(principal) {
                    held.remove(role);
                }
            }
            EventKind::ZoneApprovalSet { zone, approved } => {
                self.zones.insert(zone.clone(), *approved);
            }
            EventKind::SeasonConfigured { season } => {
                self.seasons.insert(season.year, season.clone());
            }
            EventKind::PesticideCeilingSet { ceiling_ppm } => {
                self.pesticide_ceiling_ppm = Some(*ceiling_ppm);
            }
            EventKind::BatchCreated {
                batch_id,
                species,
                grower,
                zone,
                harvest_timestamp,
                season_year,
                quantity,
                photo_ref,
            } => {
                *self
                    .quotas
                    .entry((*season_year, grower.clone()))
                    .or_default() += quantity;
                self.batches.insert(
                    *batch_id,
                    Batch {
                        id: *batch_id,
                        species: species.clone(),
                        grower: grower.clone(),
                        zone: zone.clone(),
                        harvest_timestamp: harvest_timestamp.clone(),
                        season_year: *season_year,
                        quantity: *quantity,
                        photo_ref: photo_ref.clone(),
                        status: BatchStatus::Harvested,
                        recalled: false,
                        recall_reason: None,
                        lab_report_ids: vec![],
                        processing_steps: vec![],
                    },
                );
            }
            EventKind::LabReportAttached { report, status } => {
                let batch = self.batch_mut(report.batch_id, record.seq)?;
                batch.lab_report_ids.push(report.id);
                batch.status = *status;
                self.reports.insert(report.id, report.clone());
            }
            EventKind::ThresholdViolation { .. } => {}
            EventKind::ProcessingStepAdded {
                batch_id,
                step,
                status,
                ..
            } => {
                let batch = self.batch_mut(*batch_id, record.seq)?;
                batch.processing_steps.push(step.clone());
                batch.status = *status;
            }
            EventKind::BatchRecalled {
                batch_id, reason, ..
            } => {
                let batch = self.batch_mut(*batch_id, record.seq)?;
                batch.status = BatchStatus::Recalled;
                batch.recalled = true;
                batch.recall_reason = Some(reason.clone());
            }
        }

        self.last_seq = record.seq;
        Ok(())
    }

    fn batch_mut(&mut self, batch_id: BatchId, seq: SeqNo) -> Result<&mut Batch, LedgerError> {
        self.batches.get_mut(&batch_id).ok_or_else(|| {
            LedgerError::Replay(format!("event {seq} references unknown batch {batch_id}"))
        })
    }
}
