//! Service layer API for the batch ledger
//!
//! Every mutating call runs under one write lock and commits its writes and
//! event records as a single sled batch, so callers observe a total order of
//! operations and never a partially applied one. Reads skip the lock.
use crate::access;
use crate::batch::{Batch, BatchDraft, BatchStatus, BatchSummary, ProcessingStep};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::event_log::{self, EventKind, EventLog};
use crate::lab_report::{self, LabReport, LabReportDraft};
use crate::projection::LedgerProjection;
use crate::quota;
use crate::registry::{self, Season};
use crate::store::{KvRead, Store, Tx, keys, next_id};
use crate::types::{BatchId, ReportId, Role, TimeStamp};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct LedgerService {
    store: Store,
    write_lock: Mutex<()>,
    config: LedgerConfig,
}

impl LedgerService {
    /// Wraps an open sled instance, bootstrapping the configured administrator
    /// if the ledger has none.
    pub fn new(instance: Arc<sled::Db>, config: LedgerConfig) -> Result<Self, LedgerError> {
        let service = Self {
            store: Store::new(instance),
            write_lock: Mutex::new(()),
            config,
        };
        service.bootstrap()?;
        Ok(service)
    }

    /// Opens the sled database named by `config.storage`.
    pub fn open(config: LedgerConfig) -> anyhow::Result<Self> {
        let db = config.open_db()?;
        Ok(Self::new(Arc::new(db), config)?)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn bootstrap(&self) -> Result<(), LedgerError> {
        let Some(admin) = self.config.bootstrap.administrator.clone() else {
            return Ok(());
        };
        self.commit("bootstrap", &admin, |tx, now| {
            if access::administrator_count(tx)? > 0 {
                debug!(admin = %admin, "ledger already has an administrator, skipping bootstrap");
                return Ok(());
            }
            for role in Role::ALL {
                access::grant(tx, &admin, role)?;
                event_log::append(
                    tx,
                    &admin,
                    now.clone(),
                    EventKind::RoleGranted {
                        principal: admin.clone(),
                        role,
                    },
                )?;
            }
            info!(admin = %admin, "bootstrapped administrator with every role");
            Ok(())
        })
    }

    /// Runs `op` against a fresh transaction under the write lock and commits
    /// it only if `op` succeeds. Rejections leave storage untouched.
    fn commit<T, F>(&self, operation: &'static str, actor: &str, op: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Tx<'_>, TimeStamp<Utc>) -> Result<T, LedgerError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?;
        let mut tx = self.store.begin();

        match op(&mut tx, TimeStamp::new()) {
            Ok(value) => {
                let written = tx.commit()?;
                if self.config.storage.flush_on_commit {
                    self.store.db().flush()?;
                }
                debug!(operation, actor, written, "committed");
                Ok(value)
            }
            Err(err) => {
                warn!(operation, actor, error = %err, "rejected");
                Err(err)
            }
        }
    }

    fn load_batch(kv: &impl KvRead, batch_id: BatchId) -> Result<Batch, LedgerError> {
        kv.get(&keys::batch(batch_id))?
            .ok_or_else(|| LedgerError::NotFound(format!("batch {batch_id}")))
    }

    fn require_non_empty(value: &str, field: &str) -> Result<(), LedgerError> {
        if value.trim().is_empty() {
            return Err(LedgerError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    // ACCESS

    /// Every accepted grant is logged, including one for a role already held.
    pub fn grant_role(&self, caller: &str, principal: &str, role: Role) -> Result<(), LedgerError> {
        let changed = self.commit("grant_role", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Administrator], "grant roles")?;
            Self::require_non_empty(principal, "principal")?;
            let changed = access::grant(tx, principal, role)?;
            event_log::append(
                tx,
                caller,
                now,
                EventKind::RoleGranted {
                    principal: principal.to_string(),
                    role,
                },
            )?;
            Ok(changed)
        })?;
        info!(caller, principal, %role, changed, "role granted");
        Ok(())
    }

    /// Fails with `LastAdministrator` rather than leave the ledger without one.
    /// Like grants, a revoke of a role not held is still logged.
    pub fn revoke_role(
        &self,
        caller: &str,
        principal: &str,
        role: Role,
    ) -> Result<(), LedgerError> {
        let changed = self.commit("revoke_role", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Administrator], "revoke roles")?;
            Self::require_non_empty(principal, "principal")?;
            let changed = access::revoke(tx, principal, role)?;
            event_log::append(
                tx,
                caller,
                now,
                EventKind::RoleRevoked {
                    principal: principal.to_string(),
                    role,
                },
            )?;
            Ok(changed)
        })?;
        info!(caller, principal, %role, changed, "role revoked");
        Ok(())
    }

    pub fn has_role(&self, principal: &str, role: Role) -> Result<bool, LedgerError> {
        access::has_role(&self.store, principal, role)
    }

    pub fn roles_of(&self, principal: &str) -> Result<Vec<Role>, LedgerError> {
        access::roles_of(&self.store, principal)
    }

    // REGULATOR CONFIGURATION

    pub fn set_zone_approval(
        &self,
        caller: &str,
        zone: &str,
        approved: bool,
    ) -> Result<(), LedgerError> {
        self.commit("set_zone_approval", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Regulator], "set zone approval")?;
            Self::require_non_empty(zone, "zone")?;
            registry::set_zone_approval(tx, zone, approved)?;
            event_log::append(
                tx,
                caller,
                now,
                EventKind::ZoneApprovalSet {
                    zone: zone.to_string(),
                    approved,
                },
            )
        })?;
        info!(caller, zone, approved, "zone approval set");
        Ok(())
    }

    pub fn is_zone_approved(&self, zone: &str) -> Result<bool, LedgerError> {
        registry::is_zone_approved(&self.store, zone)
    }

    /// Replaces any earlier configuration for `year`. Existing batches are unaffected.
    pub fn configure_season(
        &self,
        caller: &str,
        year: i32,
        start: TimeStamp<Utc>,
        end: TimeStamp<Utc>,
        max_harvest_per_grower: u64,
    ) -> Result<(), LedgerError> {
        self.commit("configure_season", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Regulator], "configure seasons")?;
            let season = Season::new(year, start, end, max_harvest_per_grower)?;
            registry::configure_season(tx, &season)?;
            event_log::append(tx, caller, now, EventKind::SeasonConfigured { season })
        })?;
        info!(caller, year, max_harvest_per_grower, "season configured");
        Ok(())
    }

    pub fn season(&self, year: i32) -> Result<Option<Season>, LedgerError> {
        registry::season(&self.store, year)
    }

    /// Applies to reports attached from now on; stored reports keep their verdict.
    pub fn set_pesticide_ceiling(&self, caller: &str, ceiling_ppm: f64) -> Result<(), LedgerError> {
        self.commit("set_pesticide_ceiling", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Regulator], "set the pesticide ceiling")?;
            registry::set_pesticide_ceiling(tx, ceiling_ppm)?;
            event_log::append(tx, caller, now, EventKind::PesticideCeilingSet { ceiling_ppm })
        })?;
        info!(caller, ceiling_ppm, "pesticide ceiling set");
        Ok(())
    }

    pub fn pesticide_ceiling(&self) -> Result<f64, LedgerError> {
        registry::pesticide_ceiling(
            &self.store,
            self.config.rules.default_pesticide_ceiling_ppm,
        )
    }

    // BATCH LIFECYCLE

    /// Creates a batch in `Harvested` and adds its quantity to the grower's season
    /// total in the same commit.
    pub fn create_batch(&self, caller: &str, draft: BatchDraft) -> Result<BatchId, LedgerError> {
        let batch_id = self.commit("create_batch", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Grower], "create batches")?;
            let mut batch = draft.validate_and_finalise(caller.to_string())?;

            if !registry::is_zone_approved(&*tx, &batch.zone)? {
                return Err(LedgerError::ZoneNotApproved(batch.zone));
            }
            let year = batch.season_year;
            let season = registry::season(&*tx, year)?
                .ok_or(LedgerError::SeasonNotConfigured(year))?;
            if !season.contains(&batch.harvest_timestamp) {
                return Err(LedgerError::OutsideHarvestWindow(year));
            }
            quota::reserve(tx, &season, caller, batch.quantity)?;

            let batch_id = next_id(tx, keys::NEXT_BATCH_ID)?;
            batch.id = batch_id;
            tx.put(keys::batch(batch_id), &batch)?;

            event_log::append(
                tx,
                caller,
                now,
                EventKind::BatchCreated {
                    batch_id,
                    species: batch.species,
                    grower: batch.grower,
                    zone: batch.zone,
                    harvest_timestamp: batch.harvest_timestamp,
                    season_year: batch.season_year,
                    quantity: batch.quantity,
                    photo_ref: batch.photo_ref,
                },
            )?;
            Ok(batch_id)
        })?;
        info!(caller, batch_id, "batch created");
        Ok(batch_id)
    }

    /// Attaches a report. A pesticide report above the current ceiling is stored
    /// with `passed = false` and logs a `ThresholdViolation` naming the grower.
    pub fn add_lab_report(
        &self,
        caller: &str,
        batch_id: BatchId,
        draft: LabReportDraft,
    ) -> Result<ReportId, LedgerError> {
        let default_ceiling = self.config.rules.default_pesticide_ceiling_ppm;
        let report_id = self.commit("add_lab_report", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Laboratory], "add lab reports")?;
            draft.validate()?;
            let mut batch = Self::load_batch(&*tx, batch_id)?;

            let report_id = lab_report::allocate_id(tx)?;
            let status = batch.attach_lab_report(report_id)?;

            let mut report = draft.into_report(report_id, batch_id, caller.to_string(), now.clone());
            let ceiling_ppm = registry::pesticide_ceiling(&*tx, default_ceiling)?;
            let violation = report.exceeds_pesticide_ceiling(ceiling_ppm);
            if violation {
                report.passed = false;
            }

            lab_report::append(tx, &report)?;
            tx.put(keys::batch(batch_id), &batch)?;

            let measured_ppm = report.measurements.pesticide_ppm;
            event_log::append(
                tx,
                caller,
                now.clone(),
                EventKind::LabReportAttached { report, status },
            )?;
            if violation {
                warn!(batch_id, report_id, measured_ppm, ceiling_ppm, grower = %batch.grower, "pesticide threshold violated");
                event_log::append(
                    tx,
                    caller,
                    now,
                    EventKind::ThresholdViolation {
                        batch_id,
                        report_id,
                        grower: batch.grower,
                        measured_ppm,
                        ceiling_ppm,
                    },
                )?;
            }
            Ok(report_id)
        })?;
        info!(caller, batch_id, report_id, "lab report attached");
        Ok(report_id)
    }

    /// Appends a processing step and returns the resulting status.
    pub fn add_processing_step(
        &self,
        caller: &str,
        batch_id: BatchId,
        step_type: &str,
        metadata_ref: &str,
    ) -> Result<BatchStatus, LedgerError> {
        let status = self.commit("add_processing_step", caller, |tx, now| {
            access::require_any(&*tx, caller, &[Role::Processor], "add processing steps")?;
            Self::require_non_empty(step_type, "step type")?;
            let mut batch = Self::load_batch(&*tx, batch_id)?;

            let step = ProcessingStep {
                processor: caller.to_string(),
                step_type: step_type.to_string(),
                metadata_ref: metadata_ref.to_string(),
                timestamp: now.clone(),
            };
            let status = batch.append_processing_step(step.clone())?;
            let index = (batch.processing_steps.len() - 1) as u64;
            tx.put(keys::batch(batch_id), &batch)?;

            event_log::append(
                tx,
                caller,
                now,
                EventKind::ProcessingStepAdded {
                    batch_id,
                    index,
                    step,
                    status,
                },
            )?;
            Ok(status)
        })?;
        info!(caller, batch_id, step_type, ?status, "processing step added");
        Ok(status)
    }

    /// Moves a batch to `Recalled`. A second recall fails with `AlreadyRecalled`.
    pub fn recall_batch(
        &self,
        caller: &str,
        batch_id: BatchId,
        reason: &str,
    ) -> Result<(), LedgerError> {
        self.commit("recall_batch", caller, |tx, now| {
            access::require_any(
                &*tx,
                caller,
                &[Role::Regulator, Role::Administrator],
                "recall batches",
            )?;
            Self::require_non_empty(reason, "recall reason")?;
            let mut batch = Self::load_batch(&*tx, batch_id)?;

            let previous_status = batch.recall(reason)?;
            tx.put(keys::batch(batch_id), &batch)?;

            event_log::append(
                tx,
                caller,
                now,
                EventKind::BatchRecalled {
                    batch_id,
                    reason: reason.to_string(),
                    previous_status,
                },
            )
        })?;
        info!(caller, batch_id, reason, "batch recalled");
        Ok(())
    }

    // PUBLIC READS

    pub fn get_batch(&self, batch_id: BatchId) -> Result<Batch, LedgerError> {
        Self::load_batch(&self.store, batch_id)
    }

    pub fn get_batch_summary(&self, batch_id: BatchId) -> Result<BatchSummary, LedgerError> {
        Ok(self.get_batch(batch_id)?.summary())
    }

    pub fn list_lab_report_ids(&self, batch_id: BatchId) -> Result<Vec<ReportId>, LedgerError> {
        Ok(self.get_batch(batch_id)?.lab_report_ids)
    }

    pub fn get_lab_report(&self, report_id: ReportId) -> Result<LabReport, LedgerError> {
        lab_report::get(&self.store, report_id)
    }

    pub fn get_processing_step(
        &self,
        batch_id: BatchId,
        index: usize,
    ) -> Result<ProcessingStep, LedgerError> {
        let batch = self.get_batch(batch_id)?;
        let len = batch.processing_steps.len();
        batch
            .processing_steps
            .into_iter()
            .nth(index)
            .ok_or(LedgerError::IndexOutOfRange {
                batch_id,
                index,
                len,
            })
    }

    pub fn total_batches(&self) -> Result<u64, LedgerError> {
        let next: u64 = self.store.get(keys::NEXT_BATCH_ID.as_bytes())?.unwrap_or(1);
        Ok(next - 1)
    }

    pub fn total_lab_reports(&self) -> Result<u64, LedgerError> {
        lab_report::count(&self.store)
    }

    pub fn quota_used(&self, year: i32, grower: &str) -> Result<u64, LedgerError> {
        quota::used(&self.store, year, grower)
    }

    pub fn events(&self) -> EventLog<'_> {
        EventLog::new(&self.store)
    }

    /// Rebuilds ledger state from the event log alone.
    pub fn replay(&self) -> Result<LedgerProjection, LedgerError> {
        LedgerProjection::replay(&self.events().all()?)
    }
}
