//! Smoke tests for authorization, registry configuration and batch-creation rules
//!
//! Each test drives the public service API against its own database and checks
//! one rule in isolation: who may call what, and which rejection a bad request
//! produces. Rejections must never leave a trace in storage or the event log.

mod common;

use common::*;
use chrono::{TimeZone, Utc};
use provenance_ledger::{
    BatchDraft, BatchStatus, LabReportDraft, LedgerConfig, LedgerError, LedgerService, Role,
    TimeStamp, utils,
};
use std::sync::Arc;

// ACCESS REGISTRY
#[cfg(test)]
mod access_tests {
    use super::*;

    /// Bootstrap hands the configured administrator every role
    #[test]
    fn bootstrap_admin_holds_every_role() -> anyhow::Result<()> {
        let f = fixture("bootstrap_roles.db")?;
        assert_eq!(f.ledger.roles_of(&f.admin)?, Role::ALL.to_vec());
        Ok(())
    }

    /// Only administrators may grant
    #[test]
    fn non_admin_cannot_grant() -> anyhow::Result<()> {
        let f = fixture("non_admin_grant.db")?;
        let err = f
            .ledger
            .grant_role(&f.regulator, &f.grower, Role::Regulator)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert!(!f.ledger.has_role(&f.grower, Role::Regulator)?);
        Ok(())
    }

    /// Revocation takes effect on the next operation
    #[test]
    fn revoked_grower_cannot_create() -> anyhow::Result<()> {
        let f = fixture("revoked_grower.db")?;
        f.ledger.revoke_role(&f.admin, &f.grower, Role::Grower)?;
        assert!(!f.ledger.has_role(&f.grower, Role::Grower)?);

        let err = f.ledger.create_batch(&f.grower, draft(10)).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        Ok(())
    }

    /// The last administrator cannot be removed, a second one can
    #[test]
    fn last_administrator_is_protected() -> anyhow::Result<()> {
        let f = fixture("last_admin.db")?;
        let err = f
            .ledger
            .revoke_role(&f.admin, &f.admin, Role::Administrator)
            .unwrap_err();
        assert!(matches!(err, LedgerError::LastAdministrator));

        let deputy = utils::new_principal_id("admin")?;
        f.ledger.grant_role(&f.admin, &deputy, Role::Administrator)?;
        f.ledger.revoke_role(&deputy, &f.admin, Role::Administrator)?;
        assert!(!f.ledger.has_role(&f.admin, Role::Administrator)?);

        let err = f
            .ledger
            .revoke_role(&deputy, &deputy, Role::Administrator)
            .unwrap_err();
        assert!(matches!(err, LedgerError::LastAdministrator));
        Ok(())
    }

    /// A repeated grant or a revoke of an unheld role is recorded but changes nothing
    #[test]
    fn redundant_grants_are_logged() -> anyhow::Result<()> {
        let f = fixture("redundant_grants.db")?;
        let before = f.ledger.events().len()?;

        f.ledger.grant_role(&f.admin, &f.grower, Role::Grower)?;
        f.ledger.revoke_role(&f.admin, &f.grower, Role::Laboratory)?;

        assert_eq!(f.ledger.roles_of(&f.grower)?, vec![Role::Grower]);
        assert_eq!(f.ledger.events().len()?, before + 2);
        Ok(())
    }

    /// Grant and revoke both need a principal to act on
    #[test]
    fn empty_principal_is_rejected() -> anyhow::Result<()> {
        let f = fixture("empty_principal.db")?;
        let before = f.ledger.events().len()?;

        assert!(matches!(
            f.ledger.grant_role(&f.admin, " ", Role::Grower),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            f.ledger.revoke_role(&f.admin, "", Role::Grower),
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(f.ledger.events().len()?, before);
        Ok(())
    }

    /// Reopening an existing ledger keeps its grants and doesn't bootstrap again
    #[test]
    fn reopen_preserves_state() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("reopen.db");
        let admin = utils::new_principal_id("admin")?;
        let grower = utils::new_principal_id("grower")?;

        {
            let mut config = LedgerConfig::default().with_administrator(&admin);
            config.storage.flush_on_commit = true;
            let db = sled::open(&path)?;
            let ledger = LedgerService::new(Arc::new(db), config)?;
            ledger.grant_role(&admin, &grower, Role::Grower)?;
        }

        let other_admin = utils::new_principal_id("admin")?;
        let db = sled::open(&path)?;
        let ledger = LedgerService::new(
            Arc::new(db),
            LedgerConfig::default().with_administrator(&other_admin),
        )?;
        assert!(ledger.has_role(&grower, Role::Grower)?);
        assert!(ledger.roles_of(&other_admin)?.is_empty());
        assert_eq!(ledger.events().len()?, Role::ALL.len() as u64 + 1);
        Ok(())
    }
}

// ZONE AND SEASON REGISTRY
#[cfg(test)]
mod registry_tests {
    use super::*;

    #[test]
    fn only_regulators_configure() -> anyhow::Result<()> {
        let f = fixture("only_regulators.db")?;
        let start = TimeStamp::new_with(2026, 1, 1, 0, 0, 0).unwrap();
        let end = TimeStamp::new_with(2026, 12, 31, 0, 0, 0).unwrap();

        assert!(matches!(
            f.ledger.configure_season(&f.grower, 2026, start, end, 10),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(matches!(
            f.ledger.set_zone_approval(&f.lab, "tdr1", true),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(matches!(
            f.ledger.set_pesticide_ceiling(&f.processor, 2.0),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(f.ledger.season(2026)?.is_none());
        Ok(())
    }

    #[test]
    fn malformed_seasons_are_rejected() -> anyhow::Result<()> {
        let f = fixture("malformed_seasons.db")?;
        let start = TimeStamp::new_with(2026, 6, 1, 0, 0, 0).unwrap();
        let end = TimeStamp::new_with(2026, 1, 1, 0, 0, 0).unwrap();

        assert!(matches!(
            f.ledger
                .configure_season(&f.regulator, 2026, start.clone(), end.clone(), 10),
            Err(LedgerError::InvalidWindow)
        ));
        assert!(matches!(
            f.ledger.configure_season(&f.regulator, 2026, end, start, 0),
            Err(LedgerError::InvalidQuota)
        ));
        assert!(f.ledger.season(2026)?.is_none());
        Ok(())
    }

    /// Zone approval is idempotent and can be withdrawn
    #[test]
    fn zone_approval_toggles() -> anyhow::Result<()> {
        let f = fixture("zone_toggle.db")?;
        f.ledger.set_zone_approval(&f.regulator, ZONE, true)?;
        assert!(f.ledger.is_zone_approved(ZONE)?);

        f.ledger.set_zone_approval(&f.regulator, ZONE, false)?;
        assert!(!f.ledger.is_zone_approved(ZONE)?);
        assert!(matches!(
            f.ledger.create_batch(&f.grower, draft(10)),
            Err(LedgerError::ZoneNotApproved(_))
        ));
        Ok(())
    }

    /// Zones match exactly, a longer or shorter bucket is a different zone
    #[test]
    fn zones_do_not_match_by_prefix() -> anyhow::Result<()> {
        let f = fixture("zone_exact.db")?;
        assert!(!f.ledger.is_zone_approved("u4prx")?);
        assert!(!f.ledger.is_zone_approved("u4p")?);
        assert!(matches!(
            f.ledger.create_batch(&f.grower, draft(10).set_zone("u4prx")),
            Err(LedgerError::ZoneNotApproved(_))
        ));
        Ok(())
    }

    /// Reconfiguring a season does not touch batches already created under it
    #[test]
    fn season_reconfiguration_is_not_retroactive() -> anyhow::Result<()> {
        let f = fixture("season_reconfig.db")?;
        let batch_id = f.ledger.create_batch(&f.grower, draft(800))?;

        f.ledger.configure_season(
            &f.regulator,
            SEASON,
            TimeStamp::new_with(SEASON, 7, 1, 0, 0, 0).unwrap(),
            TimeStamp::new_with(SEASON, 9, 30, 0, 0, 0).unwrap(),
            500,
        )?;

        let batch = f.ledger.get_batch(batch_id)?;
        assert_eq!(batch.quantity, 800);
        assert_eq!(batch.status, BatchStatus::Harvested);
        assert_eq!(f.ledger.season(SEASON)?.unwrap().max_harvest_per_grower, 500);

        // the new window now excludes mid June
        assert!(matches!(
            f.ledger.create_batch(&f.grower, draft(1)),
            Err(LedgerError::OutsideHarvestWindow(SEASON))
        ));
        Ok(())
    }

    /// A later ceiling change leaves stored verdicts alone
    #[test]
    fn ceiling_change_is_not_retroactive() -> anyhow::Result<()> {
        let f = fixture("ceiling_change.db")?;
        let batch_id = f.ledger.create_batch(&f.grower, draft(10))?;
        let pesticide = |ppm| {
            LabReportDraft::new()
                .set_report_type("pesticide")
                .set_pesticide_ppm(ppm)
                .set_passed(true)
        };

        let first = f.ledger.add_lab_report(&f.lab, batch_id, pesticide(0.4))?;
        f.ledger.set_pesticide_ceiling(&f.regulator, 0.1)?;
        assert_eq!(f.ledger.pesticide_ceiling()?, 0.1);
        let second = f.ledger.add_lab_report(&f.lab, batch_id, pesticide(0.4))?;

        assert!(f.ledger.get_lab_report(first)?.passed);
        assert!(!f.ledger.get_lab_report(second)?.passed);
        Ok(())
    }
}

// BATCH CREATION RULES
#[cfg(test)]
mod create_batch_tests {
    use super::*;

    #[test]
    fn rejects_bad_input() -> anyhow::Result<()> {
        let f = fixture("bad_input.db")?;
        assert!(matches!(
            f.ledger.create_batch(&f.grower, draft(10).set_species("")),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            f.ledger.create_batch(&f.grower, draft(0)),
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(f.ledger.total_batches()?, 0);
        Ok(())
    }

    #[test]
    fn rejects_failed_external_verification() -> anyhow::Result<()> {
        let f = fixture("verification.db")?;
        assert!(matches!(
            f.ledger
                .create_batch(&f.grower, draft(10).set_external_verification(false)),
            Err(LedgerError::VerificationFailed)
        ));
        assert_eq!(f.ledger.quota_used(SEASON, &f.grower)?, 0);
        Ok(())
    }

    #[test]
    fn rejects_unconfigured_season() -> anyhow::Result<()> {
        let f = fixture("unconfigured_season.db")?;
        let draft = draft(10)
            .set_season_year(2030)
            .set_harvest_timestamp(TimeStamp::new_with(2030, 5, 1, 0, 0, 0).unwrap());
        assert!(matches!(
            f.ledger.create_batch(&f.grower, draft),
            Err(LedgerError::SeasonNotConfigured(2030))
        ));
        Ok(())
    }

    /// A draft without a harvest time is rejected, not stamped with the current time
    #[test]
    fn harvest_timestamp_is_required() -> anyhow::Result<()> {
        let f = fixture("harvest_timestamp_required.db")?;
        let undated = BatchDraft::new()
            .set_species("turmeric")
            .set_quantity(10)
            .set_zone(ZONE)
            .set_season_year(SEASON)
            .set_external_verification(true);

        let err = f.ledger.create_batch(&f.grower, undated).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(msg) if msg.contains("harvest timestamp")));
        assert_eq!(f.ledger.total_batches()?, 0);
        assert_eq!(f.ledger.quota_used(SEASON, &f.grower)?, 0);
        Ok(())
    }

    /// Season bounds outside the encodable range are rejected up front
    #[test]
    fn unencodable_season_is_rejected() -> anyhow::Result<()> {
        let f = fixture("unencodable_season.db")?;
        assert!(TimeStamp::new_with(2300, 1, 1, 0, 0, 0).is_none());

        let far: TimeStamp<Utc> = Utc.with_ymd_and_hms(2300, 12, 31, 0, 0, 0).unwrap().into();
        let start = TimeStamp::new_with(2262, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            f.ledger.configure_season(&f.regulator, 2300, start, far, 10),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(f.ledger.season(2300)?.is_none());
        Ok(())
    }

    /// Window bounds are inclusive; one second outside is rejected
    #[test]
    fn harvest_window_bounds() -> anyhow::Result<()> {
        let f = fixture("window_bounds.db")?;
        let at = |y, m, d, h, min, s| TimeStamp::new_with(y, m, d, h, min, s).unwrap();

        f.ledger
            .create_batch(&f.grower, draft(1).set_harvest_timestamp(at(SEASON, 1, 1, 0, 0, 0)))?;
        f.ledger.create_batch(
            &f.grower,
            draft(1).set_harvest_timestamp(at(SEASON, 12, 31, 23, 59, 59)),
        )?;
        assert!(matches!(
            f.ledger.create_batch(
                &f.grower,
                draft(1).set_harvest_timestamp(at(SEASON + 1, 1, 1, 0, 0, 0))
            ),
            Err(LedgerError::OutsideHarvestWindow(SEASON))
        ));
        assert!(matches!(
            f.ledger.create_batch(
                &f.grower,
                draft(1).set_harvest_timestamp(at(SEASON - 1, 12, 31, 23, 59, 59))
            ),
            Err(LedgerError::OutsideHarvestWindow(SEASON))
        ));
        assert_eq!(f.ledger.total_batches()?, 2);
        assert_eq!(f.ledger.quota_used(SEASON, &f.grower)?, 2);
        Ok(())
    }

    /// Quotas are tracked per grower
    #[test]
    fn quota_is_per_grower() -> anyhow::Result<()> {
        let f = fixture("quota_per_grower.db")?;
        let second = utils::new_principal_id("grower")?;
        f.ledger.grant_role(&f.admin, &second, Role::Grower)?;

        f.ledger.create_batch(&f.grower, draft(QUOTA))?;
        f.ledger.create_batch(&second, draft(QUOTA))?;
        assert!(matches!(
            f.ledger.create_batch(&f.grower, draft(1)),
            Err(LedgerError::QuotaExceeded { .. })
        ));
        assert_eq!(f.ledger.quota_used(SEASON, &second)?, QUOTA);
        Ok(())
    }
}

// LIFECYCLE GUARDS AND READS
#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn roles_gate_each_step() -> anyhow::Result<()> {
        let f = fixture("roles_gate.db")?;
        let batch_id = f.ledger.create_batch(&f.grower, draft(10))?;
        let report = LabReportDraft::new().set_report_type("dna");

        assert!(matches!(
            f.ledger.add_lab_report(&f.grower, batch_id, report.clone()),
            Err(LedgerError::Unauthorized { .. })
        ));
        f.ledger.add_lab_report(&f.lab, batch_id, report)?;
        assert!(matches!(
            f.ledger.add_processing_step(&f.lab, batch_id, "Drying", ""),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert!(matches!(
            f.ledger.recall_batch(&f.processor, batch_id, "spoiled"),
            Err(LedgerError::Unauthorized { .. })
        ));
        Ok(())
    }

    #[test]
    fn processing_before_testing_is_rejected() -> anyhow::Result<()> {
        let f = fixture("processing_before_testing.db")?;
        let batch_id = f.ledger.create_batch(&f.grower, draft(10))?;
        assert!(matches!(
            f.ledger.add_processing_step(&f.processor, batch_id, "Drying", ""),
            Err(LedgerError::InvalidBatchState {
                status: BatchStatus::Harvested,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn recalled_batch_rejects_mutation() -> anyhow::Result<()> {
        let f = fixture("recalled_rejects.db")?;
        let batch_id = f.ledger.create_batch(&f.grower, draft(10))?;
        f.ledger.recall_batch(&f.regulator, batch_id, "fraud")?;

        assert!(matches!(
            f.ledger
                .add_lab_report(&f.lab, batch_id, LabReportDraft::new().set_report_type("dna")),
            Err(LedgerError::InvalidBatchState { .. })
        ));
        assert!(matches!(
            f.ledger.add_processing_step(&f.processor, batch_id, "Drying", ""),
            Err(LedgerError::InvalidBatchState { .. })
        ));
        // reads keep working
        assert_eq!(
            f.ledger.get_batch_summary(batch_id)?.status,
            BatchStatus::Recalled
        );
        Ok(())
    }

    #[test]
    fn recall_requires_a_reason() -> anyhow::Result<()> {
        let f = fixture("recall_reason.db")?;
        let batch_id = f.ledger.create_batch(&f.grower, draft(10))?;
        assert!(matches!(
            f.ledger.recall_batch(&f.regulator, batch_id, " "),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(!f.ledger.get_batch(batch_id)?.recalled);
        Ok(())
    }

    #[test]
    fn unknown_ids_are_not_found() -> anyhow::Result<()> {
        let f = fixture("unknown_ids.db")?;
        assert!(matches!(
            f.ledger.get_batch_summary(42),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(f.ledger.get_lab_report(7), Err(LedgerError::NotFound(_))));
        assert!(matches!(
            f.ledger.list_lab_report_ids(42),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            f.ledger.recall_batch(&f.regulator, 42, "ghost"),
            Err(LedgerError::NotFound(_))
        ));

        let batch_id = f.ledger.create_batch(&f.grower, draft(10))?;
        assert!(matches!(
            f.ledger.get_processing_step(batch_id, 0),
            Err(LedgerError::IndexOutOfRange { index: 0, len: 0, .. })
        ));
        Ok(())
    }

    /// Rejected operations write nothing, not even an event
    #[test]
    fn rejections_are_not_logged() -> anyhow::Result<()> {
        let f = fixture("rejections_not_logged.db")?;
        let batch_id = f.ledger.create_batch(&f.grower, draft(10))?;
        let before = f.ledger.events().len()?;
        let head = f.ledger.events().head_hash()?;

        let _ = f.ledger.create_batch(&f.grower, draft(QUOTA));
        let _ = f.ledger.add_processing_step(&f.processor, batch_id, "Drying", "");
        let _ = f.ledger.recall_batch(&f.grower, batch_id, "nope");
        let _ = f.ledger.grant_role(&f.grower, &f.grower, Role::Administrator);

        assert_eq!(f.ledger.events().len()?, before);
        assert_eq!(f.ledger.events().head_hash()?, head);
        assert_eq!(f.ledger.total_lab_reports()?, 0);
        Ok(())
    }
}
