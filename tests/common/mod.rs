#![allow(dead_code)]

use provenance_ledger::{BatchDraft, LedgerConfig, LedgerService, Role, TimeStamp, utils};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

pub const SEASON: i32 = 2025;
pub const QUOTA: u64 = 1000;
pub const ZONE: &str = "u4pr";
pub const CEILING_PPM: f64 = 0.5;

/// A ledger with one principal per role, season 2025 and zone "u4pr" approved.
pub struct Fixture {
    pub ledger: LedgerService,
    pub admin: String,
    pub regulator: String,
    pub grower: String,
    pub lab: String,
    pub processor: String,
    // dropped after the ledger
    _dir: Option<TempDir>,
}

pub fn mid_year() -> TimeStamp<chrono::Utc> {
    TimeStamp::new_with(SEASON, 6, 15, 9, 0, 0).unwrap()
}

pub fn draft(quantity: u64) -> BatchDraft {
    BatchDraft::new()
        .set_species("turmeric")
        .set_quantity(quantity)
        .set_zone(ZONE)
        .set_harvest_timestamp(mid_year())
        .set_season_year(SEASON)
        .set_photo_ref("ipfs://photo")
        .set_external_verification(true)
}

/// Sled uses file-based locking, so each test gets its own database under a
/// temp dir for simplified cleanup.
pub fn fixture(name: &str) -> anyhow::Result<Fixture> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join(name))?;
    let admin = utils::new_principal_id("admin")?;
    let ledger = LedgerService::new(
        Arc::new(db),
        LedgerConfig::default().with_administrator(&admin),
    )?;
    configure(ledger, admin, Some(temp_dir))
}

/// Same as [`fixture`] but backed by an in-memory sled instance.
pub fn temporary_fixture() -> anyhow::Result<Fixture> {
    let admin = utils::new_principal_id("admin")?;
    let ledger = LedgerService::open(LedgerConfig::temporary().with_administrator(&admin))?;
    configure(ledger, admin, None)
}

fn configure(ledger: LedgerService, admin: String, dir: Option<TempDir>) -> anyhow::Result<Fixture> {
    let regulator = utils::new_principal_id("regulator")?;
    let grower = utils::new_principal_id("grower")?;
    let lab = utils::new_principal_id("lab")?;
    let processor = utils::new_principal_id("processor")?;

    ledger.grant_role(&admin, &regulator, Role::Regulator)?;
    ledger.grant_role(&admin, &grower, Role::Grower)?;
    ledger.grant_role(&admin, &lab, Role::Laboratory)?;
    ledger.grant_role(&admin, &processor, Role::Processor)?;

    ledger.configure_season(
        &regulator,
        SEASON,
        TimeStamp::new_with(SEASON, 1, 1, 0, 0, 0).unwrap(),
        TimeStamp::new_with(SEASON, 12, 31, 23, 59, 59).unwrap(),
        QUOTA,
    )?;
    ledger.set_zone_approval(&regulator, ZONE, true)?;
    ledger.set_pesticide_ceiling(&regulator, CEILING_PPM)?;

    Ok(Fixture {
        ledger,
        admin,
        regulator,
        grower,
        lab,
        processor,
        _dir: dir,
    })
}
