//! Regulator-owned configuration: approved zones, seasons and the pesticide ceiling
use crate::error::LedgerError;
use crate::store::{KvRead, Tx, keys};
use crate::types::TimeStamp;
use chrono::Utc;

/// Harvest window and per-grower ceiling for one year.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Season {
    #[n(0)]
    pub year: i32,
    #[n(1)]
    pub start: TimeStamp<Utc>,
    #[n(2)]
    pub end: TimeStamp<Utc>,
    #[n(3)]
    pub max_harvest_per_grower: u64,
}

impl Season {
    pub fn new(
        year: i32,
        start: TimeStamp<Utc>,
        end: TimeStamp<Utc>,
        max_harvest_per_grower: u64,
    ) -> Result<Self, LedgerError> {
        if !start.is_encodable() || !end.is_encodable() {
            return Err(LedgerError::InvalidInput(
                "season bounds must fall between 1677 and 2262".into(),
            ));
        }
        if start.to_datetime_utc() >= end.to_datetime_utc() {
            return Err(LedgerError::InvalidWindow);
        }
        if max_harvest_per_grower == 0 {
            return Err(LedgerError::InvalidQuota);
        }
        Ok(Self {
            year,
            start,
            end,
            max_harvest_per_grower,
        })
    }

    /// Window bounds are inclusive on both ends.
    pub fn contains(&self, at: &TimeStamp<Utc>) -> bool {
        let at = at.to_datetime_utc();
        self.start.to_datetime_utc() <= at && at <= self.end.to_datetime_utc()
    }
}

// zones match exactly; "u4pr" does not approve "u4prx"
pub fn is_zone_approved(kv: &impl KvRead, zone: &str) -> Result<bool, LedgerError> {
    Ok(kv.get::<bool>(&keys::zone(zone))?.unwrap_or(false))
}

pub(crate) fn set_zone_approval(
    tx: &mut Tx<'_>,
    zone: &str,
    approved: bool,
) -> Result<(), LedgerError> {
    tx.put(keys::zone(zone), &approved)
}

pub fn season(kv: &impl KvRead, year: i32) -> Result<Option<Season>, LedgerError> {
    kv.get(&keys::season(year))
}

/// Last write wins; batches keep their `season_year`, not a copy of the window.
pub(crate) fn configure_season(tx: &mut Tx<'_>, season: &Season) -> Result<(), LedgerError> {
    tx.put(keys::season(season.year), season)
}

/// The stored ceiling, or `default_ppm` if no regulator has set one yet.
pub fn pesticide_ceiling(kv: &impl KvRead, default_ppm: f64) -> Result<f64, LedgerError> {
    Ok(kv
        .get::<f64>(keys::PESTICIDE_CEILING.as_bytes())?
        .unwrap_or(default_ppm))
}

pub(crate) fn set_pesticide_ceiling(tx: &mut Tx<'_>, ppm: f64) -> Result<(), LedgerError> {
    if !ppm.is_finite() || ppm < 0.0 {
        return Err(LedgerError::InvalidInput(format!(
            "pesticide ceiling must be a finite, non-negative ppm value, got {ppm}"
        )));
    }
    tx.put(keys::PESTICIDE_CEILING.as_bytes().to_vec(), &ppm)
}
