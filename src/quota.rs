//! Cumulative harvest per (season year, grower)
use crate::error::LedgerError;
use crate::registry::Season;
use crate::store::{KvRead, Tx, keys};

pub fn used(kv: &impl KvRead, year: i32, grower: &str) -> Result<u64, LedgerError> {
    Ok(kv.get::<u64>(&keys::quota(year, grower))?.unwrap_or(0))
}

/// Checks `quantity` against the season ceiling and stages the new total.
/// Only batch creation calls this, inside the same transaction as the batch write.
pub(crate) fn reserve(
    tx: &mut Tx<'_>,
    season: &Season,
    grower: &str,
    quantity: u64,
) -> Result<u64, LedgerError> {
    let current = used(&*tx, season.year, grower)?;
    let exceeded = || LedgerError::QuotaExceeded {
        grower: grower.to_string(),
        year: season.year,
        used: current,
        requested: quantity,
        max: season.max_harvest_per_grower,
    };

    let total = current.checked_add(quantity).ok_or_else(exceeded)?;
    if total > season.max_harvest_per_grower {
        return Err(exceeded());
    }
    tx.put(keys::quota(season.year, grower), &total)?;
    Ok(total)
}
