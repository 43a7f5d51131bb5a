//! Role grants per principal
use crate::error::LedgerError;
use crate::store::{KvRead, Tx, keys};
use crate::types::Role;

pub fn roles_of(kv: &impl KvRead, principal: &str) -> Result<Vec<Role>, LedgerError> {
    Ok(kv.get::<Vec<Role>>(&keys::role(principal))?.unwrap_or_default())
}

pub fn has_role(kv: &impl KvRead, principal: &str, role: Role) -> Result<bool, LedgerError> {
    Ok(roles_of(kv, principal)?.contains(&role))
}

/// Fails with `Unauthorized` unless `principal` holds at least one of `roles`.
pub fn require_any(
    kv: &impl KvRead,
    principal: &str,
    roles: &[Role],
    operation: &'static str,
) -> Result<(), LedgerError> {
    let held = roles_of(kv, principal)?;
    if roles.iter().any(|role| held.contains(role)) {
        return Ok(());
    }
    Err(LedgerError::Unauthorized {
        principal: principal.to_string(),
        operation,
    })
}

/// Number of principals currently holding `Administrator`.
pub fn administrator_count(tx: &Tx<'_>) -> Result<usize, LedgerError> {
    let grants = tx.scan_prefix::<Vec<Role>>(keys::ROLE_PREFIX)?;
    Ok(grants
        .iter()
        .filter(|(_, roles)| roles.contains(&Role::Administrator))
        .count())
}

/// Stages the grant. Returns false when the principal already held the role.
pub(crate) fn grant(tx: &mut Tx<'_>, principal: &str, role: Role) -> Result<bool, LedgerError> {
    let mut roles = roles_of(&*tx, principal)?;
    if roles.contains(&role) {
        return Ok(false);
    }
    roles.push(role);
    roles.sort();
    tx.put(keys::role(principal), &roles)?;
    Ok(true)
}

/// Stages the revocation. Returns false when the principal didn't hold the role.
pub(crate) fn revoke(tx: &mut Tx<'_>, principal: &str, role: Role) -> Result<bool, LedgerError> {
    let mut roles = roles_of(&*tx, principal)?;
    if !roles.contains(&role) {
        return Ok(false);
    }
    if role == Role::Administrator && administrator_count(tx)? <= 1 {
        return Err(LedgerError::LastAdministrator);
    }
    roles.retain(|held| *held != role);
    tx.put(keys::role(principal), &roles)?;
    Ok(true)
}
