//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

// mint a principal id: a fresh uuid7 encoded as bech32m under `hrp` (e.g. "grower")
pub fn new_principal_id(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}
