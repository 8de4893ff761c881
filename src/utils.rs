//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const PARCEL_HRP: &str = "parcel";

// time-ordered uuid, bech32 encoded under the given human readable prefix
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Fresh parcel code for records created without one.
pub fn new_parcel_code() -> anyhow::Result<String> {
    new_uuid_to_bech32(PARCEL_HRP)
}
