//! Identifier generation

use bech32::Bech32m;
use uuid7::uuid7;

pub const CONTRACT_HRP: &str = "contract_";
pub const CLAIM_HRP: &str = "claim_";
pub const DOCUMENT_HRP: &str = "doc_";
pub const DISAGREEMENT_HRP: &str = "dis_";
pub const USER_HRP: &str = "user_";

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}
