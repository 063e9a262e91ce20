//! Address codecs per chain family
//!
//! Requests carry every address as a 32-byte "universal" word so the same
//! payload can be verified on any family. Each family knows how to map its
//! native textual form to and from that word.

use super::ChainFamily;
use crate::error::{FundingError, FundingResult};

use alloy_primitives::B256;
use sha3::{Digest, Keccak256};

/// Converts addresses between a family's native form and universal bytes32
pub trait AddressCodec: Send + Sync {
    fn family(&self) -> ChainFamily;

    fn to_universal(&self, address: &str) -> FundingResult<B256>;

    fn from_universal(&self, word: &B256) -> FundingResult<String>;
}

/// EVM: 20-byte addresses left-padded with zeros
#[derive(Debug, Default, Clone, Copy)]
pub struct EvmCodec;

impl AddressCodec for EvmCodec {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn to_universal(&self, address: &str) -> FundingResult<B256> {
        let bytes = decode_hex(ChainFamily::Evm, address, 20)?;
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&bytes);
        Ok(B256::from(word))
    }

    fn from_universal(&self, word: &B256) -> FundingResult<String> {
        if word[..12].iter().any(|b| *b != 0) {
            return Err(invalid(ChainFamily::Evm, &format!("{}", word)));
        }
        Ok(to_checksum(&word[12..]))
    }
}

/// Fuel: addresses are already 32 bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct FuelCodec;

impl AddressCodec for FuelCodec {
    fn family(&self) -> ChainFamily {
        ChainFamily::Fuel
    }

    fn to_universal(&self, address: &str) -> FundingResult<B256> {
        let bytes = decode_hex(ChainFamily::Fuel, address, 32)?;
        Ok(B256::from_slice(&bytes))
    }

    fn from_universal(&self, word: &B256) -> FundingResult<String> {
        Ok(format!("0x{}", hex::encode(word)))
    }
}

/// Codec for a family
pub fn codec_for(family: ChainFamily) -> &'static dyn AddressCodec {
    match family {
        ChainFamily::Evm => &EvmCodec,
        ChainFamily::Fuel => &FuelCodec,
    }
}

fn decode_hex(family: ChainFamily, address: &str, len: usize) -> FundingResult<Vec<u8>> {
    let stripped = address.strip_prefix("0x").unwrap_or(address);
    let bytes = hex::decode(stripped).map_err(|_| invalid(family, address))?;
    if bytes.len() != len {
        return Err(invalid(family, address));
    }
    Ok(bytes)
}

fn invalid(family: ChainFamily, address: &str) -> FundingError {
    FundingError::InvalidAddress {
        family: family.to_string(),
        address: address.to_string(),
    }
}

/// EIP-55 mixed-case rendering
fn to_checksum(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
