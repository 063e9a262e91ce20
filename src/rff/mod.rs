//! Request-for-funds assembly
//!
//! A signed request is embedded into one vault deposit per source chain,
//! preceded by an ERC-20 approval when the vault's allowance is too low.

pub mod assembler;
pub mod signer;

pub use assembler::{DepositCall, EvmTransaction, RffAssembler};
pub use signer::{RffSigner, RffSource, SignatureData, SignedRff};

#[cfg(test)]
pub use signer::MockRffSigner;
