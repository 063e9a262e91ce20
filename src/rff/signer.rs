//! Signing collaborator for requests for funds

use crate::chain::ChainFamily;
use crate::error::FundingResult;
use crate::events::Request;
use crate::intent::Intent;

use alloy_primitives::{Bytes, B256, U256};
use async_trait::async_trait;

/// Requester signature over the request hash, for one chain family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureData {
    /// Raw universe tag; unknown tags are rejected during assembly
    pub universe: u8,
    pub address: B256,
    pub signature: Bytes,
    pub request_hash: B256,
}

/// One source leg as encoded in the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RffSource {
    pub chain_id: u64,
    pub universe: u8,
    pub token: B256,
    pub value: U256,
}

/// A request for funds ready for submission and deposit
#[derive(Debug, Clone)]
pub struct SignedRff {
    /// Coordination-chain message, opaque to this crate
    pub request_message: Vec<u8>,
    /// Family-neutral request embedded in every deposit
    pub request: Request,
    pub request_hash: B256,
    pub signatures: Vec<SignatureData>,
    pub sources: Vec<RffSource>,
}

/// Produces signed requests from intents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RffSigner: Send + Sync {
    async fn create_rff_from_intent(
        &self,
        intent: &Intent,
        family: ChainFamily,
    ) -> FundingResult<SignedRff>;
}
