//! Vault contract ABI and fill events
//!
//! Defines the universal request layout accepted by the settlement vault, the
//! ERC-20 calls needed before a deposit, and the event the vault emits once a
//! solver has filled a request on the destination chain.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolEvent};
use ethers::types::{Log, H256};
use serde::{Deserialize, Serialize};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct SourcePair {
        uint8 universe;
        uint256 chainID;
        bytes32 contractAddress;
        uint256 value;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct DestinationPair {
        bytes32 contractAddress;
        uint256 value;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Party {
        uint8 universe;
        bytes32 addr;
    }

    /// Request for funds as signed by the requester
    #[derive(Debug, PartialEq, Eq)]
    struct Request {
        SourcePair[] sources;
        uint8 destinationUniverse;
        uint256 destinationChainID;
        DestinationPair[] destinations;
        uint256 nonce;
        uint256 expiry;
        Party[] parties;
    }

    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IVault {
        event Fulfilment(bytes32 indexed requestHash, uint256 indexed intentId, address solver);

        function deposit(Request calldata request, bytes calldata signature, uint256 chainIndex) external payable;
    }
}

/// Topic0 of the vault's fill event
pub fn fulfilment_topic() -> H256 {
    H256(IVault::Fulfilment::SIGNATURE_HASH.0)
}

/// Encode an intent id as an indexed topic
pub fn intent_id_topic(intent_id: u64) -> H256 {
    H256(U256::from(intent_id).to_be_bytes::<32>())
}

/// A fill observed on the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    pub chain_id: u64,
    pub intent_id: u64,
    pub request_hash: B256,
    pub solver: Address,
    pub block_number: u64,
    pub tx_hash: B256,
}

impl FillEvent {
    /// Decode a vault log, returning it only if it fills the given request
    pub fn from_log(chain_id: u64, log: &Log, request_hash: B256, intent_id: u64) -> Option<Self> {
        if log.topics.len() < 3 || log.topics[0] != fulfilment_topic() {
            return None;
        }
        if log.topics[1].0 != request_hash.0 || log.topics[2] != intent_id_topic(intent_id) {
            return None;
        }

        let solver = if log.data.len() >= 32 {
            Address::from_slice(&log.data[12..32])
        } else {
            Address::ZERO
        };

        Some(Self {
            chain_id,
            intent_id,
            request_hash,
            solver,
            block_number: log.block_number.map(|b| b.as_u64()).unwrap_or(0),
            tx_hash: B256::from(log.transaction_hash.unwrap_or_default().0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;

    fn fill_log(request_hash: B256, intent_id: u64) -> Log {
        let mut data = vec![0u8; 32];
        data[12..].copy_from_slice(&[0x42; 20]);
        Log {
            topics: vec![
                fulfilment_topic(),
                H256(request_hash.0),
                intent_id_topic(intent_id),
            ],
            data: data.into(),
            block_number: Some(1234u64.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_matching_fill_is_decoded() {
        let hash = B256::repeat_byte(7);
        let event = FillEvent::from_log(10, &fill_log(hash, 55), hash, 55).unwrap();

        assert_eq!(event.intent_id, 55);
        assert_eq!(event.solver, Address::repeat_byte(0x42));
        assert_eq!(event.block_number, 1234);
    }

    #[test]
    fn test_fill_for_other_intent_is_ignored() {
        let hash = B256::repeat_byte(7);
        assert!(FillEvent::from_log(10, &fill_log(hash, 56), hash, 55).is_none());
        assert!(FillEvent::from_log(10, &fill_log(B256::ZERO, 55), hash, 55).is_none());
    }

    #[test]
    fn test_approve_selector() {
        let call = IERC20::approveCall {
            spender: Address::ZERO,
            amount: U256::from(1u64),
        };
        let data = call.abi_encode();
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(data.len(), 4 + 64);
    }
}
