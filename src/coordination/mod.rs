//! Coordination of a funding attempt across chains
//!
//! The coordination layer:
//! 1. Submits signed requests to the coordination chain
//! 2. Records assigned intent ids for recovery
//! 3. Issues best-effort double-checks per source chain
//! 4. Hands destination fills to the fulfillment watcher

pub mod client;
pub mod double_check;
pub mod engine;
pub mod submitter;

pub use client::{CoordinatorClient, CosmosRestClient, DoubleCheckTx, TxSigner};
pub use double_check::{DoubleCheckOutcome, DoubleCheckVerifier};
pub use engine::{Collaborators, FundingEngine, FundingReceipt};
pub use submitter::{CoordinationSubmitter, RffSubmission, UNASSIGNED_INTENT_ID};
