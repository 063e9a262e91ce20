//! RFF relayer - requester-side funding across chains
//!
//! Aggregates a requester's balances on several chains into one request for
//! funds, submits it to the coordination chain and watches the destination
//! vault until the request is filled.

pub mod api;
pub mod chain;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod fees;
pub mod fulfillment;
pub mod intent;
pub mod metrics;
pub mod rff;
pub mod state;

pub use error::{FundingError, FundingResult};
