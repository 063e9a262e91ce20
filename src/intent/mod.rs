//! Intent construction
//!
//! Turns a caller's balance snapshot across chains into an [`Intent`]: which
//! chains fund a destination payment, by how much, and at what fee.

pub mod builder;
pub mod model;

pub use builder::IntentBuilder;
pub use model::{
    to_base_units, BridgeAsset, DestinationAllocation, EoaToEphemeralCall, FeeBreakdown, Intent,
    IntentPlan, SourceAllocation,
};
