//! Trustee Types - Canonical domain types for trusted data exchange
//!
//! This crate contains the foundational types shared by every trustee crate,
//! with zero dependencies on other trustee crates:
//!
//! - Participants and the participant-list hash
//! - Data exchange entries and their lifecycle states
//! - Negotiation and notification messages exchanged between connectors
//! - Service descriptors for anonymisation services
//!
//! # Exchange Flow
//!
//! ```text
//! consumer ──negotiate──▶ provider          (common trustee chosen)
//! consumer ──notify──▶ trustee ◀──notify── provider
//! trustee: NOT_READY → READY → IN_PROGRESS → COMPLETED
//! ```

pub mod participant;
pub mod exchange;
pub mod negotiation;
pub mod service;
pub mod hash;
pub mod error;

pub use participant::*;
pub use exchange::*;
pub use negotiation::*;
pub use service::*;
pub use hash::*;
pub use error::*;

/// Path segment under which every connector exposes the whitelist API
pub const TRUSTED_PARTICIPANTS_PATH: &str = "/api/trusted-participants";

/// Strip the whitelist API segment from a participant URL, yielding the connector base URL
pub fn connector_base(url: &str) -> String {
    url.replace(TRUSTED_PARTICIPANTS_PATH, "")
}
