//! API Handlers
//!
//! Request handlers for all API endpoints.

pub mod health;
pub mod participants;
pub mod assets;
pub mod transfers;
pub mod context;
pub mod services;
pub mod policies;
