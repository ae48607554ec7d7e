//! API handlers for the portal security core.

pub mod auth;
pub mod health;
pub mod root;
