//! API handlers for Sesame.

pub mod auth;
pub mod health;
