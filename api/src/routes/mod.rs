//! Route implementations.

pub mod cache;
pub mod health;
pub mod servers;
pub mod workflow;
