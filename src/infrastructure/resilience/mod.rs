//! Resilience infrastructure

mod manager;

pub use manager::CircuitBreakerManager;
