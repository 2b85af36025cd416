//! Infrastructure layer - engine, managers, stores, tools and observability

pub mod cache;
pub mod logging;
pub mod observability;
pub mod resilience;
pub mod tool;
pub mod workflow;
