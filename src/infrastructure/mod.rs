//! Infrastructure Layer - External concerns and implementations
//!
//! This module handles the product store, the cache tiers and the licensing subsystem.

pub mod cache;
pub mod licensing;
pub mod repositories;

pub use cache::*;
pub use licensing::{LicensingService, SignedUrlLicensing};
pub use repositories::*;
