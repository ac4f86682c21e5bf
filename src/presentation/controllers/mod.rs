//! HTTP controllers for handling requests

pub mod cache;
pub mod health;
pub mod products;
pub mod versions;

pub use cache::*;
pub use health::*;
pub use products::*;
pub use versions::*;
