pub mod log;
pub mod bucket;
pub mod entitlement;
pub mod config;

pub use log::*;
pub use bucket::*;
pub use entitlement::*;
pub use config::*;
