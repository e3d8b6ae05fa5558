//! Service layer coordinating configuration state and artifact generation.

mod manager;

pub use manager::ConfigManager;
