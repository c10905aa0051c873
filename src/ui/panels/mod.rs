//! Routed pages of the main content area

pub mod clash;
pub mod proxies;
pub mod settings;
