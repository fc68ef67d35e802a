pub mod acquisition;
pub mod api;
pub mod core;
pub mod strategy;
