pub mod api;
pub mod stats;
pub mod types;
