pub mod docker;
pub mod sample;
pub mod types;
