pub mod fixtures;
pub mod format;
pub mod state;
pub mod types;
