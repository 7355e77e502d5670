pub mod containers;
pub mod images;
pub mod logs;
pub mod machines;
pub mod networks;
pub mod types;
pub mod volumes;
