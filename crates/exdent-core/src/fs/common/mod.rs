/// Shared device access
mod types;

pub use types::BlockDevice;
