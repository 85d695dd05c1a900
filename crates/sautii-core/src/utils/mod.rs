//! Utility functions for log-safe formatting.

pub mod mask;

// Re-export commonly used functions at module level
pub use mask::mask_login_id;
