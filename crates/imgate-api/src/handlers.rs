//! Request handlers.

pub mod health;
pub mod images;
pub mod preflight;

pub use health::*;
pub use images::*;
pub use preflight::*;
