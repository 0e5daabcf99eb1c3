//! Request handlers.

pub mod health;
pub mod sources;
pub mod videos;

pub use health::*;
pub use sources::*;
pub use videos::*;
