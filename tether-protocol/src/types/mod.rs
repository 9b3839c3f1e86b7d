//! Shared data types

mod dimensions;
mod session;

pub use dimensions::Dimensions;
pub use session::Session;
