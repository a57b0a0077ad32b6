//! Data models for feed payloads

mod air;
mod body;
mod commute;
mod location;
mod news;
mod weather;

pub use air::*;
pub use body::*;
pub use commute::*;
pub use location::*;
pub use news::*;
pub use weather::*;
