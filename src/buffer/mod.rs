//! Document storage: rope lines behind stable markers.

mod arena;
mod store;

pub use arena::{LineArena, Marker};
pub use store::{split_register, LineBuffer, WriteSummary};
