//! On-disk metadata records shared by the layer chain and tag chain (§4.5).

pub mod header;
pub mod dimension;
pub mod channel;

pub use channel::{Channel, ChannelSet};
pub use header::Header;
