//! Byte-oriented duplex channel to the coordinator.
//!
//! This module only specifies the interface a concrete transport driver
//! (USB CDC, SPI, UART — all out of scope for this crate) must satisfy; it
//! does not interpret frame contents.

mod loopback;
mod traits;

pub use loopback::LoopbackChannel;
pub use traits::{ChannelError, ChannelState, DpaCoordinatorChannel, ReceiveHandler};
