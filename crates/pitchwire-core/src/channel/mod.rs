// Push channel: state machine, transport seam and async driver.

pub mod driver;
pub mod machine;
pub mod transport;

pub use driver::ChannelHandle;
pub use machine::{
    ChannelAction, ChannelInput, ChannelMachine, ReconnectPolicy, DEFAULT_RECONNECT_DELAY,
};
pub use transport::{Connector, FrameSource, WsConnector};
