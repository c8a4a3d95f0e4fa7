pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, KeySelectionOption, LoginStatus, ServerMessage, UnlockStatus};
pub use server::{Outbound, WsServer};
