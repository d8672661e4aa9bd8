//! Transport bridge
//!
//! The persistent duplex message channel between browser clients and the
//! session layer: wire protocol types and the WebSocket server.

mod protocol;
mod server;

pub use protocol::{
    decode_payload, encode_payload, ClientMessage, ProtocolError, ServerMessage,
};
pub use server::BridgeServer;
