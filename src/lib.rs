pub mod config;
pub mod errors;
pub mod net;
pub mod wire_protocol;

pub use config::{Config, NetConfig};
pub use errors::NetError;
pub use net::{
    ConnStatus, Connection, ConnectionId, ConnectionInfo, Event, Listener, ListenerId,
    ListenerStatus, SimpleNet, UserData,
};
pub use wire_protocol::{CommandMessage, CommandProtocol, Payload, Raw, WireProtocol};
