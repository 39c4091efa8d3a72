// net/mod.rs
//! Sockets, connections and the registry that multiplexes them.
//! Nothing in here knows about any particular wire format.

pub(crate) mod conn_set;
pub mod connection;
pub mod event;
pub mod ids;
pub(crate) mod inbox;
pub mod listener;
pub mod registry;
pub mod user_data;

pub use connection::{ConnStatus, Connection, ConnectionInfo};
pub use event::Event;
pub use ids::{ConnectionId, ListenerId};
pub use listener::{Listener, ListenerStatus};
pub use registry::SimpleNet;
pub use user_data::UserData;
