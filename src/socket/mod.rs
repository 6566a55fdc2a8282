pub mod connection_manager;
pub mod message;
pub mod target;
pub mod transport;

pub use connection_manager::{
    get_connection_manager, init_connection_manager, ConnectionEvent, ConnectionManager,
    ConnectionState, ManagerConfig, StatsSnapshot,
};
pub use message::{
    dispatch, dispatch_if, dispatch_text, dispatch_text_if, DispatchOutcome, StreamMessage,
};
pub use target::StreamTarget;
pub use transport::{Connector, Transport, WsConnector};
