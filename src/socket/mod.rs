//! Reconnecting WebSocket session
//!
//! - `machine`: pure connection state machine (events in, effects out)
//! - `session`: async driver owning the transport and both timers
//! - `transport`: connector abstraction and the tungstenite implementation
//! - `messages`: JSON envelope parsing and outbound frames
//! - `policy`: reconnect backoff

mod machine;
pub mod messages;
mod policy;
mod session;
mod transport;

pub use machine::{ConnectionMachine, ConnectionState, Effect, Event};
pub use messages::{InboundMessage, MessageError, OutboundMessage};
pub use policy::{Backoff, ReconnectPolicy};
pub use session::{ConnectionStatus, SocketConfig, SocketSession};
pub use transport::{Connector, EventSink, Transport, TransportEvent, WsConnector};
