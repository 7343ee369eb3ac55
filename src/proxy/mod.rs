//! The core request path: connection state (4.J data model), the request
//! processor state machine (4.J), and the bidirectional relay (4.K).

pub mod connection;
pub mod processor;
pub mod relay;

pub use connection::Connection;
pub use processor::process as handle_connection;
