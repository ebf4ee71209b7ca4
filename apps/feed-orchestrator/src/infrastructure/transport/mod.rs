//! Transport adapters.

mod ws;

pub use ws::{WsTransport, WsTransportConfig, WsTransportFactory};
