pub mod common;
pub mod registry;
pub mod server;
pub mod transport;
