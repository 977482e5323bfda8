pub mod connection;
pub mod registry;

pub use connection::{CommandHandler, handle_connection};
pub use registry::{ConnectionHandle, ConnectionRegistry, Delivery, Registration};
