//! Pluggable create/destroy pair for the pooled resource.
//!
//! The pool never looks inside a connection. It asks the connector for a new
//! one when it grows and hands it back for disposal when it shrinks or shuts
//! down.

use async_trait::async_trait;

pub mod mock;
pub mod tcp;

pub use mock::{MockConnection, MockConnector, MockError};
pub use tcp::TcpConnector;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The raw resource handed out through leases.
    type Connection: Send + 'static;

    /// Error returned by `create` and `destroy`; passed through to callers.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection.
    async fn create(&self) -> Result<Self::Connection, Self::Error>;

    /// Close a connection permanently. Called at most once per connection.
    async fn destroy(&self, conn: Self::Connection) -> Result<(), Self::Error> {
        drop(conn);
        Ok(())
    }
}
