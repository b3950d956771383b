//! Actual Budget connector.
//!
//! Turns a workflow node's `resource`/`operation` selectors and named
//! parameters into calls against a [`BudgetBackend`], and shapes the results
//! into `{"json": {"data": ...}}` records.
//!
//! ```rust,no_run
//! use connector::{Credentials, MemoryBackend, Node, Parameters};
//!
//! # async fn run() -> connector::Result<()> {
//! let node = Node::builder()
//!     .credentials(Credentials::new("http://localhost:5006", "secret", "budget-id"))
//!     .build()?;
//! let params = Parameters::new()
//!     .with("resource", "utility")
//!     .with("operation", "integerToAmount")
//!     .with("amount", 12345);
//! let records = node.execute(&mut MemoryBackend::new(), &params, 1).await?;
//! assert_eq!(records[0].json["data"], "123.45");
//! # Ok(())
//! # }
//! ```

pub mod amount;
pub mod backend;
mod dispatch;
pub mod error;
pub mod memory;
mod node;
pub mod parameters;
pub mod request;
pub mod session;

pub use amount::{Amount, amount_to_integer, integer_to_amount};
pub use backend::{BudgetBackend, InitConfig};
pub use dispatch::{SYNC_OK, dispatch};
pub use error::{BackendError, ConnectorError, Result};
pub use memory::MemoryBackend;
pub use node::{Node, NodeBuilder, ResultRecord};
pub use parameters::Parameters;
pub use request::{Operation, Request, Resource};
pub use session::{Credentials, Session, SessionConfig};
