//! Storage change events.
//!
//! Every successful write against the document store can be published as a
//! [`ChangeEvent`] through a [`ChangeBroadcaster`]. Consumers (the schema
//! registry, the document scheduler) subscribe to the broadcaster, usually
//! through the storage layer's `watch` operation.
//!
//! ```text
//!   write ──► ChangeBroadcaster (tokio::sync::broadcast)
//!                 │              │
//!                 ▼              ▼
//!          SchemaRegistry   DocumentScheduler
//! ```

pub mod broadcaster;
pub mod types;

pub use broadcaster::ChangeBroadcaster;
pub use types::{ChangeEvent, ChangeOperation};
