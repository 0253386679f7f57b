//! Stream multiplexing: id allocation, credit, and per-stream state.

pub mod credit;
pub mod machine;
pub mod registry;

pub use credit::Credit;
pub use machine::{Pattern, Side, SourceItem, SourceStream, StreamEntry, StreamEvent, into_source};
pub use registry::{Role, StreamIdAllocator, Tombstones};
