//! Named-graph storage for the C# ASG.
//!
//! [`GraphStore`] is the backend contract; [`FileStore`] keeps `csi` files
//! in a directory and [`InMemoryStore`] keeps the same bytes in memory.
//! [`hash`] computes content digests and [`integrity`] checks whole-graph
//! invariants after loading.

pub mod error;
pub mod file;
pub mod hash;
pub mod integrity;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::StorageError;
pub use file::FileStore;
pub use integrity::Finding;
pub use memory::InMemoryStore;
pub use traits::GraphStore;
pub use types::{GraphSummary, StoreConfig};
