//! Infrastructure layer: object sources and DI container
//!
//! This layer defines the fetch boundary and wires up services.

pub mod di;
pub mod error;
pub mod memory;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use memory::StaticSource;
pub use traits::ObjectSource;
