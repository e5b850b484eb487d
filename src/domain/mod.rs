//! Domain Layer
//!
//! Value objects and ports shared across the prober.
//!
//! - **Ports** (`ports.rs`) - endpoint identity, operating mode and the
//!   discovery trait that adapters implement
//!
//! # Usage
//!
//! ```ignore
//! use scout::domain::{Endpoint, EndpointDiscovery};
//!
//! async fn count<D: EndpointDiscovery>(discovery: &D) -> Result<usize> {
//!     Ok(discovery.list_endpoints().await?.len())
//! }
//! ```

pub mod ports;

pub use ports::{
    Endpoint, EndpointDiscovery, OperatingMode, SourceIdentity, LOCAL_PLACEHOLDER,
};
