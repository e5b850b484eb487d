//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │                 EndpointDiscovery (port trait)                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │          KubernetesDiscovery │ StaticDiscovery                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod kubernetes;
mod static_list;

pub use kubernetes::{KubernetesDiscovery, DEFAULT_LABEL_SELECTOR};
pub use static_list::StaticDiscovery;
