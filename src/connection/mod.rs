//! Connection Module
//!
//! Accepted connections and the registry the supervisor keeps them in.

pub mod registry;
pub mod socket;

pub(crate) use registry::{Registry, RegistryShared};
pub use registry::{RegistryView, Snapshot};
pub use socket::{Connection, RecvFlags};
