//! Services bundled with the host binary.

pub mod abs;
pub mod child;

pub use abs::AbsService;
pub use child::ChildService;

use crate::service::{RegistryError, ServiceRegistry};

/// Registry with every bundled service.
pub fn default_registry() -> Result<ServiceRegistry, RegistryError> {
    let mut builder = ServiceRegistry::builder();
    builder
        .register("abs", AbsService::construct)?
        .register("child", ChildService::construct)?;
    Ok(builder.build())
}
