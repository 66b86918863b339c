//! podgate-plugins — built-in placement plugins.
//!
//! # Plugins
//!
//! - **`memory_aware`** — opt-in gate on the pod's scheduler name, rejects
//!   nodes too small for the pod's largest container, scores nodes by how
//!   many pods they already run, and holds young pods back at Permit.
//!
//! Use [`register_builtin`] to add every built-in plugin to a registry.

pub mod memory_aware;
pub mod reservation;

pub use memory_aware::{MemoryAware, MemoryAwareArgs, PRE_FILTER_STATE, PreFilterState};
pub use reservation::{Reservation, ReservationLedger};

use podgate_framework::{FrameworkResult, Registry};

/// Register all built-in plugins under their default names.
pub fn register_builtin(registry: &mut Registry) -> FrameworkResult<()> {
    registry.register(memory_aware::NAME, Box::new(memory_aware::factory))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_registered() {
        let mut registry = Registry::new();
        register_builtin(&mut registry).unwrap();
        assert!(registry.contains("memory-aware"));
    }

    #[test]
    fn registering_twice_fails() {
        let mut registry = Registry::new();
        register_builtin(&mut registry).unwrap();
        assert!(register_builtin(&mut registry).is_err());
    }
}
