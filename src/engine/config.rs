//! Store configuration.

use crate::engine::types::COMPONENT_CAP;

/// Tunables applied when a [`World`](crate::engine::manager::World) is built.
///
/// All fields are capacity hints or hard caps; none of them change the
/// observable semantics of mutations, events or change tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Rows reserved in every column of a newly created archetype.
    pub table_capacity: usize,
    /// Maximum number of component kinds the registry accepts.
    ///
    /// Clamped to [`COMPONENT_CAP`].
    pub component_cap: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 1024,
            table_capacity: 0,
            component_cap: COMPONENT_CAP,
        }
    }
}

impl WorldConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the number of entity slots reserved up front.
    #[must_use]
    pub fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    /// Override the per-column row reservation for new archetypes.
    #[must_use]
    pub fn with_table_capacity(mut self, capacity: usize) -> Self {
        self.table_capacity = capacity;
        self
    }

    /// Override the component kind cap.
    #[must_use]
    pub fn with_component_cap(mut self, cap: usize) -> Self {
        self.component_cap = cap.min(COMPONENT_CAP);
        self
    }
}
