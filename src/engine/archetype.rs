//! # Archetypes (tables)
//!
//! An [`Archetype`] stores every entity that holds exactly the same set of
//! component kinds. It owns one dense column per kind, the list of member
//! entities in row order, and one version counter per kind.
//!
//! ## Layout
//!
//! ```text
//! component_ids: [ 0,   3,   7 ]      sorted, one per column
//! columns:       [ c0,  c3,  c7 ]     Box<dyn TypeErasedAttribute>
//! versions:      [ v0,  v3,  v7 ]     per-kind change counters
//! entities:      [ e_a, e_b, ... ]    row i of every column belongs to entities[i]
//! ```
//!
//! ## Structural moves
//!
//! Adding or removing a kind relocates the entity's row to the archetype for
//! the new kind set. [`Archetype::move_row_to_archetype`] transfers shared
//! columns, inserts the single added value (if any), drops source-only values,
//! and swap-removes the source row. The entity that filled the hole is
//! returned so the caller can fix its location.
//!
//! Moves validate the added value's type before touching any column, so a
//! failed move leaves both tables unchanged.
//!
//! ## Version counters
//!
//! Counters are monotonic. A table created by a structural move starts each
//! shared kind's counter at the source table's value, so a reader that had
//! observed the source never sees a newer table as older.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::component::ComponentRegistry;
use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, TypeMismatchError};
use crate::engine::storage::{downcast_attribute, downcast_attribute_mut, TypeErasedAttribute};
use crate::engine::types::{ArchetypeID, ComponentID, RowID, Signature, Version};

/// A table of entities sharing one component-kind set.
///
/// ## Invariants
/// - `component_ids` is sorted and matches the bits of `signature`.
/// - `columns`, `versions` and `component_ids` have equal length.
/// - Every column has exactly `entities.len()` rows.

pub struct Archetype {
    archetype_id: ArchetypeID,
    signature: Signature,
    component_ids: Vec<ComponentID>,
    columns: Vec<Box<dyn TypeErasedAttribute>>,
    versions: Vec<Version>,
    entities: Vec<Entity>,
    add_edges: HashMap<ComponentID, ArchetypeID>,
    remove_edges: HashMap<ComponentID, ArchetypeID>,
}

impl Archetype {
    /// Creates an empty archetype with one column per kind in `signature`.
    ///
    /// ## Errors
    /// `UnregisteredComponent` if any bit names a kind the registry lacks.

    pub fn new(
        archetype_id: ArchetypeID,
        signature: Signature,
        registry: &ComponentRegistry,
        capacity: usize,
    ) -> ECSResult<Self> {
        let component_ids: Vec<ComponentID> = signature.iterate_over_components().collect();
        let columns = component_ids
            .iter()
            .map(|&component_id| Ok(registry.describe(component_id)?.make_column(capacity)))
            .collect::<ECSResult<Vec<_>>>()?;

        Ok(Self {
            archetype_id,
            signature,
            versions: vec![0; component_ids.len()],
            component_ids,
            columns,
            entities: Vec::with_capacity(capacity),
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        })
    }

    /// The table with no component kinds.
    pub fn empty(archetype_id: ArchetypeID) -> Self {
        Self {
            archetype_id,
            signature: Signature::default(),
            component_ids: Vec::new(),
            columns: Vec::new(),
            versions: Vec::new(),
            entities: Vec::new(),
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        }
    }

    /// Stable identifier of this table.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeID {
        self.archetype_id
    }

    /// Component-kind set of this table.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Kinds stored here, ascending.
    #[inline]
    pub fn component_ids(&self) -> &[ComponentID] {
        &self.component_ids
    }

    /// Member entities in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if the table stores `component_id`.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        self.signature.has(component_id)
    }

    #[inline]
    fn column_index(&self, component_id: ComponentID) -> Option<usize> {
        self.component_ids.binary_search(&component_id).ok()
    }

    /// Type-erased column for `component_id`.
    pub fn column_dyn(&self, component_id: ComponentID) -> Option<&dyn TypeErasedAttribute> {
        self.column_index(component_id).map(|i| self.columns[i].as_ref())
    }

    /// Typed column slice for `component_id`.
    pub fn column<T: 'static>(&self, component_id: ComponentID) -> Option<&[T]> {
        let column = self.column_dyn(component_id)?;
        downcast_attribute::<T>(column).map(|attribute| attribute.as_slice())
    }

    /// Typed mutable column slice for `component_id`.
    ///
    /// Does not bump the version counter.
    pub fn column_mut<T: 'static>(&mut self, component_id: ComponentID) -> Option<&mut [T]> {
        let index = self.column_index(component_id)?;
        downcast_attribute_mut::<T>(self.columns[index].as_mut()).map(|attribute| attribute.as_mut_slice())
    }

    /// Member entities alongside a mutable typed column.
    pub fn entities_and_column_mut<T: 'static>(&mut self, component_id: ComponentID) -> Option<(&[Entity], &mut [T])> {
        let index = self.column_index(component_id)?;
        let column = downcast_attribute_mut::<T>(self.columns[index].as_mut())?;
        Some((&self.entities, column.as_mut_slice()))
    }

    /// One read-only and one mutable column of the same table.
    ///
    /// Returns `None` if either kind is missing, the types do not match, or
    /// both ids name the same column.

    pub fn column_pair<R: 'static, W: 'static>(
        &mut self,
        read_id: ComponentID,
        write_id: ComponentID,
    ) -> Option<(&[Entity], &[R], &mut [W])> {
        let read_index = self.column_index(read_id)?;
        let write_index = self.column_index(write_id)?;
        if read_index == write_index {
            return None;
        }

        let (read_column, write_column) = if read_index < write_index {
            let (low, high) = self.columns.split_at_mut(write_index);
            (low[read_index].as_ref(), high[0].as_mut())
        } else {
            let (low, high) = self.columns.split_at_mut(read_index);
            (high[0].as_ref(), low[write_index].as_mut())
        };

        let reads = downcast_attribute::<R>(read_column)?.as_slice();
        let writes = downcast_attribute_mut::<W>(write_column)?.as_mut_slice();
        Some((&self.entities, reads, writes))
    }

    /// Value of `component_id` at `row`.
    pub fn get_dyn(&self, component_id: ComponentID, row: RowID) -> Option<&dyn Any> {
        self.column_dyn(component_id)?.get_dyn(row)
    }

    /// Mutable value of `component_id` at `row`.
    pub fn get_dyn_mut(&mut self, component_id: ComponentID, row: RowID) -> Option<&mut dyn Any> {
        let index = self.column_index(component_id)?;
        self.columns[index].get_dyn_mut(row)
    }

    /// Overwrites `component_id` at `row` with a boxed value.
    ///
    /// Does not bump the version counter.
    pub fn set_dyn(
        &mut self,
        component_id: ComponentID,
        row: RowID,
        value: Box<dyn Any + Send>,
    ) -> Result<(), TypeMismatchError> {
        let Some(index) = self.column_index(component_id) else {
            return Err(mismatch(component_id, None, value.as_ref()));
        };
        let column = &mut self.columns[index];
        let expected = (column.element_type_id(), column.element_type_name());
        column.set_dyn(row, value).map_err(|actual| TypeMismatchError {
            component_id,
            expected: expected.0,
            expected_name: expected.1,
            actual,
        })
    }

    /// Current counter for `component_id`.
    #[inline]
    pub fn version(&self, component_id: ComponentID) -> Option<Version> {
        self.column_index(component_id).map(|i| self.versions[i])
    }

    /// Counters aligned with [`component_ids`](Self::component_ids).
    #[inline]
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Records one committed write to `component_id`, returning the new value.
    pub fn bump(&mut self, component_id: ComponentID) -> Option<Version> {
        let index = self.column_index(component_id)?;
        self.versions[index] += 1;
        Some(self.versions[index])
    }

    /// Records a structural change visible to readers of every kind.
    pub fn bump_all(&mut self) {
        for version in &mut self.versions {
            *version += 1;
        }
    }

    /// Raises shared counters to at least the values held by `source`.
    pub fn inherit_versions(&mut self, source: &Archetype) {
        for (index, &component_id) in self.component_ids.iter().enumerate() {
            if let Some(version) = source.version(component_id) {
                self.versions[index] = self.versions[index].max(version);
            }
        }
    }

    /// Cached target of adding `component_id`.
    #[inline]
    pub fn add_edge(&self, component_id: ComponentID) -> Option<ArchetypeID> {
        self.add_edges.get(&component_id).copied()
    }

    #[inline]
    pub fn set_add_edge(&mut self, component_id: ComponentID, target: ArchetypeID) {
        self.add_edges.insert(component_id, target);
    }

    /// Cached target of removing `component_id`.
    #[inline]
    pub fn remove_edge(&self, component_id: ComponentID) -> Option<ArchetypeID> {
        self.remove_edges.get(&component_id).copied()
    }

    #[inline]
    pub fn set_remove_edge(&mut self, component_id: ComponentID, target: ArchetypeID) {
        self.remove_edges.insert(component_id, target);
    }

    /// Appends a row for `entity` in a table with no columns.
    pub fn push_bare(&mut self, entity: Entity) -> RowID {
        debug_assert!(self.columns.is_empty(), "push_bare on a table with columns");
        let row = self.entities.len() as RowID;
        self.entities.push(entity);
        row
    }

    /// Swap-removes `row`, dropping its values.
    ///
    /// Returns the entity that now occupies `row`, if any moved.
    pub fn swap_remove_row(&mut self, row: RowID) -> Option<Entity> {
        for column in &mut self.columns {
            column.swap_remove_dyn(row);
        }
        self.entities.swap_remove(row as usize);
        self.entities.get(row as usize).copied()
    }

    /// Moves the entity at `row` into `destination`.
    ///
    /// ## Behavior
    /// 1. Validates `added` against the destination column it fills.
    /// 2. Transfers every shared column, pushes `added`, drops source-only values.
    /// 3. Swap-removes the source entity slot.
    ///
    /// ## Returns
    /// The destination row and the entity that filled `row` in this table.
    ///
    /// ## Errors
    /// `TypeMismatch` if `added` is the wrong type or does not belong to a
    /// destination-only column. Nothing is moved in that case.

    pub fn move_row_to_archetype(
        &mut self,
        destination: &mut Archetype,
        row: RowID,
        added: Option<(ComponentID, Box<dyn Any + Send>)>,
    ) -> ECSResult<(RowID, Option<Entity>)> {
        if let Some((component_id, value)) = &added {
            let target = destination
                .column_index(*component_id)
                .filter(|_| !self.has(*component_id))
                .map(|i| destination.columns[i].as_ref());
            match target {
                Some(column) if column.element_type_id() == value.as_ref().type_id() => {}
                other => return Err(mismatch(*component_id, other, value.as_ref()).into()),
            }
        }

        let mut added = added;
        for (destination_index, &component_id) in destination.component_ids.iter().enumerate() {
            let destination_column = destination.columns[destination_index].as_mut();
            match self.column_index(component_id) {
                Some(source_index) => {
                    let moved = self.columns[source_index].move_row_to(row, destination_column);
                    debug_assert!(moved.is_some(), "column type drift for component {component_id}");
                }
                None => {
                    if let Some((_, value)) = added.take() {
                        let pushed = destination_column.push_dyn(value);
                        debug_assert!(pushed.is_ok(), "validated value rejected");
                    }
                }
            }
        }

        for (source_index, &component_id) in self.component_ids.iter().enumerate() {
            if !destination.has(component_id) {
                self.columns[source_index].swap_remove_dyn(row);
            }
        }

        let entity = self.entities.swap_remove(row as usize);
        let destination_row = destination.entities.len() as RowID;
        destination.entities.push(entity);

        Ok((destination_row, self.entities.get(row as usize).copied()))
    }
}

fn mismatch(
    component_id: ComponentID,
    column: Option<&dyn TypeErasedAttribute>,
    value: &(dyn Any + Send),
) -> TypeMismatchError {
    let (expected, expected_name) = column
        .map(|c| (c.element_type_id(), c.element_type_name()))
        .unwrap_or((std::any::TypeId::of::<()>(), "<no column>"));
    TypeMismatchError { component_id, expected, expected_name, actual: value.type_id() }
}

/// Borrows two distinct archetypes mutably.
///
/// ## Panics
/// Panics if `a == b`.

pub fn get_archetype_pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeID,
    b: ArchetypeID,
) -> (&mut Archetype, &mut Archetype) {
    assert_ne!(a, b, "cannot borrow the same archetype twice");
    let (a_index, b_index) = (a as usize, b as usize);
    if a_index < b_index {
        let (low, high) = archetypes.split_at_mut(b_index);
        (&mut low[a_index], &mut high[0])
    } else {
        let (low, high) = archetypes.split_at_mut(a_index);
        (&mut high[0], &mut low[b_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::build_signature;

    #[derive(Default, Clone, Debug, PartialEq)]
    struct Position(f32, f32);

    #[derive(Default, Clone, Debug, PartialEq)]
    struct Velocity(f32, f32);

    fn setup() -> (ComponentRegistry, ComponentID, ComponentID) {
        let mut registry = ComponentRegistry::default();
        let position = registry.register::<Position>().unwrap();
        let velocity = registry.register::<Velocity>().unwrap();
        (registry, position, velocity)
    }

    #[test]
    fn move_carries_shared_values_and_reports_swapped_entity() {
        let (registry, position, velocity) = setup();
        let mut root = Archetype::new(0, build_signature(&[position]), &registry, 0).unwrap();
        let mut wide = Archetype::new(1, build_signature(&[position, velocity]), &registry, 0).unwrap();

        let (a, b) = (Entity(1), Entity(2));
        for (entity, x) in [(a, 1.0), (b, 2.0)] {
            root.entities.push(entity);
            root.columns[0].push_dyn(Box::new(Position(x, 0.0))).unwrap();
        }

        let (row, swapped) = root
            .move_row_to_archetype(&mut wide, 0, Some((velocity, Box::new(Velocity(5.0, 5.0)))))
            .unwrap();
        assert_eq!(row, 0);
        assert_eq!(swapped, Some(b));
        assert_eq!(root.column::<Position>(position).unwrap(), &[Position(2.0, 0.0)]);
        assert_eq!(wide.column::<Position>(position).unwrap(), &[Position(1.0, 0.0)]);
        assert_eq!(wide.column::<Velocity>(velocity).unwrap(), &[Velocity(5.0, 5.0)]);
        assert_eq!(wide.entities(), &[a]);
    }

    #[test]
    fn move_with_wrong_value_type_changes_nothing() {
        let (registry, _, velocity) = setup();
        let mut root = Archetype::new(0, Signature::default(), &registry, 0).unwrap();
        let mut target = Archetype::new(1, build_signature(&[velocity]), &registry, 0).unwrap();
        root.push_bare(Entity(7));

        let err = root.move_row_to_archetype(&mut target, 0, Some((velocity, Box::new(Position(0.0, 0.0)))));
        assert!(err.is_err());
        assert_eq!(root.len(), 1);
        assert!(target.is_empty());
    }

    #[test]
    fn versions_bump_and_inherit() {
        let (registry, position, velocity) = setup();
        let mut source = Archetype::new(0, build_signature(&[position]), &registry, 0).unwrap();
        source.bump(position);
        source.bump(position);

        let mut target = Archetype::new(1, build_signature(&[position, velocity]), &registry, 0).unwrap();
        target.inherit_versions(&source);
        assert_eq!(target.version(position), Some(2));
        assert_eq!(target.version(velocity), Some(0));

        target.bump_all();
        assert_eq!(target.versions(), &[3, 1]);
    }

    #[test]
    fn column_pair_splits_borrows() {
        let (registry, position, velocity) = setup();
        let mut table = Archetype::new(0, build_signature(&[position, velocity]), &registry, 0).unwrap();
        table.entities.push(Entity(0));
        table.columns[0].push_dyn(Box::new(Position(1.0, 1.0))).unwrap();
        table.columns[1].push_dyn(Box::new(Velocity(2.0, 3.0))).unwrap();

        let (_, velocities, positions) = table.column_pair::<Velocity, Position>(velocity, position).unwrap();
        positions[0].0 += velocities[0].0;
        assert_eq!(table.column::<Position>(position).unwrap()[0], Position(3.0, 1.0));
        assert!(table.column_pair::<Position, Position>(position, position).is_none());
    }
}
