//! Dense column storage and type-erased access.
//!
//! This module implements [`Attribute<T>`], the column container used by every
//! archetype, and [`TypeErasedAttribute`], the capability interface through
//! which archetypes manage heterogeneous columns without knowing `T`.
//!
//! # Storage model
//!
//! An attribute stores one value per archetype row, densely, starting at row
//! zero. Rows are removed with swap-remove, so removal is `O(1)` and the
//! column never has gaps, but element order is not preserved. Every column of
//! an archetype is mutated in lock-step, which keeps row `i` of every column
//! describing the same entity.
//!
//! # Type erasure
//!
//! Archetypes hold columns as `Box<dyn TypeErasedAttribute>`. The trait offers:
//!
//! - the element [`TypeId`] and type name for diagnostics and validation,
//! - downcasting hooks (`as_any` / `as_any_mut`) for typed slice access,
//! - boxed-value mutation (`push_dyn`, `set_dyn`) that rejects values of the
//!   wrong type instead of corrupting the column,
//! - row transfer between two columns of the same element type
//!   (`move_row_to`), used when an entity changes archetype.
//!
//! A failed downcast returns the offending value's [`TypeId`] so the caller
//! can build a [`TypeMismatchError`](crate::engine::error::TypeMismatchError).

use std::any::{type_name, Any, TypeId};

use crate::engine::types::RowID;

/// A type-erased interface over one archetype column.
///
/// ## Invariants
/// - `length()` equals the number of rows of the owning archetype.
/// - Every value stored has type [`element_type_id`](Self::element_type_id).
/// - `move_row_to` only succeeds between columns of the same element type.

pub trait TypeErasedAttribute: Any {
    /// Returns the number of stored values.
    fn length(&self) -> usize;

    /// Returns an immutable type-erased reference for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable type-erased reference for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the `TypeId` of the element type stored by this attribute.
    fn element_type_id(&self) -> TypeId;

    /// Returns the human-readable name of the element type stored.
    fn element_type_name(&self) -> &'static str;

    /// Appends a boxed value, returning its row.
    ///
    /// Fails with the value's `TypeId` if it is not the element type.
    fn push_dyn(&mut self, value: Box<dyn Any + Send>) -> Result<RowID, TypeId>;

    /// Overwrites the value at `row`.
    ///
    /// Fails with the value's `TypeId` if it is not the element type.
    fn set_dyn(&mut self, row: RowID, value: Box<dyn Any + Send>) -> Result<(), TypeId>;

    /// Returns the value at `row`, if in bounds.
    fn get_dyn(&self, row: RowID) -> Option<&dyn Any>;

    /// Returns the value at `row` mutably, if in bounds.
    fn get_dyn_mut(&mut self, row: RowID) -> Option<&mut dyn Any>;

    /// Removes `row` by moving the last value into it.
    fn swap_remove_dyn(&mut self, row: RowID);

    /// Swap-removes `row` from this column and appends it to `destination`.
    ///
    /// Returns the destination row, or `None` if the element types differ.
    fn move_row_to(&mut self, row: RowID, destination: &mut dyn TypeErasedAttribute) -> Option<RowID>;
}

/// A dense column of `T` values.
#[derive(Debug)]
pub struct Attribute<T> {
    values: Vec<T>,
}

impl<T> Default for Attribute<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T> Attribute<T> {
    /// Creates an empty column with room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { values: Vec::with_capacity(capacity) }
    }

    /// Appends a value and returns its row.
    #[inline]
    pub fn push(&mut self, value: T) -> RowID {
        let row = self.values.len() as RowID;
        self.values.push(value);
        row
    }

    /// Returns the value at `row`.
    #[inline]
    pub fn get(&self, row: RowID) -> Option<&T> {
        self.values.get(row as usize)
    }

    /// Returns the value at `row` mutably.
    #[inline]
    pub fn get_mut(&mut self, row: RowID) -> Option<&mut T> {
        self.values.get_mut(row as usize)
    }

    /// Removes `row` via swap-remove and returns the removed value.
    #[inline]
    pub fn swap_remove(&mut self, row: RowID) -> T {
        self.values.swap_remove(row as usize)
    }

    /// All values in row order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// All values in row order, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the column holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Send + Sync + 'static> TypeErasedAttribute for Attribute<T> {
    fn length(&self) -> usize { self.values.len() }

    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn element_type_id(&self) -> TypeId { TypeId::of::<T>() }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }

    fn push_dyn(&mut self, value: Box<dyn Any + Send>) -> Result<RowID, TypeId> {
        let actual = (*value).type_id();
        let value = value.downcast::<T>().map_err(|_| actual)?;
        Ok(self.push(*value))
    }

    fn set_dyn(&mut self, row: RowID, value: Box<dyn Any + Send>) -> Result<(), TypeId> {
        let actual = (*value).type_id();
        let value = value.downcast::<T>().map_err(|_| actual)?;
        self.values[row as usize] = *value;
        Ok(())
    }

    fn get_dyn(&self, row: RowID) -> Option<&dyn Any> {
        self.values.get(row as usize).map(|v| v as &dyn Any)
    }

    fn get_dyn_mut(&mut self, row: RowID) -> Option<&mut dyn Any> {
        self.values.get_mut(row as usize).map(|v| v as &mut dyn Any)
    }

    fn swap_remove_dyn(&mut self, row: RowID) {
        self.values.swap_remove(row as usize);
    }

    fn move_row_to(&mut self, row: RowID, destination: &mut dyn TypeErasedAttribute) -> Option<RowID> {
        let destination = destination.as_any_mut().downcast_mut::<Attribute<T>>()?;
        let value = self.values.swap_remove(row as usize);
        Some(destination.push(value))
    }
}

/// Downcasts a column to its concrete attribute type.
#[inline]
pub fn downcast_attribute<T: 'static>(column: &dyn TypeErasedAttribute) -> Option<&Attribute<T>> {
    column.as_any().downcast_ref::<Attribute<T>>()
}

/// Downcasts a column to its concrete attribute type, mutably.
#[inline]
pub fn downcast_attribute_mut<T: 'static>(column: &mut dyn TypeErasedAttribute) -> Option<&mut Attribute<T>> {
    column.as_any_mut().downcast_mut::<Attribute<T>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_remove_keeps_column_dense() {
        let mut column: Attribute<u32> = Attribute::default();
        for i in 0..4 {
            column.push(i);
        }
        assert_eq!(column.swap_remove(1), 1);
        assert_eq!(column.as_slice(), &[0, 3, 2]);
    }

    #[test]
    fn push_dyn_rejects_wrong_type() {
        let mut column: Attribute<u32> = Attribute::default();
        let err = column.push_dyn(Box::new(1.5f32)).unwrap_err();
        assert_eq!(err, TypeId::of::<f32>());
        assert_eq!(column.length(), 0);
    }

    #[test]
    fn move_row_transfers_value_between_columns() {
        let mut source: Attribute<u64> = Attribute::default();
        let mut destination: Attribute<u64> = Attribute::default();
        source.push(7);
        source.push(9);

        let row = source.move_row_to(0, &mut destination).unwrap();
        assert_eq!(row, 0);
        assert_eq!(destination.as_slice(), &[7]);
        assert_eq!(source.as_slice(), &[9]);

        let mut wrong: Attribute<u8> = Attribute::default();
        assert!(source.move_row_to(0, &mut wrong).is_none());
        assert_eq!(source.len(), 1);
    }

    fn first_row<T: Copy + 'static>(column: &mut dyn TypeErasedAttribute) -> Option<T> {
        let attribute = downcast_attribute_mut::<T>(column)?;
        attribute.as_mut_slice().first().copied()
    }

    #[test]
    fn slices_are_reachable_through_unbounded_downcasts() {
        let mut column: Attribute<u16> = Attribute::with_capacity(2);
        column.push(5);
        assert_eq!(first_row::<u16>(&mut column), Some(5));
        assert_eq!(first_row::<u32>(&mut column), None);
        assert_eq!(downcast_attribute::<u16>(&column).map(Attribute::len), Some(1));
    }
}
