//! # Component Registry
//!
//! This module assigns stable [`ComponentID`] values to Rust component types
//! and keeps the metadata each store needs to build columns for them.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size,
//! alignment) from runtime storage, enabling archetypes to store heterogeneous
//! component columns behind [`TypeErasedAttribute`].
//!
//! ## Design
//! - Every [`World`](crate::engine::manager::World) owns its own registry;
//!   ids are dense, start at zero and are handed out in registration order.
//! - Each [`ComponentDesc`] carries two constructors: a column factory used
//!   when an archetype is created, and a default-value constructor used when a
//!   component is attached without a value.
//! - Kinds that do not implement `Default` register through
//!   [`ComponentRegistry::register_with_default`].
//!
//! ## Invariants
//! - `ComponentID` values are unique and stable for the lifetime of the store.
//! - Every registered id has a descriptor, a factory and a default constructor.
//! - At most `cap` kinds are registered; the next registration fails with
//!   [`CapacityError`].

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::mem::{align_of, size_of};
use std::sync::Arc;

use crate::engine::error::{CapacityError, ECSError, ECSResult, TypeMismatchError};
use crate::engine::storage::{Attribute, TypeErasedAttribute};
use crate::engine::types::{ComponentID, COMPONENT_CAP};

/// Marker for types that can be stored as components.
///
/// Implemented automatically for every `Send + Sync + 'static` type.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Factory for an empty column with the given row reservation.
pub type FactoryFn = fn(usize) -> Box<dyn TypeErasedAttribute>;

/// Constructor for a boxed default value.
pub type DefaultFn = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

fn new_attribute_storage<T: Component>(capacity: usize) -> Box<dyn TypeErasedAttribute> {
    Box::new(Attribute::<T>::with_capacity(capacity))
}

/// Describes a registered component type.
///
/// ## Fields
/// - `component_id`: The runtime identifier assigned by the registry.
/// - `name`: The Rust type name (`type_name::<T>()`).
/// - `type_id`: The runtime `TypeId` for the component.
/// - `size`: `size_of::<T>()` in bytes.
/// - `align`: `align_of::<T>()` in bytes.

#[derive(Clone)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentID,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// Size of the component type in bytes.
    pub size: usize,

    /// Alignment of the component type in bytes.
    pub align: usize,

    factory: FactoryFn,
    default_fn: DefaultFn,
}

impl ComponentDesc {
    fn of<T: Component>(component_id: ComponentID, default_fn: DefaultFn) -> Self {
        Self {
            component_id,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            factory: new_attribute_storage::<T>,
            default_fn,
        }
    }

    /// Returns `true` if this descriptor refers to type `T`.
    #[inline]
    pub fn matches_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Creates an empty column for this kind.
    #[inline]
    pub fn make_column(&self, capacity: usize) -> Box<dyn TypeErasedAttribute> {
        (self.factory)(capacity)
    }

    /// Constructs a boxed default value for this kind.
    #[inline]
    pub fn default_value(&self) -> Box<dyn Any + Send> {
        (self.default_fn)()
    }

    /// Fails if `value` is not of this kind's type.
    pub fn check_value(&self, value: &(dyn Any + Send)) -> Result<(), TypeMismatchError> {
        let actual = value.type_id();
        if actual == self.type_id {
            Ok(())
        } else {
            Err(TypeMismatchError {
                component_id: self.component_id,
                expected: self.type_id,
                expected_name: self.name,
                actual,
            })
        }
    }
}

impl fmt::Debug for ComponentDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDesc")
            .field("component_id", &self.component_id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

impl fmt::Display for ComponentDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ComponentDesc {{ id: {}, name: {}, size: {}, align: {} }}",
            self.component_id, self.name, self.size, self.align
        )
    }
}

/// Mapping between Rust component types and compact `ComponentID` values.
///
/// ## Design
/// - `by_type` maps `TypeId -> ComponentID`.
/// - `by_id` stores descriptors indexed by `ComponentID`.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching `by_id[id]`.
/// - `by_id.len() <= cap`.

pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<ComponentDesc>,
    cap: usize,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_cap(COMPONENT_CAP)
    }
}

impl ComponentRegistry {
    /// Creates an empty registry accepting at most `cap` kinds.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            by_type: HashMap::new(),
            by_id: Vec::new(),
            cap: cap.min(COMPONENT_CAP),
        }
    }

    /// Registers component type `T` and returns its assigned `ComponentID`.
    ///
    /// ## Behavior
    /// - If `T` is already registered, returns the existing ID.
    /// - Otherwise allocates the next ID and stores a descriptor whose default
    ///   constructor is `T::default`.
    ///
    /// ## Errors
    /// [`ECSError::Capacity`] when the registry is full.

    pub fn register<T: Component + Default>(&mut self) -> ECSResult<ComponentID> {
        self.register_with_default::<T>(T::default)
    }

    /// Registers `T` with an explicit constructor for default values.
    ///
    /// An existing registration is returned unchanged; the constructor is
    /// ignored in that case.

    pub fn register_with_default<T: Component>(
        &mut self,
        make_default: impl Fn() -> T + Send + Sync + 'static,
    ) -> ECSResult<ComponentID> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok(existing);
        }

        if self.by_id.len() >= self.cap {
            return Err(CapacityError {
                needed: self.by_id.len() as u64 + 1,
                capacity: self.cap as u64,
            }
            .into());
        }

        let component_id = self.by_id.len() as ComponentID;
        let default_fn: DefaultFn = Arc::new(move || Box::new(make_default()) as Box<dyn Any + Send>);
        self.by_type.insert(type_id, component_id);
        self.by_id.push(ComponentDesc::of::<T>(component_id, default_fn));

        tracing::debug!(component_id, name = type_name::<T>(), "registered component");
        Ok(component_id)
    }

    /// Returns the `ComponentID` for `T`, if registered.
    #[inline]
    pub fn id_of<T: 'static>(&self) -> Option<ComponentID> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the `ComponentID` for `T`, or [`ECSError::UnregisteredType`].
    pub fn require_id_of<T: 'static>(&self) -> ECSResult<ComponentID> {
        self.id_of::<T>().ok_or(ECSError::UnregisteredType(type_name::<T>()))
    }

    /// Returns the descriptor for `component_id`, if registered.
    #[inline]
    pub fn get(&self, component_id: ComponentID) -> Option<&ComponentDesc> {
        self.by_id.get(component_id as usize)
    }

    /// Returns the descriptor for `component_id`, or [`ECSError::UnregisteredComponent`].
    pub fn describe(&self, component_id: ComponentID) -> ECSResult<&ComponentDesc> {
        self.get(component_id).ok_or(ECSError::UnregisteredComponent(component_id))
    }

    /// Number of registered kinds.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterates descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDesc> {
        self.by_id.iter()
    }
}
