//! Injection targets
//!
//! [`Resolvable`] is implemented by the shapes a dependency can take:
//! `Arc<T>` for a single instance and [`All<T>`] for every managed instance
//! assignable to `T`. [`Injected<V>`] is the slot type for fields the
//! container fills after construction.

use crate::descriptor::{Instance, Requirement, TypeKey};
use crate::error::BoxError;
use once_cell::sync::OnceCell;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A dependency value as produced by the resolver, still type-erased.
#[derive(Clone)]
pub enum Resolved {
    Single(Instance),
    All(Vec<Instance>),
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(_) => f.write_str("Resolved::Single"),
            Self::All(items) => write!(f, "Resolved::All({})", items.len()),
        }
    }
}

/// Recover a typed handle from a view produced for `T`.
#[inline]
pub(crate) fn downcast_view<T: ?Sized + Send + Sync + 'static>(view: Instance) -> Option<Arc<T>> {
    view.downcast::<Arc<T>>().ok().map(|inner| Arc::clone(&*inner))
}

/// A type the container knows how to supply as a dependency.
pub trait Resolvable: Sized + Send + Sync + 'static {
    /// What has to be resolved to produce a value of this shape
    fn requirement(identifier: Option<&'static str>) -> Requirement;

    /// Rebuild the typed value from resolver output
    fn from_resolved(value: Resolved) -> Option<Self>;
}

impl<T: ?Sized + Send + Sync + 'static> Resolvable for Arc<T> {
    fn requirement(identifier: Option<&'static str>) -> Requirement {
        Requirement::single(TypeKey::of::<T>(), identifier)
    }

    fn from_resolved(value: Resolved) -> Option<Self> {
        match value {
            Resolved::Single(view) => downcast_view::<T>(view),
            Resolved::All(_) => None,
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Resolvable for All<T> {
    /// Collections ignore identifiers
    fn requirement(_identifier: Option<&'static str>) -> Requirement {
        Requirement::collection(TypeKey::of::<T>())
    }

    fn from_resolved(value: Resolved) -> Option<Self> {
        match value {
            Resolved::All(views) => views
                .into_iter()
                .map(downcast_view::<T>)
                .collect::<Option<Vec<_>>>()
                .map(All::new),
            Resolved::Single(_) => None,
        }
    }
}

// =============================================================================
// All<T>
// =============================================================================

/// Every managed instance assignable to `T`, in scan order.
///
/// An empty collection is a valid result.
pub struct All<T: ?Sized> {
    items: Vec<Arc<T>>,
}

impl<T: ?Sized> All<T> {
    pub fn new(items: Vec<Arc<T>>) -> Self {
        Self { items }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&Arc<T>> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&Arc<T>> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Arc<T>] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Arc<T>> {
        self.items
    }
}

impl<T: ?Sized> Clone for All<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: ?Sized> Default for All<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: ?Sized> fmt::Debug for All<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("All")
            .field("element", &std::any::type_name::<T>())
            .field("len", &self.items.len())
            .finish()
    }
}

impl<T: ?Sized> IntoIterator for All<T> {
    type Item = Arc<T>;
    type IntoIter = std::vec::IntoIter<Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T: ?Sized> IntoIterator for &'a All<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// =============================================================================
// Injected<V>
// =============================================================================

/// A field the container fills once after construction.
///
/// Dereferencing before injection panics; use [`Injected::get`] when the
/// value may legitimately be missing, e.g. inside a constructor.
///
/// ```rust
/// use component_injector::Injected;
/// use std::sync::Arc;
///
/// let slot: Injected<Arc<String>> = Injected::new();
/// assert!(slot.get().is_none());
/// ```
pub struct Injected<V> {
    slot: OnceCell<V>,
}

impl<V> Injected<V> {
    pub const fn new() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&V> {
        self.slot.get()
    }

    #[inline]
    pub fn is_injected(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Store the value. A slot can be filled only once.
    pub fn fill(&self, value: V) -> Result<(), BoxError> {
        self.slot
            .set(value)
            .map_err(|_| format!("{} was already injected", std::any::type_name::<V>()).into())
    }
}

impl<V> Default for Injected<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Deref for Injected<V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.slot
            .get()
            .expect("injected field accessed before the container filled it")
    }
}

impl<V: fmt::Debug> fmt::Debug for Injected<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.get() {
            Some(value) => f.debug_tuple("Injected").field(value).finish(),
            None => f.write_str("Injected(<pending>)"),
        }
    }
}
