//! Type discovery
//!
//! A [`Scanner`] answers "which managed types live under this scope". The
//! container asks once per bootstrap, with the scope taken from the entry
//! point. [`Catalog`] is the registration-based scanner used by default.

use crate::descriptor::{Component, TypeDescriptor, TypeKey};
use once_cell::sync::Lazy;
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Supplies the descriptors of managed types under a scope, in a stable order.
pub trait Scanner: Send + Sync {
    fn scan(&self, scope: &str) -> Vec<Arc<TypeDescriptor>>;
}

impl<F> Scanner for F
where
    F: Fn(&str) -> Vec<Arc<TypeDescriptor>> + Send + Sync,
{
    fn scan(&self, scope: &str) -> Vec<Arc<TypeDescriptor>> {
        self(scope)
    }
}

/// Registration-based scanner.
///
/// Descriptors are returned in registration order, filtered to managed types
/// whose namespace is the scope or nested below it.
///
/// ```rust
/// use component_injector::{Catalog, Component, Scanner, TypeDescriptor};
///
/// #[derive(Default)]
/// struct Clock;
///
/// impl Component for Clock {
///     fn descriptor() -> TypeDescriptor {
///         TypeDescriptor::component::<Clock>()
///             .namespace("app::time")
///             .default_constructor()
///             .build()
///     }
/// }
///
/// let catalog = Catalog::new().with::<Clock>();
/// assert_eq!(catalog.scan("app").len(), 1);
/// assert!(catalog.scan("other").is_empty());
/// ```
#[derive(Default)]
pub struct Catalog {
    descriptors: RwLock<Vec<Arc<TypeDescriptor>>>,
}

static GLOBAL: Lazy<Arc<Catalog>> = Lazy::new(|| Arc::new(Catalog::new()));

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide catalog backing [`Directory::global`](crate::Directory::global)
    pub fn global() -> Arc<Catalog> {
        Arc::clone(&GLOBAL)
    }

    /// Builder-style [`Catalog::add`]
    pub fn with<T: Component>(self) -> Self {
        self.add::<T>();
        self
    }

    /// Register a component type
    pub fn add<T: Component>(&self) -> &Self {
        self.register(T::descriptor())
    }

    /// Register a hand-built descriptor. A type is kept only once; later
    /// registrations of the same type are ignored.
    pub fn register(&self, descriptor: TypeDescriptor) -> &Self {
        let mut descriptors = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);

        if descriptors.iter().any(|d| d.key() == descriptor.key()) {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_injector",
                component = descriptor.type_name(),
                "Type already in catalog"
            );
            return self;
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "component_injector",
            component = descriptor.type_name(),
            namespace = descriptor.namespace(),
            "Adding type to catalog"
        );

        descriptors.push(Arc::new(descriptor));
        self
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.read().iter().any(|d| d.key() == key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<TypeDescriptor>>> {
        self.descriptors.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scanner for Catalog {
    fn scan(&self, scope: &str) -> Vec<Arc<TypeDescriptor>> {
        let found: Vec<_> = self
            .read()
            .iter()
            .filter(|d| d.is_managed() && d.in_scope(scope))
            .cloned()
            .collect();

        #[cfg(feature = "logging")]
        debug!(
            target: "component_injector",
            scope = scope,
            found = found.len(),
            "Scanned catalog"
        );

        found
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("types", &self.len()).finish()
    }
}
