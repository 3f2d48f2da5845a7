//! Containers keyed by owner
//!
//! A [`Directory`] hands out one container per owner key and routes queries
//! to it. Queries only succeed once the owner's container is running.

use crate::container::{Container, ContainerStatus};
use crate::descriptor::Component;
use crate::error::{DiError, NotReady, Result};
use crate::inject::All;
use crate::scanner::{Catalog, Scanner};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

static GLOBAL: Lazy<Directory> = Lazy::new(|| Directory::new(Catalog::global()));

/// Registry of containers, one per owner.
///
/// # Examples
///
/// ```rust
/// use component_injector::{Catalog, Component, Directory, DiError, TypeDescriptor};
/// use std::sync::Arc;
///
/// struct Plugin;
///
/// impl Component for Plugin {
///     fn descriptor() -> TypeDescriptor {
///         TypeDescriptor::entry_point::<Plugin>().namespace("plugin").build()
///     }
/// }
///
/// let directory = Directory::new(Arc::new(Catalog::new()));
/// assert!(matches!(
///     directory.resolve::<Plugin>("plugin"),
///     Err(DiError::NotInitialized { .. })
/// ));
///
/// directory.initialize("plugin", Plugin).unwrap();
/// assert!(directory.resolve::<Plugin>("plugin").is_ok());
/// ```
pub struct Directory {
    scanner: Arc<dyn Scanner>,
    containers: DashMap<String, Arc<Container>, RandomState>,
}

impl Directory {
    /// Create a directory whose containers scan with `scanner`
    pub fn new(scanner: Arc<dyn Scanner>) -> Self {
        Self {
            scanner,
            containers: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Process-wide directory backed by [`Catalog::global`]
    pub fn global() -> &'static Directory {
        &GLOBAL
    }

    /// The owner's container, created in `Initializing` state when absent
    pub fn get_or_create(&self, owner: &str) -> Arc<Container> {
        if let Some(existing) = self.get(owner) {
            return existing;
        }

        let container = self
            .containers
            .entry(owner.to_owned())
            .or_insert_with(|| {
                #[cfg(feature = "logging")]
                debug!(
                    target: "component_injector",
                    owner = owner,
                    "Registering container"
                );
                Arc::new(Container::new(owner, Arc::clone(&self.scanner)))
            })
            .value()
            .clone();
        container
    }

    /// The owner's container, if one was created
    pub fn get(&self, owner: &str) -> Option<Arc<Container>> {
        self.containers.get(owner).map(|entry| Arc::clone(entry.value()))
    }

    /// Create (if needed) and bootstrap the owner's container
    pub fn initialize<T: Component>(&self, owner: &str, entry: T) -> Result<()> {
        self.get_or_create(owner).initialize(entry)
    }

    /// [`Directory::initialize`] for an entry point that is already shared
    pub fn initialize_arc<T: Component>(&self, owner: &str, entry: Arc<T>) -> Result<()> {
        self.get_or_create(owner).initialize_arc(entry)
    }

    /// The owner's container, provided it is ready to answer queries
    fn running(&self, owner: &str) -> Result<Arc<Container>> {
        let container = self
            .get(owner)
            .ok_or_else(|| DiError::not_initialized(owner, NotReady::Missing))?;

        match container.status() {
            ContainerStatus::Running => Ok(container),
            ContainerStatus::Initializing => Err(DiError::not_initialized(owner, NotReady::Initializing)),
            ContainerStatus::Failed => Err(DiError::not_initialized(owner, NotReady::Failed)),
        }
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self, owner: &str) -> Result<Arc<T>> {
        self.running(owner)?.resolve::<T>()
    }

    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        owner: &str,
        identifier: &str,
    ) -> Result<Arc<T>> {
        self.running(owner)?.resolve_named::<T>(identifier)
    }

    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self, owner: &str) -> Result<All<T>> {
        self.running(owner)?.resolve_all::<T>()
    }

    /// Number of containers, in any state
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Owner keys of all containers, in no particular order
    pub fn owners(&self) -> Vec<String> {
        self.containers.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("containers", &self.len())
            .finish()
    }
}
