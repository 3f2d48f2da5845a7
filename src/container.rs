//! The container: bootstrap and resolution
//!
//! A container is owned by one key (a plugin, a module, an application) and
//! goes through a single bootstrap. Bootstrap registers the entry point,
//! scans its scope for managed types, and builds every one of them eagerly.
//! Afterwards the container answers queries: already built singletons are
//! returned from the registry without locking, anything else is built under
//! the container's construction lock.

use crate::descriptor::{Component, Instance, Requirement, TypeDescriptor, TypeKey};
use crate::error::{CyclePath, DiError, NotReady, Result};
use crate::factory::{select_constructor, select_post_init};
use crate::inject::{All, Resolved, downcast_view};
use crate::registry::{Record, Registry};
use crate::scanner::Scanner;
use ahash::RandomState;
use once_cell::sync::OnceCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[cfg(feature = "logging")]
use tracing::{debug, error, info, trace, warn};

/// Lifecycle state of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContainerStatus {
    /// Created, bootstrap not finished
    Initializing = 0,
    /// Bootstrap succeeded; queries are answered
    Running = 1,
    /// Bootstrap failed; the container stays unusable
    Failed = 2,
}

impl ContainerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Failed,
            _ => Self::Initializing,
        }
    }
}

/// Managed types found by the bootstrap scan
struct ManagedTypes {
    ordered: Vec<Arc<TypeDescriptor>>,
    by_key: HashMap<TypeKey, Arc<TypeDescriptor>, RandomState>,
}

impl ManagedTypes {
    fn new(ordered: Vec<Arc<TypeDescriptor>>) -> Self {
        let mut by_key = HashMap::with_capacity_and_hasher(ordered.len(), RandomState::new());
        for descriptor in &ordered {
            by_key.entry(descriptor.key()).or_insert_with(|| Arc::clone(descriptor));
        }
        Self { ordered, by_key }
    }
}

/// Types currently under construction, outermost first.
///
/// One path is threaded through each top-level resolution, so concurrent
/// resolutions never see each other's frames.
#[derive(Debug, Default)]
pub(crate) struct DependencyPath {
    stack: Vec<TypeKey>,
}

impl DependencyPath {
    #[inline]
    fn contains(&self, key: TypeKey) -> bool {
        self.stack.contains(&key)
    }

    #[inline]
    fn push(&mut self, key: TypeKey) {
        self.stack.push(key);
    }

    #[inline]
    fn pop(&mut self) {
        self.stack.pop();
    }

    #[inline]
    fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The current path followed by `repeated`
    fn cycle_with(&self, repeated: TypeKey) -> CyclePath {
        let mut names: Vec<_> = self.stack.iter().map(|key| key.name()).collect();
        names.push(repeated.name());
        CyclePath::new(names)
    }
}

/// Construction lock held by the current thread. Clears the holder before
/// the lock is released.
struct ConstructionGuard<'a> {
    holder: &'a Mutex<Option<ThreadId>>,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Singleton-scoped dependency injection container.
///
/// # Examples
///
/// ```rust
/// use component_injector::{Catalog, Component, Container, TypeDescriptor};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Config {
///     verbose: bool,
/// }
///
/// impl Component for Config {
///     fn descriptor() -> TypeDescriptor {
///         TypeDescriptor::component::<Config>()
///             .namespace("app")
///             .default_constructor()
///             .build()
///     }
/// }
///
/// struct App;
///
/// impl Component for App {
///     fn descriptor() -> TypeDescriptor {
///         TypeDescriptor::entry_point::<App>().namespace("app").build()
///     }
/// }
///
/// let catalog = Arc::new(Catalog::new().with::<Config>());
/// let container = Container::new("app", catalog);
/// container.initialize(App).unwrap();
///
/// let config = container.resolve::<Config>().unwrap();
/// assert!(!config.verbose);
/// ```
pub struct Container {
    owner: String,
    scanner: Arc<dyn Scanner>,
    registry: Registry,
    managed: OnceCell<ManagedTypes>,
    queue: Mutex<VecDeque<Arc<TypeDescriptor>>>,
    status: AtomicU8,
    /// Serializes construction and bootstrap
    lock: Mutex<()>,
    /// Thread currently holding `lock`
    holder: Mutex<Option<ThreadId>>,
}

impl Container {
    /// Create a container in the `Initializing` state
    pub fn new(owner: impl Into<String>, scanner: Arc<dyn Scanner>) -> Self {
        let owner = owner.into();

        #[cfg(feature = "logging")]
        debug!(
            target: "component_injector",
            owner = owner.as_str(),
            "Creating container"
        );

        Self {
            owner,
            scanner,
            registry: Registry::new(),
            managed: OnceCell::new(),
            queue: Mutex::new(VecDeque::new()),
            status: AtomicU8::new(ContainerStatus::Initializing as u8),
            lock: Mutex::new(()),
            holder: Mutex::new(None),
        }
    }

    #[inline]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[inline]
    pub fn status(&self) -> ContainerStatus {
        ContainerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Number of singletons built so far, entry point included
    pub fn instance_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether a singleton of the concrete type `T` has been built
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.registry.contains(TypeKey::of::<T>())
    }

    fn set_status(&self, status: ContainerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Take the construction lock. The lock is not reentrant: user code
    /// running under it (a constructor, a field setter, a post-init hook)
    /// that calls back into this container gets an error instead of a
    /// deadlock.
    fn lock(&self) -> Result<ConstructionGuard<'_>> {
        let current = thread::current().id();
        if *self.holder.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            #[cfg(feature = "logging")]
            error!(
                target: "component_injector",
                owner = self.owner.as_str(),
                "Container re-entered while constructing"
            );
            return Err(DiError::Reentrant {
                owner: self.owner.clone(),
            });
        }

        let lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);
        Ok(ConstructionGuard {
            holder: &self.holder,
            _lock: lock,
        })
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Arc<TypeDescriptor>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn managed(&self) -> &[Arc<TypeDescriptor>] {
        self.managed.get().map_or(&[], |m| m.ordered.as_slice())
    }

    fn describe(&self, key: TypeKey) -> Option<Arc<TypeDescriptor>> {
        self.managed.get().and_then(|m| m.by_key.get(&key).cloned())
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Bootstrap the container from its entry point.
    ///
    /// Registers `entry`, scans the entry point's scope, builds every managed
    /// type found, then fills the entry point's fields and runs its post-init
    /// hook. On failure the container moves to `Failed` for good.
    pub fn initialize<T: Component>(&self, entry: T) -> Result<()> {
        self.initialize_arc(Arc::new(entry))
    }

    /// [`Container::initialize`] for an entry point that is already shared
    pub fn initialize_arc<T: Component>(&self, entry: Arc<T>) -> Result<()> {
        self.bootstrap(Arc::new(T::descriptor()), entry)
    }

    /// Type-erased bootstrap. `entry` must be an `Arc` of the described type.
    pub fn bootstrap(&self, descriptor: Arc<TypeDescriptor>, entry: Instance) -> Result<()> {
        let _guard = self.lock()?;

        if self.status() != ContainerStatus::Initializing {
            #[cfg(feature = "logging")]
            warn!(
                target: "component_injector",
                owner = self.owner.as_str(),
                "Container already initialized"
            );
            return Err(DiError::AlreadyInitialized {
                owner: self.owner.clone(),
            });
        }

        if !descriptor.is_entry_point() {
            return Err(DiError::NoEntryPoint {
                type_name: descriptor.type_name(),
            });
        }

        if descriptor.view(&entry, descriptor.key()).is_none() {
            return Err(DiError::Internal(format!(
                "bootstrap instance is not a {}",
                descriptor.type_name()
            )));
        }

        #[cfg(feature = "logging")]
        info!(
            target: "component_injector",
            owner = self.owner.as_str(),
            entry_point = descriptor.type_name(),
            "Starting container initialization"
        );

        match self.run_bootstrap(&descriptor, entry) {
            Ok(()) => {
                self.set_status(ContainerStatus::Running);

                #[cfg(feature = "logging")]
                info!(
                    target: "component_injector",
                    owner = self.owner.as_str(),
                    instances = self.registry.len(),
                    "Container initialized"
                );

                Ok(())
            }
            Err(err) => {
                self.set_status(ContainerStatus::Failed);

                #[cfg(feature = "logging")]
                {
                    error!(
                        target: "component_injector",
                        owner = self.owner.as_str(),
                        error = %err,
                        "Container initialization failed"
                    );
                    if let Some(cycle) = err.cycle() {
                        error!(target: "component_injector", "{}", cycle.diagram());
                    }
                }

                Err(err)
            }
        }
    }

    fn run_bootstrap(&self, descriptor: &Arc<TypeDescriptor>, entry: Instance) -> Result<()> {
        let entry = self.registry.register(descriptor, entry, None);

        let scope = descriptor.scan_scope();

        #[cfg(feature = "logging")]
        debug!(
            target: "component_injector",
            owner = self.owner.as_str(),
            scope = scope,
            "Scanning for managed types"
        );

        let managed = ManagedTypes::new(self.scanner.scan(scope));
        self.queue().extend(
            managed
                .ordered
                .iter()
                .filter(|d| d.is_concrete())
                .cloned(),
        );

        #[cfg(feature = "logging")]
        debug!(
            target: "component_injector",
            owner = self.owner.as_str(),
            managed = managed.ordered.len(),
            "Managed types discovered"
        );

        // Status guards bootstrap, so the cell is always empty here
        let _ = self.managed.set(managed);

        loop {
            let next = self.queue().pop_front();
            let Some(descriptor) = next else { break };

            let mut path = DependencyPath::default();
            if let Err(err) = self.resolve_locked(descriptor.key(), None, &mut path) {
                self.queue().clear();
                return Err(err);
            }
        }

        self.inject_fields(&entry, &mut DependencyPath::default())?;
        self.run_post_init(&entry)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn ensure_usable(&self) -> Result<()> {
        match self.status() {
            ContainerStatus::Failed => Err(DiError::not_initialized(&self.owner, NotReady::Failed)),
            _ => Ok(()),
        }
    }

    /// Resolve the singleton for `T`.
    ///
    /// `T` may be a concrete managed type or an abstraction (typically
    /// `dyn Trait`) provided by exactly one managed type.
    ///
    /// Built singletons are returned without locking. Anything else is
    /// built under the construction lock, which is not reentrant: calling
    /// this from a constructor or post-init hook of the same container
    /// fails with [`DiError::Reentrant`] unless the instance already exists.
    #[inline]
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_typed(None)
    }

    /// Resolve the singleton for `T` carrying `identifier`
    #[inline]
    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, identifier: &str) -> Result<Arc<T>> {
        self.resolve_typed(Some(identifier))
    }

    /// Every managed instance assignable to `T`, in scan order. Building
    /// any missing ones first.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<All<T>> {
        let views = self.resolve_all_key(TypeKey::of::<T>())?;
        views
            .into_iter()
            .map(|view| downcast_view::<T>(view).ok_or_else(|| mismatch(TypeKey::of::<T>())))
            .collect::<Result<Vec<_>>>()
            .map(All::new)
    }

    fn resolve_typed<T: ?Sized + Send + Sync + 'static>(&self, identifier: Option<&str>) -> Result<Arc<T>> {
        let target = TypeKey::of::<T>();
        let view = self.resolve_key(target, identifier)?;
        downcast_view::<T>(view).ok_or_else(|| mismatch(target))
    }

    /// Type-erased resolve. Returns the view of the instance for `target`.
    pub fn resolve_key(&self, target: TypeKey, identifier: Option<&str>) -> Result<Instance> {
        self.ensure_usable()?;
        let record = self.resolve_record(target, identifier)?;
        view_of(&record, target)
    }

    /// Type-erased resolve-all. Returns views for `element`.
    pub fn resolve_all_key(&self, element: TypeKey) -> Result<Vec<Instance>> {
        self.ensure_usable()?;

        let candidates = self.candidates(element);
        let mut records: Vec<Record> = Vec::with_capacity(candidates.len());
        for descriptor in candidates {
            let record = self.resolve_record(descriptor.key(), None)?;
            if !records.iter().any(|seen| seen.same_instance(&record)) {
                records.push(record);
            }
        }

        #[cfg(feature = "logging")]
        if records.is_empty() {
            warn!(
                target: "component_injector",
                owner = self.owner.as_str(),
                element = element.name(),
                "No managed instances for collection"
            );
        }

        records.iter().map(|record| view_of(record, element)).collect()
    }

    /// Registry first, then construction under the lock
    fn resolve_record(&self, target: TypeKey, identifier: Option<&str>) -> Result<Record> {
        if let Some(record) = self.registry.find(target, identifier)? {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_injector",
                component = target.name(),
                location = "registry",
                "Resolved without locking"
            );
            return Ok(record);
        }

        let _guard = self.lock()?;
        let mut path = DependencyPath::default();
        self.resolve_locked(target, identifier, &mut path)
    }

    // =========================================================================
    // Resolution under the construction lock
    // =========================================================================

    fn resolve_locked(
        &self,
        target: TypeKey,
        identifier: Option<&str>,
        path: &mut DependencyPath,
    ) -> Result<Record> {
        if let Some(record) = self.registry.find(target, identifier)? {
            return Ok(record);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "component_injector",
            component = target.name(),
            identifier = identifier,
            depth = path.depth(),
            "Resolving"
        );

        match self.describe(target) {
            Some(descriptor) if descriptor.is_concrete() => {
                if !(descriptor.is_managed() || descriptor.is_entry_point()) {
                    return Err(DiError::Unmanaged {
                        type_name: target.name(),
                    });
                }
                if let Some(requested) = identifier {
                    if descriptor.identifier() != Some(requested) {
                        return Err(DiError::NoImplementation {
                            type_name: target.name(),
                            identifier: Some(requested.to_owned()),
                        });
                    }
                }
                self.construct(&descriptor, path)
            }
            described => {
                let is_abstraction = described.is_some()
                    || target.is_trait_object()
                    || self.managed().iter().any(|d| d.is_concrete() && d.is_assignable_to(target));
                if !is_abstraction {
                    return Err(DiError::Unmanaged {
                        type_name: target.name(),
                    });
                }

                let implementation = self.implementation_for(target, identifier)?;

                #[cfg(feature = "logging")]
                trace!(
                    target: "component_injector",
                    abstraction = target.name(),
                    implementation = implementation.type_name(),
                    "Selected implementation"
                );

                self.resolve_locked(implementation.key(), identifier, path)
            }
        }
    }

    /// Managed concrete types assignable to `target`, in scan order
    fn candidates(&self, target: TypeKey) -> Vec<Arc<TypeDescriptor>> {
        self.managed()
            .iter()
            .filter(|d| d.is_concrete() && d.is_assignable_to(target))
            .cloned()
            .collect()
    }

    fn implementation_for(&self, target: TypeKey, identifier: Option<&str>) -> Result<Arc<TypeDescriptor>> {
        let mut matching: Vec<_> = self
            .candidates(target)
            .into_iter()
            .filter(|d| identifier.is_none_or(|id| d.identifier() == Some(id)))
            .collect();

        match matching.len() {
            0 => Err(DiError::NoImplementation {
                type_name: target.name(),
                identifier: identifier.map(str::to_owned),
            }),
            1 => Ok(matching.remove(0)),
            _ => Err(DiError::Ambiguous {
                type_name: target.name(),
                identifier: identifier.map(str::to_owned),
                candidates: matching.iter().map(|d| d.type_name()).collect(),
            }),
        }
    }

    fn construct(&self, descriptor: &Arc<TypeDescriptor>, path: &mut DependencyPath) -> Result<Record> {
        let key = descriptor.key();
        if path.contains(key) {
            let cycle = path.cycle_with(key);

            #[cfg(feature = "logging")]
            error!(
                target: "component_injector",
                cycle = %cycle,
                "Circular dependency detected"
            );

            return Err(DiError::CircularDependency { path: cycle });
        }

        path.push(key);
        let built = self.build(descriptor, path);
        path.pop();
        built
    }

    fn build(&self, descriptor: &Arc<TypeDescriptor>, path: &mut DependencyPath) -> Result<Record> {
        let key = descriptor.key();
        let constructor = select_constructor(key, descriptor.constructors())?;

        let arguments = constructor
            .params()
            .iter()
            .map(|requirement| self.satisfy(requirement, path))
            .collect::<Result<Vec<_>>>()?;

        let instance = constructor.invoke(key, arguments)?;
        let record = self.registry.register(descriptor, instance, None);

        #[cfg(feature = "logging")]
        debug!(
            target: "component_injector",
            component = descriptor.type_name(),
            identifier = record.identifier(),
            depth = path.depth(),
            "Constructed singleton"
        );

        self.inject_fields(&record, path)?;
        self.run_post_init(&record)?;
        Ok(record)
    }

    fn satisfy(&self, requirement: &Requirement, path: &mut DependencyPath) -> Result<Resolved> {
        let target = requirement.target();
        if requirement.is_collection() {
            let mut records: Vec<Record> = Vec::new();
            for descriptor in self.candidates(target) {
                let record = self.resolve_locked(descriptor.key(), None, path)?;
                if !records.iter().any(|seen| seen.same_instance(&record)) {
                    records.push(record);
                }
            }
            let views = records
                .iter()
                .map(|record| view_of(record, target))
                .collect::<Result<Vec<_>>>()?;
            Ok(Resolved::All(views))
        } else {
            let record = self.resolve_locked(target, requirement.identifier(), path)?;
            view_of(&record, target).map(Resolved::Single)
        }
    }

    fn inject_fields(&self, record: &Record, path: &mut DependencyPath) -> Result<()> {
        let descriptor = record.descriptor();
        for field in descriptor.fields() {
            let value = self.satisfy(&field.requirement(), path)?;
            field
                .assign(record.instance(), value)
                .map_err(|source| DiError::creation_failed(descriptor.type_name(), source))?;

            #[cfg(feature = "logging")]
            trace!(
                target: "component_injector",
                component = descriptor.type_name(),
                field = field.name(),
                "Injected field"
            );
        }
        Ok(())
    }

    fn run_post_init(&self, record: &Record) -> Result<()> {
        let descriptor = record.descriptor();
        let Some(hook) = select_post_init(descriptor.key(), descriptor.post_init_hooks())? else {
            return Ok(());
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "component_injector",
            component = descriptor.type_name(),
            hook = hook.name(),
            "Running post-init hook"
        );

        hook.invoke(descriptor.key(), record.instance())
    }
}

fn view_of(record: &Record, target: TypeKey) -> Result<Instance> {
    record.view(target).ok_or_else(|| mismatch(target))
}

fn mismatch(target: TypeKey) -> DiError {
    DiError::Internal(format!("resolved instance cannot be viewed as {}", target.name()))
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("owner", &self.owner)
            .field("status", &self.status())
            .field("instances", &self.registry.len())
            .field("managed", &self.managed().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::Injected;
    use crate::scanner::Catalog;
    use crate::{BoxError, Constructor};
    use std::sync::atomic::AtomicUsize;

    const NS: &str = "tests::app";

    fn container_with(catalog: Catalog) -> Container {
        Container::new("test", Arc::new(catalog))
    }

    // -- entry point -----------------------------------------------------

    #[derive(Default)]
    struct Main;

    impl Component for Main {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::entry_point::<Main>().namespace(NS).build()
        }
    }

    // -- simple chain ----------------------------------------------------

    #[derive(Default)]
    struct ServiceB;

    impl Component for ServiceB {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<ServiceB>()
                .namespace(NS)
                .default_constructor()
                .build()
        }
    }

    struct ServiceA {
        b: Arc<ServiceB>,
    }

    impl Component for ServiceA {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<ServiceA>()
                .namespace(NS)
                .constructor(Constructor::injectable().param::<Arc<ServiceB>>(), |args| {
                    Ok(ServiceA { b: args.take()? })
                })
                .build()
        }
    }

    #[test]
    fn test_bootstrap_builds_dependency_chain() {
        let container = container_with(Catalog::new().with::<ServiceA>().with::<ServiceB>());
        assert_eq!(container.status(), ContainerStatus::Initializing);

        container.initialize(Main).unwrap();
        assert_eq!(container.status(), ContainerStatus::Running);
        assert_eq!(container.instance_count(), 3);
        assert!(container.contains::<ServiceA>());

        let a = container.resolve::<ServiceA>().unwrap();
        let b = container.resolve::<ServiceB>().unwrap();
        assert!(Arc::ptr_eq(&a.b, &b));
        assert!(Arc::ptr_eq(&a, &container.resolve::<ServiceA>().unwrap()));
    }

    #[test]
    fn test_entry_point_resolvable() {
        let container = container_with(Catalog::new());
        let main = Arc::new(Main);
        container.initialize_arc(Arc::clone(&main)).unwrap();

        assert!(Arc::ptr_eq(&main, &container.resolve::<Main>().unwrap()));
    }

    #[test]
    fn test_lifecycle_errors() {
        let container = container_with(Catalog::new());

        let err = container.initialize(ServiceB).unwrap_err();
        assert!(matches!(err, DiError::NoEntryPoint { .. }));
        assert_eq!(container.status(), ContainerStatus::Initializing);

        container.initialize(Main).unwrap();
        let err = container.initialize(Main).unwrap_err();
        assert!(matches!(err, DiError::AlreadyInitialized { .. }));
        assert_eq!(container.status(), ContainerStatus::Running);
    }

    #[test]
    fn test_unmanaged_type() {
        let container = container_with(Catalog::new());
        container.initialize(Main).unwrap();

        assert!(matches!(
            container.resolve::<String>(),
            Err(DiError::Unmanaged { .. })
        ));
    }

    // -- abstractions and identifiers -------------------------------------

    trait Storage: Send + Sync {
        fn kind(&self) -> &'static str;
    }

    #[derive(Default)]
    struct DatabaseStorage;

    impl Storage for DatabaseStorage {
        fn kind(&self) -> &'static str {
            "database"
        }
    }

    impl Component for DatabaseStorage {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<DatabaseStorage>()
                .namespace(NS)
                .identifier("database")
                .provides(|it: Arc<DatabaseStorage>| -> Arc<dyn Storage> { it })
                .default_constructor()
                .build()
        }
    }

    #[derive(Default)]
    struct FileStorage;

    impl Storage for FileStorage {
        fn kind(&self) -> &'static str {
            "file"
        }
    }

    impl Component for FileStorage {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<FileStorage>()
                .namespace(NS)
                .identifier("file")
                .provides(|it: Arc<FileStorage>| -> Arc<dyn Storage> { it })
                .default_constructor()
                .build()
        }
    }

    struct Backup {
        primary: Arc<dyn Storage>,
    }

    impl Component for Backup {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<Backup>()
                .namespace(NS)
                .constructor(
                    Constructor::injectable().param_named::<Arc<dyn Storage>>("file"),
                    |args| Ok(Backup { primary: args.take()? }),
                )
                .build()
        }
    }

    fn storages() -> Catalog {
        Catalog::new()
            .with::<DatabaseStorage>()
            .with::<FileStorage>()
            .with::<Backup>()
    }

    #[test]
    fn test_identifier_selects_implementation() {
        let container = container_with(storages());
        container.initialize(Main).unwrap();

        let backup = container.resolve::<Backup>().unwrap();
        assert_eq!(backup.primary.kind(), "file");

        let db = container.resolve_named::<dyn Storage>("database").unwrap();
        assert_eq!(db.kind(), "database");

        let concrete = container.resolve::<DatabaseStorage>().unwrap();
        let erased: Arc<dyn Storage> = concrete;
        assert!(std::ptr::addr_eq(Arc::as_ptr(&erased), Arc::as_ptr(&db)));
    }

    #[test]
    fn test_ambiguous_without_identifier() {
        let container = container_with(storages());
        container.initialize(Main).unwrap();

        let err = container.resolve::<dyn Storage>().err().unwrap();
        assert!(matches!(err, DiError::Ambiguous { ref candidates, .. } if candidates.len() == 2));

        let err = container.resolve_named::<dyn Storage>("tape").err().unwrap();
        assert!(matches!(err, DiError::NoImplementation { .. }));
    }

    #[test]
    fn test_ambiguous_during_bootstrap_fails_container() {
        struct NeedsStorage;

        impl Component for NeedsStorage {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::component::<NeedsStorage>()
                    .namespace(NS)
                    .constructor(Constructor::injectable().param::<Arc<dyn Storage>>(), |args| {
                        let _: Arc<dyn Storage> = args.take()?;
                        Ok(NeedsStorage)
                    })
                    .build()
            }
        }

        let container = container_with(storages().with::<NeedsStorage>());
        let err = container.initialize(Main).unwrap_err();
        assert!(matches!(err, DiError::Ambiguous { .. }));
        assert_eq!(container.status(), ContainerStatus::Failed);
    }

    #[test]
    fn test_wrong_identifier_on_concrete_type() {
        let container = container_with(storages());
        container.initialize(Main).unwrap();

        assert!(container.resolve_named::<FileStorage>("file").is_ok());
        // built already, so the registry answers with nothing under that name
        // and the resolver refuses to build a second one
        assert!(matches!(
            container.resolve_named::<FileStorage>("database"),
            Err(DiError::NoImplementation { .. })
        ));
    }

    #[test]
    fn test_abstraction_without_implementations() {
        trait Orphan: Send + Sync {}

        // described and inside the scanned scope
        let catalog = Catalog::new();
        catalog.register(TypeDescriptor::abstraction::<dyn Orphan>().with_namespace(NS));
        assert_eq!(catalog.scan(NS).len(), 1);
        let container = container_with(catalog);
        container.initialize(Main).unwrap();

        assert!(matches!(
            container.resolve::<dyn Orphan>(),
            Err(DiError::NoImplementation { .. })
        ));

        // described under its own module path, outside the scanned scope
        let catalog = Catalog::new();
        catalog.register(TypeDescriptor::abstraction::<dyn Orphan>());
        assert!(catalog.scan(NS).is_empty());
        let container = container_with(catalog);
        container.initialize(Main).unwrap();

        assert!(matches!(
            container.resolve::<dyn Orphan>(),
            Err(DiError::NoImplementation { .. })
        ));
        assert_eq!(container.status(), ContainerStatus::Running);
    }

    #[test]
    fn test_undescribed_trait_object_has_no_implementation() {
        trait Unprovided: Send + Sync {}

        let container = container_with(Catalog::new());
        container.initialize(Main).unwrap();

        assert!(matches!(
            container.resolve::<dyn Unprovided>(),
            Err(DiError::NoImplementation { identifier: None, .. })
        ));
        assert!(matches!(
            container.resolve_named::<dyn Unprovided>("any"),
            Err(DiError::NoImplementation { identifier: Some(_), .. })
        ));
        // concrete types nobody manages stay unmanaged
        assert!(matches!(
            container.resolve::<String>(),
            Err(DiError::Unmanaged { .. })
        ));
    }

    #[test]
    fn test_resolve_all_in_scan_order() {
        let container = container_with(storages());
        container.initialize(Main).unwrap();

        let all = container.resolve_all::<dyn Storage>().unwrap();
        let kinds: Vec<_> = all.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, ["database", "file"]);

        let none = container.resolve_all::<dyn Fn() + Send + Sync>().unwrap();
        assert!(none.is_empty());
    }

    // -- cycles ------------------------------------------------------------

    struct CycleA;
    struct CycleB;

    impl Component for CycleA {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<CycleA>()
                .namespace(NS)
                .constructor(Constructor::injectable().param::<Arc<CycleB>>(), |args| {
                    let _: Arc<CycleB> = args.take()?;
                    Ok(CycleA)
                })
                .build()
        }
    }

    impl Component for CycleB {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<CycleB>()
                .namespace(NS)
                .constructor(Constructor::injectable().param::<Arc<CycleA>>(), |args| {
                    let _: Arc<CycleA> = args.take()?;
                    Ok(CycleB)
                })
                .build()
        }
    }

    #[test]
    fn test_constructor_cycle_detected() {
        let container = container_with(Catalog::new().with::<CycleA>().with::<CycleB>());
        let err = container.initialize(Main).unwrap_err();

        let cycle = err.cycle().expect("cycle error");
        assert_eq!(cycle.short_names(), ["CycleA", "CycleB", "CycleA"]);
        assert!(cycle.diagram().contains("CycleA -> CycleB -> CycleA"));
        assert_eq!(container.status(), ContainerStatus::Failed);

        assert!(matches!(
            container.resolve::<CycleA>(),
            Err(DiError::NotInitialized { reason: NotReady::Failed, .. })
        ));
    }

    #[allow(dead_code)]
    struct LoopRoot;
    #[allow(dead_code)]
    struct LoopA;
    #[allow(dead_code)]
    struct LoopB;
    #[allow(dead_code)]
    struct LoopC;

    fn depends_on<T, D>() -> TypeDescriptor
    where
        T: Send + Sync + 'static,
        D: Send + Sync + 'static,
    {
        // T is never built: every chain below ends in the loop
        TypeDescriptor::component::<T>()
            .namespace("tests::ring")
            .constructor(Constructor::injectable().param::<Arc<D>>(), |args| {
                let _: Arc<D> = args.take()?;
                Err::<T, BoxError>("unreachable".into())
            })
            .build()
    }

    #[test]
    fn test_longer_cycle_keeps_visitation_order() {
        struct RingMain;

        impl Component for RingMain {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::entry_point::<RingMain>().namespace("tests::ring").build()
            }
        }

        // LoopRoot -> LoopA -> LoopB -> LoopC -> LoopA
        let catalog = Catalog::new();
        catalog
            .register(depends_on::<LoopRoot, LoopA>())
            .register(depends_on::<LoopA, LoopB>())
            .register(depends_on::<LoopB, LoopC>())
            .register(depends_on::<LoopC, LoopA>());
        let container = container_with(catalog);

        let err = container.initialize(RingMain).unwrap_err();
        let cycle = err.cycle().expect("cycle error");
        assert_eq!(
            cycle.short_names(),
            ["LoopRoot", "LoopA", "LoopB", "LoopC", "LoopA"]
        );
        assert_eq!(err.to_string(), "Circular dependency detected: LoopRoot -> LoopA -> LoopB -> LoopC -> LoopA");
        assert_eq!(container.status(), ContainerStatus::Failed);

        // the lead-in sits above the box, the loop members inside it, once each
        let diagram = cycle.diagram();
        let root = diagram.find("LoopRoot\n").unwrap();
        let top = diagram.find('┌').unwrap();
        assert!(root < top);

        let boxed: Vec<&str> = diagram
            .lines()
            .map(|line| line.trim_start_matches('\t'))
            .filter(|line| line.starts_with('│'))
            .map(|line| line.trim_start_matches('│').trim())
            .filter(|cell| !matches!(*cell, "X" | "↓"))
            .collect();
        assert_eq!(boxed, ["LoopA", "LoopB", "LoopC"]);
    }

    #[test]
    fn test_field_injection_breaks_constructor_cycle() {
        struct Parent {
            child: Injected<Arc<Child>>,
        }
        struct Child {
            parent: Arc<Parent>,
        }

        impl Component for Parent {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::component::<Parent>()
                    .namespace(NS)
                    .constructor(Constructor::plain(), |_| {
                        Ok(Parent {
                            child: Injected::new(),
                        })
                    })
                    .field("child", None, |it: &Parent| &it.child)
                    .build()
            }
        }

        impl Component for Child {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::component::<Child>()
                    .namespace(NS)
                    .constructor(Constructor::injectable().param::<Arc<Parent>>(), |args| {
                        Ok(Child { parent: args.take()? })
                    })
                    .build()
            }
        }

        let container = container_with(Catalog::new().with::<Parent>().with::<Child>());
        container.initialize(Main).unwrap();

        let parent = container.resolve::<Parent>().unwrap();
        let child = container.resolve::<Child>().unwrap();
        assert!(Arc::ptr_eq(&*parent.child, &child));
        assert!(Arc::ptr_eq(&child.parent, &parent));
    }

    // -- fields, collections and entry points ------------------------------

    trait Plugin: Send + Sync {
        fn name(&self) -> &'static str;
    }

    #[derive(Default)]
    struct AlphaPlugin;

    impl Plugin for AlphaPlugin {
        fn name(&self) -> &'static str {
            "alpha"
        }
    }

    impl Component for AlphaPlugin {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<AlphaPlugin>()
                .namespace(NS)
                .provides(|it: Arc<AlphaPlugin>| -> Arc<dyn Plugin> { it })
                .default_constructor()
                .build()
        }
    }

    #[derive(Default)]
    struct BetaPlugin;

    impl Plugin for BetaPlugin {
        fn name(&self) -> &'static str {
            "beta"
        }
    }

    impl Component for BetaPlugin {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<BetaPlugin>()
                .namespace(NS)
                .provides(|it: Arc<BetaPlugin>| -> Arc<dyn Plugin> { it })
                .default_constructor()
                .build()
        }
    }

    struct PluginManager {
        by_constructor: All<dyn Plugin>,
        by_field: Injected<All<dyn Plugin>>,
        storage: Injected<Arc<dyn Storage>>,
    }

    impl Component for PluginManager {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<PluginManager>()
                .namespace(NS)
                .constructor(Constructor::injectable().param::<All<dyn Plugin>>(), |args| {
                    Ok(PluginManager {
                        by_constructor: args.take()?,
                        by_field: Injected::new(),
                        storage: Injected::new(),
                    })
                })
                .field("by_field", None, |it: &PluginManager| &it.by_field)
                .field("storage", Some("database"), |it: &PluginManager| &it.storage)
                .build()
        }
    }

    #[test]
    fn test_collections_by_constructor_and_field() {
        let catalog = storages()
            .with::<PluginManager>()
            .with::<AlphaPlugin>()
            .with::<BetaPlugin>();
        let container = container_with(catalog);
        container.initialize(Main).unwrap();

        let manager = container.resolve::<PluginManager>().unwrap();
        let names: Vec<_> = manager.by_constructor.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(manager.by_field.len(), 2);
        assert_eq!(manager.storage.kind(), "database");

        let alpha = container.resolve::<AlphaPlugin>().unwrap();
        let alpha: Arc<dyn Plugin> = alpha;
        assert!(std::ptr::addr_eq(
            Arc::as_ptr(&alpha),
            Arc::as_ptr(manager.by_constructor.first().unwrap())
        ));
    }

    struct EntryWithHooks {
        b: Injected<Arc<ServiceB>>,
        ready: AtomicUsize,
    }

    impl Component for EntryWithHooks {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::entry_point::<EntryWithHooks>()
                .namespace(NS)
                .field("b", None, |it: &EntryWithHooks| &it.b)
                .post_init("on_ready", |it: &EntryWithHooks| {
                    assert!(it.b.is_injected());
                    it.ready.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
        }
    }

    struct DependsOnEntry {
        entry: Arc<EntryWithHooks>,
    }

    impl Component for DependsOnEntry {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<DependsOnEntry>()
                .namespace(NS)
                .constructor(Constructor::injectable().param::<Arc<EntryWithHooks>>(), |args| {
                    Ok(DependsOnEntry { entry: args.take()? })
                })
                .build()
        }
    }

    #[test]
    fn test_entry_point_fields_and_post_init() {
        let container = container_with(Catalog::new().with::<ServiceB>().with::<DependsOnEntry>());
        let entry = Arc::new(EntryWithHooks {
            b: Injected::new(),
            ready: AtomicUsize::new(0),
        });
        container.initialize_arc(Arc::clone(&entry)).unwrap();

        assert_eq!(entry.ready.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&*entry.b, &container.resolve::<ServiceB>().unwrap()));

        let dependent = container.resolve::<DependsOnEntry>().unwrap();
        assert!(Arc::ptr_eq(&dependent.entry, &entry));
    }

    // -- failures ------------------------------------------------------------

    static FAILING_HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct FailingPostInit;

    impl Component for FailingPostInit {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::component::<FailingPostInit>()
                .namespace(NS)
                .default_constructor()
                .post_init("start", |_: &FailingPostInit| {
                    FAILING_HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
                    Err("refused to start".into())
                })
                .build()
        }
    }

    #[test]
    fn test_failing_post_init_fails_container() {
        let container = container_with(Catalog::new().with::<ServiceB>().with::<FailingPostInit>());
        let err = container.initialize(Main).unwrap_err();

        assert!(matches!(err, DiError::PostInitFailed { hook: "start", .. }));
        assert_eq!(container.status(), ContainerStatus::Failed);
        assert!(FAILING_HOOK_CALLS.load(Ordering::SeqCst) >= 1);

        assert!(matches!(
            container.resolve::<ServiceB>(),
            Err(DiError::NotInitialized { reason: NotReady::Failed, .. })
        ));
        assert!(matches!(
            container.initialize(Main),
            Err(DiError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn test_post_init_validation() {
        #[derive(Default)]
        struct TwoHooks;
        #[derive(Default)]
        struct HookWithParams;

        let catalog = Catalog::new();
        catalog.register(
            TypeDescriptor::component::<TwoHooks>()
                .namespace(NS)
                .default_constructor()
                .post_init("first", |_: &TwoHooks| Ok(()))
                .post_init("second", |_: &TwoHooks| Ok(()))
                .build(),
        );
        let container = container_with(catalog);
        assert!(matches!(
            container.initialize(Main),
            Err(DiError::MultiplePostInit { .. })
        ));

        let catalog = Catalog::new();
        catalog.register(
            TypeDescriptor::component::<HookWithParams>()
                .namespace(NS)
                .default_constructor()
                .post_init_with_parameters("setup", vec![TypeKey::of::<String>()], |_: &HookWithParams| Ok(()))
                .build(),
        );
        let container = container_with(catalog);
        assert!(matches!(
            container.initialize(Main),
            Err(DiError::PostInitHasParameters { count: 1, .. })
        ));
    }

    #[test]
    fn test_constructor_selection_errors() {
        struct TwoMarked;
        struct NoFallback;

        let catalog = Catalog::new();
        catalog.register(
            TypeDescriptor::component::<TwoMarked>()
                .namespace(NS)
                .constructor(Constructor::injectable(), |_| Ok(TwoMarked))
                .constructor(Constructor::injectable(), |_| Ok(TwoMarked))
                .build(),
        );
        let container = container_with(catalog);
        assert!(matches!(
            container.initialize(Main),
            Err(DiError::AmbiguousConstructor { count: 2, .. })
        ));

        let catalog = Catalog::new();
        catalog.register(
            TypeDescriptor::component::<NoFallback>()
                .namespace(NS)
                .constructor(Constructor::plain().param::<Arc<ServiceB>>(), |_| Ok(NoFallback))
                .build(),
        );
        let container = container_with(catalog);
        assert!(matches!(
            container.initialize(Main),
            Err(DiError::NoUsableConstructor { .. })
        ));
    }

    #[test]
    fn test_constructor_failures() {
        struct Failing;
        struct Panicking;

        let catalog = Catalog::new();
        catalog.register(
            TypeDescriptor::component::<Failing>()
                .namespace(NS)
                .constructor(Constructor::plain(), |_| -> std::result::Result<Failing, BoxError> {
                    Err("no connection".into())
                })
                .build(),
        );
        let container = container_with(catalog);
        let err = container.initialize(Main).unwrap_err();
        assert!(matches!(err, DiError::CreationFailed { .. }));
        assert!(err.to_string().contains("no connection"));

        let catalog = Catalog::new();
        catalog.register(
            TypeDescriptor::component::<Panicking>()
                .namespace(NS)
                .constructor(Constructor::plain(), |_| -> std::result::Result<Panicking, BoxError> {
                    panic!("bad config")
                })
                .build(),
        );
        let container = container_with(catalog);
        let err = container.initialize(Main).unwrap_err();
        assert!(err.to_string().contains("bad config"));
        assert_eq!(container.status(), ContainerStatus::Failed);
    }

    #[test]
    fn test_failed_query_keeps_container_running() {
        // Outside the scan scope, so only reachable lazily
        struct Outside;

        let catalog = Catalog::new().with::<ServiceB>();
        catalog.register(
            TypeDescriptor::component::<Outside>()
                .namespace("elsewhere")
                .constructor(Constructor::plain(), |_| Ok(Outside))
                .build(),
        );
        let container = container_with(catalog);
        container.initialize(Main).unwrap();

        assert!(matches!(
            container.resolve::<Outside>(),
            Err(DiError::Unmanaged { .. })
        ));
        assert_eq!(container.status(), ContainerStatus::Running);
    }

    #[test]
    fn test_reentrant_resolution_is_an_error() {
        struct CallsBack;

        let shared: Arc<OnceCell<Arc<Container>>> = Arc::new(OnceCell::new());
        let outcome: Arc<OnceCell<(bool, bool)>> = Arc::new(OnceCell::new());

        let (slot, seen) = (Arc::clone(&shared), Arc::clone(&outcome));
        let catalog = Catalog::new().with::<ServiceB>();
        catalog.register(
            TypeDescriptor::component::<CallsBack>()
                .namespace(NS)
                .constructor(Constructor::plain(), |_| Ok(CallsBack))
                .post_init("call_back", move |_: &CallsBack| {
                    let container = slot.get().ok_or("container not shared yet")?;
                    // ServiceB is built already, String would need the lock
                    let _ = seen.set((
                        container.resolve::<ServiceB>().is_ok(),
                        matches!(container.resolve::<String>(), Err(DiError::Reentrant { .. })),
                    ));
                    Ok(())
                })
                .build(),
        );

        let container = Arc::new(container_with(catalog));
        let _ = shared.set(Arc::clone(&container));
        container.initialize(Main).unwrap();

        assert_eq!(outcome.get(), Some(&(true, true)));
        // the lock was released with its holder
        assert!(matches!(
            container.resolve::<String>(),
            Err(DiError::Unmanaged { .. })
        ));
    }

    // -- concurrency ---------------------------------------------------------

    #[test]
    fn test_concurrent_resolution_yields_one_instance() {
        let container = Arc::new(container_with(Catalog::new().with::<ServiceA>().with::<ServiceB>()));
        container.initialize(Main).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = Arc::clone(&container);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| container.resolve::<ServiceA>().unwrap())
                        .last()
                        .unwrap()
                })
            })
            .collect();

        let first = container.resolve::<ServiceA>().unwrap();
        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.join().unwrap()));
        }
    }

    #[test]
    fn test_dependency_path_cycle_payload() {
        let mut path = DependencyPath::default();
        path.push(TypeKey::of::<ServiceA>());
        path.push(TypeKey::of::<ServiceB>());
        assert!(path.contains(TypeKey::of::<ServiceA>()));
        assert_eq!(path.depth(), 2);

        let cycle = path.cycle_with(TypeKey::of::<ServiceA>());
        assert_eq!(cycle.short_names(), ["ServiceA", "ServiceB", "ServiceA"]);

        path.pop();
        assert!(!path.contains(TypeKey::of::<ServiceB>()));
    }
}
