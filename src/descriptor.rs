//! Type descriptors
//!
//! A [`TypeDescriptor`] is the metadata the container needs to manage a type:
//! its markers, which abstractions it can be viewed as, how to build it, which
//! fields to fill after construction, and which hook to run once it is ready.
//! Descriptors are normally produced by `#[derive(Component)]`, but the
//! builder API below is public and works without the derive feature.

use crate::error::BoxError;
use crate::factory::{Constructor, ConstructorDescriptor, PostInitHook};
use crate::inject::{Injected, Resolvable, Resolved};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased managed instance.
///
/// Raw instances are an `Arc<T>` of the concrete type. Views handed out for
/// a requested type `X` are an `Arc<Arc<X>>` so that unsized targets such as
/// trait objects can travel through `dyn Any`.
pub type Instance = Arc<dyn Any + Send + Sync>;

type ViewFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;
type AssignFn = Arc<dyn Fn(&Instance, Resolved) -> Result<(), BoxError> + Send + Sync>;

// =============================================================================
// Type keys
// =============================================================================

/// Runtime identity of a (possibly unsized) type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path
    pub fn short_name(&self) -> &'static str {
        crate::error::short_name(self.name)
    }

    /// Whether the type is a trait object, and so can only be satisfied by
    /// a concrete type providing it
    #[inline]
    pub fn is_trait_object(&self) -> bool {
        self.name.starts_with("dyn ")
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// One dependency of a constructor parameter or injected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    target: TypeKey,
    identifier: Option<&'static str>,
    collection: bool,
}

impl Requirement {
    /// A single instance of `target`, optionally narrowed by identifier
    pub fn single(target: TypeKey, identifier: Option<&'static str>) -> Self {
        Self {
            target,
            identifier,
            collection: false,
        }
    }

    /// Every managed instance assignable to `element`
    pub fn collection(element: TypeKey) -> Self {
        Self {
            target: element,
            identifier: None,
            collection: true,
        }
    }

    #[inline]
    pub fn target(&self) -> TypeKey {
        self.target
    }

    #[inline]
    pub fn identifier(&self) -> Option<&'static str> {
        self.identifier
    }

    #[inline]
    pub fn is_collection(&self) -> bool {
        self.collection
    }
}

// =============================================================================
// Descriptors
// =============================================================================

struct View {
    target: TypeKey,
    cast: ViewFn,
}

/// A field filled by the container after construction.
pub struct FieldDescriptor {
    name: &'static str,
    requirement: Requirement,
    assign: AssignFn,
}

impl FieldDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    pub(crate) fn assign(&self, instance: &Instance, value: Resolved) -> Result<(), BoxError> {
        (self.assign)(instance, value)
    }
}

/// Metadata describing one type known to the container.
pub struct TypeDescriptor {
    key: TypeKey,
    managed: bool,
    entry_point: bool,
    is_abstract: bool,
    identifier: Option<&'static str>,
    namespace: &'static str,
    scope: Option<&'static str>,
    constructors: Vec<ConstructorDescriptor>,
    fields: Vec<FieldDescriptor>,
    post_init: Vec<PostInitHook>,
    views: Vec<View>,
}

impl TypeDescriptor {
    /// Start describing a managed type
    pub fn component<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new(true, false)
    }

    /// Start describing an entry-point type. Entry points are managed too.
    pub fn entry_point<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new(true, true)
    }

    /// Start describing a type the container knows about but must not build
    pub fn unmanaged<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new(false, false)
    }

    /// Describe an abstraction (usually a trait object type) that concrete
    /// components provide.
    pub fn abstraction<T: ?Sized + 'static>() -> Self {
        let key = TypeKey::of::<T>();
        Self {
            key,
            managed: true,
            entry_point: false,
            is_abstract: true,
            identifier: None,
            namespace: namespace_of(key.name),
            scope: None,
            constructors: Vec::new(),
            fields: Vec::new(),
            post_init: Vec::new(),
            views: Vec::new(),
        }
    }

    /// Move an abstraction into `namespace`, so scans of that scope find it.
    /// Defaults to the module path of the abstracted type.
    pub fn with_namespace(mut self, namespace: &'static str) -> Self {
        self.namespace = namespace;
        self
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.key.name
    }

    #[inline]
    pub fn is_managed(&self) -> bool {
        self.managed
    }

    #[inline]
    pub fn is_entry_point(&self) -> bool {
        self.entry_point
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    #[inline]
    pub fn is_concrete(&self) -> bool {
        !self.is_abstract
    }

    /// Declared identifier, if any
    #[inline]
    pub fn identifier(&self) -> Option<&'static str> {
        self.identifier
    }

    /// Module path the type lives in
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Scope a scan started from this type covers: the explicit override,
    /// otherwise the type's own namespace.
    pub fn scan_scope(&self) -> &'static str {
        self.scope.unwrap_or(self.namespace)
    }

    /// Whether the type's namespace equals `scope` or is nested below it.
    /// The empty scope covers everything.
    pub fn in_scope(&self, scope: &str) -> bool {
        scope.is_empty()
            || self.namespace == scope
            || (self.namespace.starts_with(scope) && self.namespace[scope.len()..].starts_with("::"))
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn post_init_hooks(&self) -> &[PostInitHook] {
        &self.post_init
    }

    /// Types this one can be viewed as, itself first.
    pub fn assignable_types(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.views.iter().map(|view| view.target)
    }

    /// Whether an instance of this type can be handed out as `target`
    #[inline]
    pub fn is_assignable_to(&self, target: TypeKey) -> bool {
        self.views.iter().any(|view| view.target == target)
    }

    /// View a raw instance of this type as `target`
    pub(crate) fn view(&self, instance: &Instance, target: TypeKey) -> Option<Instance> {
        self.views
            .iter()
            .find(|view| view.target == target)
            .and_then(|view| (view.cast)(instance))
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type", &self.key)
            .field("managed", &self.managed)
            .field("entry_point", &self.entry_point)
            .field("abstract", &self.is_abstract)
            .field("identifier", &self.identifier)
            .field("namespace", &self.namespace)
            .field("provides", &self.views.iter().map(|v| v.target).collect::<Vec<_>>())
            .field("constructors", &self.constructors.len())
            .field("fields", &self.fields.len())
            .field("post_init", &self.post_init.len())
            .finish()
    }
}

fn namespace_of(name: &'static str) -> &'static str {
    let name = name.strip_prefix("dyn ").unwrap_or(name);
    let head = name.find('<').unwrap_or(name.len());
    name[..head].rfind("::").map_or("", |i| &name[..i])
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for the descriptor of a concrete type `T`.
///
/// ```rust
/// use component_injector::{Constructor, TypeDescriptor};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// #[derive(Default)]
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".into()
///     }
/// }
///
/// let descriptor = TypeDescriptor::component::<English>()
///     .identifier("en")
///     .provides(|it: Arc<English>| -> Arc<dyn Greeter> { it })
///     .default_constructor()
///     .build();
///
/// assert_eq!(descriptor.identifier(), Some("en"));
/// ```
pub struct DescriptorBuilder<T> {
    descriptor: TypeDescriptor,
    marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    fn new(managed: bool, entry_point: bool) -> Self {
        let key = TypeKey::of::<T>();
        let itself = View {
            target: key,
            cast: Arc::new(|instance: &Instance| {
                let concrete = Arc::clone(instance).downcast::<T>().ok()?;
                Some(Arc::new(concrete) as Instance)
            }),
        };

        Self {
            descriptor: TypeDescriptor {
                key,
                managed,
                entry_point,
                is_abstract: false,
                identifier: None,
                namespace: namespace_of(key.name),
                scope: None,
                constructors: Vec::new(),
                fields: Vec::new(),
                post_init: Vec::new(),
                views: vec![itself],
            },
            marker: PhantomData,
        }
    }

    /// Name this type so it can be selected among other implementations
    pub fn identifier(mut self, identifier: &'static str) -> Self {
        self.descriptor.identifier = Some(identifier);
        self
    }

    /// Override the namespace derived from the type name.
    /// `#[derive(Component)]` passes `module_path!()` here.
    pub fn namespace(mut self, namespace: &'static str) -> Self {
        self.descriptor.namespace = namespace;
        self
    }

    /// Override the scan scope used when this type is an entry point
    pub fn scope(mut self, scope: &'static str) -> Self {
        self.descriptor.scope = Some(scope);
        self
    }

    /// Declare that `T` can be handed out as `I`
    pub fn provides<I>(mut self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let target = TypeKey::of::<I>();
        if !self.descriptor.is_assignable_to(target) {
            self.descriptor.views.push(View {
                target,
                cast: Arc::new(move |instance: &Instance| {
                    let concrete = Arc::clone(instance).downcast::<T>().ok()?;
                    Some(Arc::new(cast(concrete)) as Instance)
                }),
            });
        }
        self
    }

    /// Add a constructor built from `signature`
    pub fn constructor<F>(mut self, signature: Constructor, build: F) -> Self
    where
        F: Fn(&mut crate::factory::Arguments) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.descriptor
            .constructors
            .push(ConstructorDescriptor::new(signature, build));
        self
    }

    /// Add the parameterless fallback constructor
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(Constructor::plain(), |_| Ok(T::default()))
    }

    /// Declare an injected field, filled after construction
    pub fn field<V: Resolvable>(
        mut self,
        name: &'static str,
        identifier: Option<&'static str>,
        access: fn(&T) -> &Injected<V>,
    ) -> Self {
        self.descriptor.fields.push(FieldDescriptor {
            name,
            requirement: V::requirement(identifier),
            assign: Arc::new(move |instance: &Instance, value: Resolved| {
                let target = (**instance)
                    .downcast_ref::<T>()
                    .ok_or_else(|| format!("field {name} assigned on a foreign instance"))?;
                let value = V::from_resolved(value)
                    .ok_or_else(|| format!("field {name} received a value of the wrong shape"))?;
                access(target).fill(value)
            }),
        });
        self
    }

    /// Declare a post-init hook
    pub fn post_init<F>(self, name: &'static str, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.post_init_with_parameters(name, Vec::new(), hook)
    }

    /// Declare a post-init hook together with the parameter types its
    /// signature lists. Hooks with parameters are rejected when invoked.
    pub fn post_init_with_parameters<F>(
        mut self,
        name: &'static str,
        parameters: Vec<TypeKey>,
        hook: F,
    ) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.descriptor
            .post_init
            .push(PostInitHook::new(name, parameters, hook));
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// A type that can describe itself to the container.
///
/// Implemented by `#[derive(Component)]`; hand-written impls return a
/// descriptor assembled with [`TypeDescriptor`]'s builders.
pub trait Component: Send + Sync + Sized + 'static {
    fn descriptor() -> TypeDescriptor;
}
