//! Constructors and post-init hooks
//!
//! User code runs only through the closures stored here. Every call goes
//! through [`guarded`], so a panicking constructor or hook surfaces as an
//! error instead of unwinding through the container lock.

use crate::descriptor::{Instance, Requirement, TypeKey};
use crate::error::{BoxError, DiError, Result};
use crate::inject::{Resolvable, Resolved};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

type BuildFn = Arc<dyn Fn(&mut Arguments) -> std::result::Result<Instance, BoxError> + Send + Sync>;
type HookFn = Arc<dyn Fn(&Instance) -> std::result::Result<(), BoxError> + Send + Sync>;

// =============================================================================
// Constructor signatures
// =============================================================================

/// Signature of a constructor: whether it carries the injection marker and
/// which dependencies it takes, in parameter order.
///
/// ```rust
/// use component_injector::{All, Constructor};
/// use std::sync::Arc;
///
/// struct Database;
/// trait Plugin: Send + Sync {}
///
/// let signature = Constructor::injectable()
///     .param::<Arc<Database>>()
///     .param::<All<dyn Plugin>>();
/// assert_eq!(signature.params().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Constructor {
    inject: bool,
    params: Vec<Requirement>,
}

impl Constructor {
    /// A constructor marked for injection
    pub fn injectable() -> Self {
        Self {
            inject: true,
            params: Vec::new(),
        }
    }

    /// An unmarked constructor. Only usable as the parameterless fallback.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Append a parameter resolved by type
    pub fn param<V: Resolvable>(mut self) -> Self {
        self.params.push(V::requirement(None));
        self
    }

    /// Append a parameter narrowed by identifier
    pub fn param_named<V: Resolvable>(mut self, identifier: &'static str) -> Self {
        self.params.push(V::requirement(Some(identifier)));
        self
    }

    #[inline]
    pub fn is_injectable(&self) -> bool {
        self.inject
    }

    #[inline]
    pub fn params(&self) -> &[Requirement] {
        &self.params
    }
}

/// A constructor signature together with the closure that runs it.
pub struct ConstructorDescriptor {
    signature: Constructor,
    build: BuildFn,
}

impl ConstructorDescriptor {
    pub(crate) fn new<T, F>(signature: Constructor, build: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Arguments) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            signature,
            build: Arc::new(move |args: &mut Arguments| {
                build(args).map(|value| Arc::new(value) as Instance)
            }),
        }
    }

    #[inline]
    pub fn is_injectable(&self) -> bool {
        self.signature.inject
    }

    #[inline]
    pub fn params(&self) -> &[Requirement] {
        &self.signature.params
    }

    /// Run the constructor with already resolved arguments
    pub(crate) fn invoke(&self, owner: TypeKey, values: Vec<Resolved>) -> Result<Instance> {
        #[cfg(feature = "logging")]
        trace!(
            target: "component_injector",
            component = owner.name(),
            arguments = values.len(),
            "Invoking constructor"
        );

        let mut args = Arguments::new(owner, values);
        guarded(|| (self.build)(&mut args))
            .map_err(|source| DiError::creation_failed(owner.name(), source))
    }
}

/// Pick the constructor to use: the single injectable one, else the
/// parameterless fallback.
pub(crate) fn select_constructor(
    owner: TypeKey,
    constructors: &[ConstructorDescriptor],
) -> Result<&ConstructorDescriptor> {
    let mut marked = constructors.iter().filter(|c| c.is_injectable());
    match (marked.next(), marked.next()) {
        (Some(only), None) => Ok(only),
        (Some(_), Some(_)) => Err(DiError::AmbiguousConstructor {
            type_name: owner.name(),
            count: constructors.iter().filter(|c| c.is_injectable()).count(),
        }),
        (None, _) => constructors
            .iter()
            .find(|c| c.params().is_empty())
            .ok_or(DiError::NoUsableConstructor {
                type_name: owner.name(),
            }),
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// Resolved constructor arguments, consumed in declaration order.
pub struct Arguments {
    owner: TypeKey,
    values: std::vec::IntoIter<Resolved>,
    position: usize,
}

impl Arguments {
    pub(crate) fn new(owner: TypeKey, values: Vec<Resolved>) -> Self {
        Self {
            owner,
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Take the next argument. The requested type must match the declared
    /// parameter at this position.
    pub fn take<V: Resolvable>(&mut self) -> Result<V> {
        let position = self.position;
        self.position += 1;

        let value = self.values.next().ok_or_else(|| {
            DiError::Internal(format!(
                "constructor of {} asked for argument #{position} but declares only {position}",
                self.owner.name()
            ))
        })?;

        V::from_resolved(value).ok_or_else(|| {
            DiError::Internal(format!(
                "argument #{position} of {} is not a {}",
                self.owner.name(),
                std::any::type_name::<V>()
            ))
        })
    }

    /// Arguments not yet taken
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

// =============================================================================
// Post-init hooks
// =============================================================================

/// A hook run once after construction and field injection.
pub struct PostInitHook {
    name: &'static str,
    parameters: Vec<TypeKey>,
    invoke: HookFn,
}

impl PostInitHook {
    pub(crate) fn new<T, F>(name: &'static str, parameters: Vec<TypeKey>, hook: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name,
            parameters,
            invoke: Arc::new(move |instance: &Instance| {
                let target = (**instance)
                    .downcast_ref::<T>()
                    .ok_or_else(|| format!("post-init hook {name} called on a foreign instance"))?;
                hook(target)
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parameters(&self) -> &[TypeKey] {
        &self.parameters
    }

    pub(crate) fn invoke(&self, owner: TypeKey, instance: &Instance) -> Result<()> {
        guarded(|| (self.invoke)(instance)).map_err(|source| DiError::PostInitFailed {
            type_name: owner.name(),
            hook: self.name,
            source,
        })
    }
}

/// Validate the declared hooks: at most one, and it takes no parameters.
pub(crate) fn select_post_init(owner: TypeKey, hooks: &[PostInitHook]) -> Result<Option<&PostInitHook>> {
    match hooks {
        [] => Ok(None),
        [hook] if hook.parameters.is_empty() => Ok(Some(hook)),
        [hook] => Err(DiError::PostInitHasParameters {
            type_name: owner.name(),
            hook: hook.name,
            count: hook.parameters.len(),
        }),
        _ => Err(DiError::MultiplePostInit {
            type_name: owner.name(),
            hooks: hooks.iter().map(|h| h.name).collect(),
        }),
    }
}

// =============================================================================
// Panic guard
// =============================================================================

/// Run user code, turning a panic into an error.
pub(crate) fn guarded<R>(
    f: impl FnOnce() -> std::result::Result<R, BoxError>,
) -> std::result::Result<R, BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
