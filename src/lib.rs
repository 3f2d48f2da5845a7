//! # component-injector - singleton-scoped dependency injection
//!
//! One container per owner (a plugin, a module, an application). Each
//! container is bootstrapped once from an entry point: it discovers the
//! managed types under the entry point's scope, builds every one of them as
//! a singleton, wires constructor parameters and injected fields, and runs
//! post-init hooks. Afterwards the container answers typed queries.
//!
//! ## Features
//!
//! - **Constructor and field injection** - `Arc<T>` for one instance,
//!   [`All<T>`] for every instance assignable to `T`
//! - **Abstractions** - resolve `dyn Trait` to the managed type providing it,
//!   narrowed by identifier when several do
//! - **Cycle detection** - constructor cycles fail with the full path
//! - **Lock-free reads** - built singletons come straight from a `DashMap`
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use component_injector::prelude::*;
//!
//! trait Storage: Send + Sync {
//!     fn kind(&self) -> &'static str;
//! }
//!
//! #[derive(Default)]
//! struct FileStorage;
//!
//! impl Storage for FileStorage {
//!     fn kind(&self) -> &'static str {
//!         "file"
//!     }
//! }
//!
//! impl Component for FileStorage {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::component::<FileStorage>()
//!             .namespace("app")
//!             .provides(|it: Arc<FileStorage>| -> Arc<dyn Storage> { it })
//!             .default_constructor()
//!             .build()
//!     }
//! }
//!
//! struct Reports {
//!     storage: Arc<dyn Storage>,
//! }
//!
//! impl Component for Reports {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::component::<Reports>()
//!             .namespace("app")
//!             .constructor(Constructor::injectable().param::<Arc<dyn Storage>>(), |args| {
//!                 Ok(Reports { storage: args.take()? })
//!             })
//!             .build()
//!     }
//! }
//!
//! struct App;
//!
//! impl Component for App {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::entry_point::<App>().namespace("app").build()
//!     }
//! }
//!
//! let catalog = Catalog::new().with::<FileStorage>().with::<Reports>();
//! let directory = Directory::new(Arc::new(catalog));
//! directory.initialize("app", App).unwrap();
//!
//! let reports = directory.resolve::<Reports>("app").unwrap();
//! assert_eq!(reports.storage.kind(), "file");
//! ```
//!
//! With the `derive` feature the descriptors above are generated by
//! `#[derive(Component)]`.

mod container;
mod descriptor;
mod directory;
mod error;
mod factory;
mod inject;
#[cfg(feature = "logging")]
pub mod logging;
mod registry;
mod scanner;

pub use container::{Container, ContainerStatus};
pub use descriptor::{
    Component, DescriptorBuilder, FieldDescriptor, Instance, Requirement, TypeDescriptor, TypeKey,
};
pub use directory::Directory;
pub use error::{BoxError, CyclePath, DiError, NotReady, Result};
pub use factory::{Arguments, Constructor, ConstructorDescriptor, PostInitHook};
pub use inject::{All, Injected, Resolvable, Resolved};
pub use registry::{DEFAULT_IDENTIFIER, Record, Registry};
pub use scanner::{Catalog, Scanner};

#[cfg(feature = "derive")]
pub use component_injector_derive::Component;

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        All, BoxError, Catalog, Component, Constructor, Container, ContainerStatus, DiError,
        Directory, Injected, Result, TypeDescriptor,
    };
    pub use std::sync::Arc;
}
