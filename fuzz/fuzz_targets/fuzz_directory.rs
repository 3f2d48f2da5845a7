#![no_main]

//! Fuzz target for the container directory
//!
//! Bootstraps and queries containers for a handful of owners in arbitrary
//! order and checks the lifecycle and singleton guarantees hold.

use arbitrary::Arbitrary;
use component_injector::{
    All, Catalog, Component, Constructor, DiError, Directory, TypeDescriptor,
};
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;
use std::sync::Arc;

trait Store: Send + Sync {
    fn name(&self) -> &'static str;
}

#[derive(Default)]
struct MemoryStore;

impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }
}

impl Component for MemoryStore {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::component::<MemoryStore>()
            .namespace("fuzz")
            .identifier("memory")
            .provides(|it: Arc<MemoryStore>| -> Arc<dyn Store> { it })
            .default_constructor()
            .build()
    }
}

#[derive(Default)]
struct DiskStore;

impl Store for DiskStore {
    fn name(&self) -> &'static str {
        "disk"
    }
}

impl Component for DiskStore {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::component::<DiskStore>()
            .namespace("fuzz")
            .identifier("disk")
            .provides(|it: Arc<DiskStore>| -> Arc<dyn Store> { it })
            .default_constructor()
            .build()
    }
}

struct Mirror {
    stores: All<dyn Store>,
}

impl Component for Mirror {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::component::<Mirror>()
            .namespace("fuzz")
            .constructor(Constructor::injectable().param::<All<dyn Store>>(), |args| {
                Ok(Mirror { stores: args.take()? })
            })
            .build()
    }
}

struct Entry {
    seed: u32,
}

impl Component for Entry {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entry_point::<Entry>().namespace("fuzz").build()
    }
}

/// Small owner space so operations collide
#[derive(Debug, Clone, Copy, Arbitrary)]
enum Owner {
    A,
    B,
    C,
}

impl Owner {
    fn name(self) -> &'static str {
        match self {
            Owner::A => "a",
            Owner::B => "b",
            Owner::C => "c",
        }
    }
}

/// Operations to perform on the directory
#[derive(Debug, Arbitrary)]
enum DirectoryOp {
    Initialize(Owner, u32),
    ResolveEntry(Owner),
    ResolveMirror(Owner),
    ResolveStore(Owner),
    ResolveNamed(Owner, String),
    ResolveAll(Owner),
    Owners,
}

fuzz_target!(|ops: Vec<DirectoryOp>| {
    let catalog = Catalog::new()
        .with::<MemoryStore>()
        .with::<DiskStore>()
        .with::<Mirror>();
    let directory = Directory::new(Arc::new(catalog));

    // owner -> seed of the entry that bootstrapped it
    let mut running: HashMap<&'static str, u32> = HashMap::new();

    for op in ops {
        match op {
            DirectoryOp::Initialize(owner, seed) => {
                let result = directory.initialize(owner.name(), Entry { seed });
                if running.contains_key(owner.name()) {
                    assert!(matches!(result, Err(DiError::AlreadyInitialized { .. })));
                } else {
                    assert!(result.is_ok());
                    running.insert(owner.name(), seed);
                }
            }
            DirectoryOp::ResolveEntry(owner) => {
                let result = directory.resolve::<Entry>(owner.name());
                match running.get(owner.name()) {
                    Some(&seed) => assert_eq!(result.map(|e| e.seed).ok(), Some(seed)),
                    None => assert!(matches!(result, Err(DiError::NotInitialized { .. }))),
                }
            }
            DirectoryOp::ResolveMirror(owner) => {
                let first = directory.resolve::<Mirror>(owner.name());
                let second = directory.resolve::<Mirror>(owner.name());
                match (first, second) {
                    (Ok(first), Ok(second)) => {
                        assert!(running.contains_key(owner.name()));
                        assert!(Arc::ptr_eq(&first, &second));
                        assert_eq!(first.stores.len(), 2);
                    }
                    (Err(_), Err(_)) => assert!(!running.contains_key(owner.name())),
                    _ => panic!("singleton resolution is not stable"),
                }
            }
            DirectoryOp::ResolveStore(owner) => {
                // two stores and no identifier
                assert!(directory.resolve::<dyn Store>(owner.name()).is_err());
            }
            DirectoryOp::ResolveNamed(owner, identifier) => {
                let result = directory.resolve_named::<dyn Store>(owner.name(), &identifier);
                let known = identifier == "memory" || identifier == "disk";
                match result {
                    Ok(store) => {
                        assert!(known && running.contains_key(owner.name()));
                        assert_eq!(store.name(), identifier);
                    }
                    Err(_) => assert!(!known || !running.contains_key(owner.name())),
                }
            }
            DirectoryOp::ResolveAll(owner) => {
                let result = directory.resolve_all::<dyn Store>(owner.name());
                if running.contains_key(owner.name()) {
                    assert_eq!(result.map(|all| all.len()).ok(), Some(2));
                } else {
                    assert!(result.is_err());
                }
            }
            DirectoryOp::Owners => {
                assert!(directory.len() >= running.len());
                for owner in running.keys() {
                    assert!(directory.get(owner).is_some());
                }
            }
        }
    }
});
