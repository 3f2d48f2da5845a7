//! Instance registry
//!
//! Two-level map: concrete type, then identifier, to the one instance built
//! for that pair. Lookups by abstraction fall back to a scan over every
//! record whose type is assignable to the requested key.
//!
//! Uses DashMap with ahash so that lookups of already built singletons never
//! wait on the container's construction lock.

use crate::descriptor::{Instance, TypeDescriptor, TypeKey};
use crate::error::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// Key used for instances registered without an identifier
pub const DEFAULT_IDENTIFIER: &str = "";

type ByIdentifier = DashMap<String, Record, RandomState>;

/// One registered singleton together with the descriptor it was built from.
#[derive(Clone)]
pub struct Record {
    descriptor: Arc<TypeDescriptor>,
    identifier: String,
    instance: Instance,
}

impl Record {
    #[inline]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The raw `Arc<T>` of the concrete type, erased
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The instance viewed as `target`, if its type is assignable to it
    #[inline]
    pub fn view(&self, target: TypeKey) -> Option<Instance> {
        self.descriptor.view(&self.instance, target)
    }

    /// Whether two records hold the same allocation
    pub(crate) fn same_instance(&self, other: &Record) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.instance), Arc::as_ptr(&other.instance))
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.descriptor.key())
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// Thread-safe store of constructed singletons
pub struct Registry {
    instances: DashMap<TypeKey, Arc<ByIdentifier>, RandomState>,
}

impl Registry {
    /// Create an empty registry.
    ///
    /// Containers hold a few dozen types at most, so 8 shards are plenty.
    #[inline]
    pub fn new() -> Self {
        Self {
            instances: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Store `instance` under its concrete type and identifier (the
    /// explicit one, else the declared one, else the default).
    ///
    /// The first registration for a pair wins; the stored record is returned
    /// either way.
    pub fn register(
        &self,
        descriptor: &Arc<TypeDescriptor>,
        instance: Instance,
        identifier: Option<&str>,
    ) -> Record {
        let identifier = identifier
            .or(descriptor.identifier())
            .unwrap_or(DEFAULT_IDENTIFIER);

        let by_identifier = Arc::clone(
            self.instances
                .entry(descriptor.key())
                .or_insert_with(|| Arc::new(DashMap::with_hasher(RandomState::new())))
                .value(),
        );

        let stored = by_identifier
            .entry(identifier.to_owned())
            .or_insert_with(|| Record {
                descriptor: Arc::clone(descriptor),
                identifier: identifier.to_owned(),
                instance: Arc::clone(&instance),
            })
            .value()
            .clone();

        #[cfg(feature = "logging")]
        if std::ptr::addr_eq(Arc::as_ptr(&stored.instance), Arc::as_ptr(&instance)) {
            trace!(
                target: "component_injector",
                component = descriptor.type_name(),
                identifier = identifier,
                "Registered instance"
            );
        } else {
            warn!(
                target: "component_injector",
                component = descriptor.type_name(),
                identifier = identifier,
                "Instance already registered, keeping the existing one"
            );
        }

        stored
    }

    /// Find the single record that satisfies `target` and `identifier`.
    ///
    /// A concrete key that has records is answered from its own map, keyed
    /// by the identifier it was registered under. Any other key is answered
    /// by scanning every record assignable to it and matching the declared
    /// identifier of the record's type; more than one match is an error.
    pub fn find(&self, target: TypeKey, identifier: Option<&str>) -> Result<Option<Record>> {
        let direct = self
            .instances
            .get(&target)
            .map(|entry| Arc::clone(entry.value()));

        let candidates: Vec<Record> = match (direct, identifier) {
            (Some(by_identifier), Some(id)) => {
                let hit = by_identifier.get(id).map(|r| r.value().clone());
                return Ok(hit);
            }
            (Some(by_identifier), None) => {
                let records: Vec<Record> = by_identifier.iter().map(|r| r.value().clone()).collect();
                records
            }
            (None, _) => self
                .find_all(target)
                .into_iter()
                .filter(|record| {
                    identifier.is_none_or(|id| record.descriptor.identifier() == Some(id))
                })
                .collect(),
        };

        match candidates.len() {
            0 | 1 => Ok(candidates.into_iter().next()),
            _ => Err(DiError::Ambiguous {
                type_name: target.name(),
                identifier: identifier.map(str::to_owned),
                candidates: candidates.iter().map(|r| r.descriptor.type_name()).collect(),
            }),
        }
    }

    /// Every record whose type is assignable to `target`
    pub fn find_all(&self, target: TypeKey) -> Vec<Record> {
        let maps: Vec<Arc<ByIdentifier>> = self
            .instances
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        maps.iter()
            .flat_map(|by_identifier| {
                by_identifier
                    .iter()
                    .map(|r| r.value().clone())
                    .collect::<Vec<_>>()
            })
            .filter(|record| record.descriptor.is_assignable_to(target))
            .collect()
    }

    /// Whether any instance of the concrete type `key` is registered
    #[inline]
    pub fn contains(&self, key: TypeKey) -> bool {
        self.instances
            .get(&key)
            .is_some_and(|by_identifier| !by_identifier.is_empty())
    }

    /// Number of registered instances
    pub fn len(&self) -> usize {
        self.instances.iter().map(|entry| entry.value().len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("count", &self.len())
            .finish()
    }
}
