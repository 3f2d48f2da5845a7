//! Error types for dependency injection

use std::fmt;
use thiserror::Error;

/// Boxed error returned by user constructors, field setters and post-init hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a container cannot answer queries yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// No container exists for the owner key
    Missing,
    /// Bootstrap is still running
    Initializing,
    /// Bootstrap failed; the container is permanently unusable
    Failed,
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("has not been initialized yet"),
            Self::Initializing => f.write_str("is still initializing"),
            Self::Failed => f.write_str("failed during initialization and cannot be used"),
        }
    }
}

/// Errors that can occur while building or querying a container
#[derive(Error, Debug)]
pub enum DiError {
    /// `initialize` was called on a container that already left `Initializing`
    #[error("Container '{owner}' has already been initialized")]
    AlreadyInitialized { owner: String },

    /// Query against a container that is missing, still bootstrapping, or failed
    #[error("Container '{owner}' {reason}")]
    NotInitialized { owner: String, reason: NotReady },

    /// User code running under the construction lock called back into the
    /// same container for something not built yet
    #[error("Container '{owner}' was re-entered from a constructor or post-init hook")]
    Reentrant { owner: String },

    /// The bootstrap instance does not carry the entry-point marker
    #[error("{type_name} is not marked as an entry point")]
    NoEntryPoint { type_name: &'static str },

    /// Requested type is neither managed nor an abstraction with managed implementations
    #[error("{type_name} is not managed by the container")]
    Unmanaged { type_name: &'static str },

    /// More than one candidate matches and nothing narrows it down
    #[error("Ambiguous dependency {type_name}{}: candidates are {}", with_identifier(.identifier), .candidates.join(", "))]
    Ambiguous {
        type_name: &'static str,
        identifier: Option<String>,
        candidates: Vec<&'static str>,
    },

    /// No managed concrete type satisfies the request
    #[error("No implementation found for {type_name}{}", with_identifier(.identifier))]
    NoImplementation {
        type_name: &'static str,
        identifier: Option<String>,
    },

    /// A type was requested while it was already under construction
    #[error("Circular dependency detected: {path}")]
    CircularDependency { path: CyclePath },

    /// More than one constructor carries the injection marker
    #[error("{type_name} has {count} injectable constructors; at most one is allowed")]
    AmbiguousConstructor { type_name: &'static str, count: usize },

    /// No injectable constructor and no parameterless fallback
    #[error("{type_name} has no injectable constructor and no parameterless constructor")]
    NoUsableConstructor { type_name: &'static str },

    /// A constructor or field assignment failed
    #[error("Failed to create {type_name}: {source}")]
    CreationFailed {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    /// More than one post-init hook was declared
    #[error("{type_name} declares {} post-init hooks ({}); only one is allowed", .hooks.len(), .hooks.join(", "))]
    MultiplePostInit {
        type_name: &'static str,
        hooks: Vec<&'static str>,
    },

    /// The post-init hook declares parameters
    #[error("Post-init hook {type_name}::{hook} must not take parameters (declares {count})")]
    PostInitHasParameters {
        type_name: &'static str,
        hook: &'static str,
        count: usize,
    },

    /// The post-init hook returned an error or panicked
    #[error("Post-init hook {type_name}::{hook} failed: {source}")]
    PostInitFailed {
        type_name: &'static str,
        hook: &'static str,
        #[source]
        source: BoxError,
    },

    /// Descriptor and instance disagree about a type
    #[error("Internal DI error: {0}")]
    Internal(String),
}

fn with_identifier(identifier: &Option<String>) -> String {
    match identifier {
        Some(id) => format!(" (identifier '{id}')"),
        None => String::new(),
    }
}

impl DiError {
    /// Create a CreationFailed error, passing crate errors through unchanged
    pub fn creation_failed(type_name: &'static str, source: BoxError) -> Self {
        match source.downcast::<DiError>() {
            Ok(own) => *own,
            Err(source) => Self::CreationFailed { type_name, source },
        }
    }

    /// Create a NotInitialized error
    #[inline]
    pub fn not_initialized(owner: impl Into<String>, reason: NotReady) -> Self {
        Self::NotInitialized {
            owner: owner.into(),
            reason,
        }
    }

    /// Returns the cycle payload of a CircularDependency error
    pub fn cycle(&self) -> Option<&CyclePath> {
        match self {
            Self::CircularDependency { path } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

// =============================================================================
// Cycle path
// =============================================================================

/// Ordered type names of a dependency cycle, ending with the repeated type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath {
    names: Vec<&'static str>,
}

impl CyclePath {
    pub fn new(names: Vec<&'static str>) -> Self {
        Self { names }
    }

    /// Fully qualified type names in visitation order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Type names without their module path.
    pub fn short_names(&self) -> Vec<&'static str> {
        self.names.iter().map(|name| short_name(name)).collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Render the path as a box diagram: types leading into the loop are
    /// listed above the box, the loop members inside it.
    ///
    /// ```text
    ///    Root
    ///          ↓
    /// ┌─────┐
    /// │     X
    /// │  A
    /// │     ↓
    /// │  B
    /// │     ↓
    /// └─────┘
    /// ```
    pub fn diagram(&self) -> String {
        if self.names.is_empty() {
            return "Circular dependency detected! Path: undefined".to_string();
        }

        let names = self.short_names();
        let repeated = names[names.len() - 1];
        let loop_start = names.iter().position(|n| *n == repeated).unwrap_or(0);
        let (lead_in, members) = names.split_at(loop_start);

        let widest = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);
        let width = (widest / 3 + 4).max(5);
        let gap = " ".repeat(width);

        let mut out = format!(
            "Circular dependency detected! Path: {}\n\n\t",
            names.join(" -> ")
        );

        for name in lead_in {
            out.push_str(&format!("   {}{name}\n\t", centered(name, widest)));
            out.push_str(&format!(" {gap}↓\n\t"));
        }

        if members.is_empty() {
            return out;
        }

        out.push_str(&format!("┌{}┐\n\t", "─".repeat(width)));
        out.push_str(&format!("│{gap}X\n\t"));

        let mut drawn: Vec<&str> = Vec::with_capacity(members.len());
        for name in members {
            if drawn.contains(name) {
                continue;
            }
            out.push_str(&format!("│  {}{name}\n\t", centered(name, widest)));
            out.push_str(&format!("│{gap}↓\n\t"));
            drawn.push(name);
        }

        out.push_str(&format!("└{}┘\n", "─".repeat(width)));
        out
    }
}

fn centered(name: &str, widest: usize) -> String {
    " ".repeat((widest - name.chars().count()) / 2)
}

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_names().join(" -> "))
    }
}

/// Strip the module path from a type name, keeping generic arguments intact.
pub(crate) fn short_name(name: &str) -> &str {
    let head = name.find('<').unwrap_or(name.len());
    let start = name[..head].rfind("::").map_or(0, |i| i + 2);
    &name[start..]
}
