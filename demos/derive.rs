//! Example demonstrating `#[derive(Component)]`
//!
//! Run with:
//! ```bash
//! cargo run --example derive --features derive
//! ```

use component_injector::{All, Catalog, Component, Directory, Injected};
use std::sync::Arc;

trait StorageService: Send + Sync {
    fn save(&self, key: &str) -> String;
}

trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

#[derive(Component)]
#[component(identifier = "database", provides(dyn StorageService))]
struct DatabaseStorage;

impl StorageService for DatabaseStorage {
    fn save(&self, key: &str) -> String {
        format!("INSERT {key}")
    }
}

#[derive(Component)]
#[component(identifier = "file", provides(dyn StorageService))]
struct FileStorage {
    root: String,
}

impl StorageService for FileStorage {
    fn save(&self, key: &str) -> String {
        format!("write {}/{key}", if self.root.is_empty() { "." } else { &self.root })
    }
}

#[derive(Component)]
#[component(provides(dyn Plugin))]
struct Metrics;

impl Plugin for Metrics {
    fn name(&self) -> &'static str {
        "metrics"
    }
}

#[derive(Component)]
#[component(provides(dyn Plugin))]
struct Backup;

impl Plugin for Backup {
    fn name(&self) -> &'static str {
        "backup"
    }
}

#[derive(Component)]
#[component(post_init = "announce")]
struct PluginManager {
    #[dep]
    plugins: All<dyn Plugin>,
    #[dep(identifier = "file")]
    storage: Arc<dyn StorageService>,
}

impl PluginManager {
    fn announce(&self) -> Result<(), std::fmt::Error> {
        let names: Vec<_> = self.plugins.iter().map(|p| p.name()).collect();
        println!("  [PluginManager] ready with {names:?}");
        Ok(())
    }
}

#[derive(Component)]
#[component(entry_point, post_init = "on_enable")]
struct ModMain {
    #[inject]
    manager: Injected<Arc<PluginManager>>,
    #[inject(identifier = "database")]
    database: Injected<Arc<dyn StorageService>>,
}

impl ModMain {
    fn on_enable(&self) -> Result<(), std::fmt::Error> {
        println!("  [ModMain] {}", self.manager.storage.save("settings"));
        println!("  [ModMain] {}", self.database.save("settings"));
        Ok(())
    }
}

fn main() {
    println!("=== Derive Macro Demo ===\n");

    let catalog = Catalog::new()
        .with::<DatabaseStorage>()
        .with::<FileStorage>()
        .with::<Metrics>()
        .with::<Backup>()
        .with::<PluginManager>();
    let directory = Directory::new(Arc::new(catalog));

    println!("Bootstrapping 'my-mod'...");
    directory
        .initialize(
            "my-mod",
            ModMain {
                manager: Injected::new(),
                database: Injected::new(),
            },
        )
        .unwrap();

    let storages = directory.resolve_all::<dyn StorageService>("my-mod").unwrap();
    println!("\nStorage backends: {}", storages.len());

    let file = directory
        .resolve_named::<dyn StorageService>("my-mod", "file")
        .unwrap();
    println!("Named lookup: {}", file.save("report"));

    match directory.resolve::<dyn StorageService>("my-mod") {
        Ok(_) => println!("unexpected success"),
        Err(err) => println!("Unqualified lookup: {err}"),
    }

    println!("\n=== Demo Complete ===");
}
