//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json,logging-pretty
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```
//!
//! `RUST_LOG=component_injector=trace` shows registry hits as well.

use component_injector::prelude::*;

#[allow(dead_code)]
#[derive(Default)]
struct Database {
    url: String,
}

impl Component for Database {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::component::<Database>()
            .namespace("shop")
            .default_constructor()
            .build()
    }
}

#[allow(dead_code)]
struct UserService {
    db: Arc<Database>,
}

impl Component for UserService {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::component::<UserService>()
            .namespace("shop")
            .constructor(Constructor::injectable().param::<Arc<Database>>(), |args| {
                Ok(UserService { db: args.take()? })
            })
            .post_init("warm_up", |_: &UserService| {
                println!("  [App] UserService warming up...");
                Ok(())
            })
            .build()
    }
}

struct Shop;

impl Component for Shop {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entry_point::<Shop>().namespace("shop").build()
    }
}

// Billing and Invoices need each other through their constructors
#[allow(dead_code)]
struct Billing {
    invoices: Arc<Invoices>,
}

impl Component for Billing {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::component::<Billing>()
            .namespace("billing")
            .constructor(Constructor::injectable().param::<Arc<Invoices>>(), |args| {
                Ok(Billing { invoices: args.take()? })
            })
            .build()
    }
}

#[allow(dead_code)]
struct Invoices {
    billing: Arc<Billing>,
}

impl Component for Invoices {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::component::<Invoices>()
            .namespace("billing")
            .constructor(Constructor::injectable().param::<Arc<Billing>>(), |args| {
                Ok(Invoices { billing: args.take()? })
            })
            .build()
    }
}

struct BillingMain;

impl Component for BillingMain {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entry_point::<BillingMain>().namespace("billing").build()
    }
}

fn main() {
    // JSON if logging-json is enabled, pretty otherwise
    component_injector::logging::init();

    println!("=== Component Injector Logging Demo ===\n");

    let catalog = Catalog::new()
        .with::<Database>()
        .with::<UserService>()
        .with::<Billing>()
        .with::<Invoices>();
    let directory = Directory::new(Arc::new(catalog));

    // logs: container bootstrap, scan results, construction of each type
    println!("Bootstrapping 'shop'...");
    directory.initialize("shop", Shop).unwrap();

    // logs at TRACE: registry hit
    let users = directory.resolve::<UserService>("shop").unwrap();
    let again = directory.resolve::<UserService>("shop").unwrap();
    println!("  same instance: {}\n", Arc::ptr_eq(&users, &again));

    // logs at ERROR: the cycle, with its diagram
    println!("Bootstrapping 'billing'...");
    match directory.initialize("billing", BillingMain) {
        Ok(()) => println!("  unexpected success"),
        Err(err) => {
            println!("  {err}");
            if let Some(cycle) = err.cycle() {
                println!("\n{}", cycle.diagram());
            }
        }
    }

    // the failed container refuses further queries
    match directory.resolve::<Billing>("billing") {
        Ok(_) => println!("  unexpected success"),
        Err(err) => println!("  {err}"),
    }

    println!("\n=== Demo Complete ===");
}
