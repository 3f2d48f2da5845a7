//! Derive macro for component-injector
//!
//! `#[derive(Component)]` generates the `Component` impl that describes a
//! struct to the container: its markers, the abstractions it provides, its
//! constructor, its injected fields and its post-init hook.
//!
//! # Example
//!
//! ```rust,ignore
//! use component_injector::{All, Component, Injected};
//! use std::sync::Arc;
//!
//! trait Storage: Send + Sync {}
//! trait Plugin: Send + Sync {}
//!
//! #[derive(Component)]
//! #[component(identifier = "file", provides(dyn Storage))]
//! struct FileStorage {
//!     // not a dependency: Default::default()
//!     root: String,
//! }
//!
//! impl Storage for FileStorage {}
//!
//! #[derive(Component)]
//! #[component(post_init = "start")]
//! struct PluginManager {
//!     // constructor parameters, in field order
//!     #[dep]
//!     plugins: All<dyn Plugin>,
//!     #[dep(identifier = "file")]
//!     storage: Arc<dyn Storage>,
//!     // filled after construction
//!     #[inject]
//!     fallback: Injected<Arc<FileStorage>>,
//! }
//!
//! impl PluginManager {
//!     fn start(&self) -> Result<(), std::io::Error> {
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Component)]
//! #[component(entry_point, scope = "my_app")]
//! struct App {
//!     #[inject]
//!     manager: Injected<Arc<PluginManager>>,
//! }
//! ```
//!
//! # Struct attributes
//!
//! - `entry_point` - the type bootstraps a container. No constructor is
//!   generated; the instance is handed to `initialize`.
//! - `identifier = "..."` - name used to select among implementations
//! - `scope = "..."` - scan scope override (defaults to the module path)
//! - `provides(dyn A, dyn B)` - abstractions the type can be resolved as
//! - `post_init = "method"` - `fn method(&self) -> Result<(), E>` run once
//!   the instance is fully wired
//!
//! # Field attributes
//!
//! - `#[dep]` / `#[dep(identifier = "...")]` - constructor parameter, type
//!   `Arc<T>` or `All<T>`
//! - `#[inject]` / `#[inject(identifier = "...")]` - injected field, type
//!   `Injected<Arc<T>>` or `Injected<All<T>>`
//!
//! Fields without either attribute are initialized with `Default::default()`.

use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Meta, Token, Type, parse_macro_input};

/// Derive macro for the `Component` trait.
#[proc_macro_derive(Component, attributes(component, dep, inject))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed `#[component(...)]` attributes
#[derive(Default)]
struct ComponentArgs {
    entry_point: bool,
    identifier: Option<LitStr>,
    scope: Option<LitStr>,
    provides: Vec<Type>,
    post_init: Vec<LitStr>,
}

/// What the container does with a field
enum FieldRole {
    Plain,
    Dep(Option<LitStr>),
    Inject(Option<LitStr>),
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Component can only be derived for structs",
            ));
        }
    };

    if let Fields::Unnamed(_) = fields {
        return Err(syn::Error::new_spanned(
            input,
            "Component can only be derived for structs with named fields or unit structs",
        ));
    }

    let args = parse_component_args(&input.attrs)?;

    let start = if args.entry_point {
        quote! { ::component_injector::TypeDescriptor::entry_point::<Self>() }
    } else {
        quote! { ::component_injector::TypeDescriptor::component::<Self>() }
    };

    let mut steps = vec![quote! { .namespace(::core::module_path!()) }];

    if let Some(identifier) = &args.identifier {
        steps.push(quote! { .identifier(#identifier) });
    }
    if let Some(scope) = &args.scope {
        steps.push(quote! { .scope(#scope) });
    }
    for abstraction in &args.provides {
        steps.push(quote! {
            .provides(|it: ::std::sync::Arc<Self>| -> ::std::sync::Arc<#abstraction> { it })
        });
    }

    let mut params = Vec::new();
    let mut inits = Vec::new();

    for field in fields.iter() {
        let field_name = field.ident.as_ref().unwrap();
        let field_type = &field.ty;

        match field_role(&field.attrs)? {
            FieldRole::Dep(identifier) => {
                params.push(match identifier {
                    Some(id) => quote! { .param_named::<#field_type>(#id) },
                    None => quote! { .param::<#field_type>() },
                });
                inits.push(quote! { #field_name: args.take()? });
            }
            FieldRole::Inject(identifier) => {
                if !is_injected_slot(field_type) {
                    return Err(syn::Error::new_spanned(
                        field_type,
                        "Fields marked with #[inject] must have type Injected<T>",
                    ));
                }
                let identifier = match identifier {
                    Some(id) => quote! { ::core::option::Option::Some(#id) },
                    None => quote! { ::core::option::Option::None },
                };
                let label = field_name.to_string();
                steps.push(quote! {
                    .field(#label, #identifier, |it: &Self| &it.#field_name)
                });
                inits.push(quote! { #field_name: ::component_injector::Injected::new() });
            }
            FieldRole::Plain => {
                inits.push(quote! { #field_name: ::core::default::Default::default() });
            }
        }
    }

    if !args.entry_point {
        let signature = if params.is_empty() {
            quote! { ::component_injector::Constructor::plain() }
        } else {
            quote! { ::component_injector::Constructor::injectable() #(#params)* }
        };
        let value = match fields {
            Fields::Unit => quote! { Self },
            _ => quote! { Self { #(#inits),* } },
        };
        steps.push(quote! {
            .constructor(#signature, |args| {
                let _ = &args;
                ::core::result::Result::Ok(#value)
            })
        });
    } else if !params.is_empty() {
        return Err(syn::Error::new_spanned(
            input,
            "entry points are supplied by the caller; use #[inject] instead of #[dep]",
        ));
    }

    for hook in &args.post_init {
        let method = syn::Ident::new(&hook.value(), hook.span());
        steps.push(quote! {
            .post_init(#hook, |it: &Self| {
                Self::#method(it).map_err(::core::convert::Into::into)
            })
        });
    }

    Ok(quote! {
        impl #impl_generics ::component_injector::Component for #name #ty_generics #where_clause {
            fn descriptor() -> ::component_injector::TypeDescriptor {
                #start
                    #(#steps)*
                    .build()
            }
        }
    })
}

fn parse_component_args(attrs: &[Attribute]) -> syn::Result<ComponentArgs> {
    let mut args = ComponentArgs::default();

    for attr in attrs.iter().filter(|a| a.path().is_ident("component")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("entry_point") {
                args.entry_point = true;
            } else if meta.path.is_ident("identifier") {
                args.identifier = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("scope") {
                args.scope = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("post_init") {
                args.post_init.push(meta.value()?.parse()?);
            } else if meta.path.is_ident("provides") {
                let content;
                syn::parenthesized!(content in meta.input);
                let types = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
                args.provides.extend(types);
            } else {
                return Err(meta.error(
                    "expected one of: entry_point, identifier, scope, provides, post_init",
                ));
            }
            Ok(())
        })?;
    }

    Ok(args)
}

fn field_role(attrs: &[Attribute]) -> syn::Result<FieldRole> {
    for attr in attrs {
        let is_dep = attr.path().is_ident("dep");
        if !is_dep && !attr.path().is_ident("inject") {
            continue;
        }

        let mut identifier = None;
        if !matches!(attr.meta, Meta::Path(_)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("identifier") {
                    identifier = Some(meta.value()?.parse::<LitStr>()?);
                    Ok(())
                } else {
                    Err(meta.error("expected `identifier = \"...\"`"))
                }
            })?;
        }

        return Ok(if is_dep {
            FieldRole::Dep(identifier)
        } else {
            FieldRole::Inject(identifier)
        });
    }

    Ok(FieldRole::Plain)
}

/// Whether the type is spelled `Injected<...>`
fn is_injected_slot(ty: &Type) -> bool {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Injected"),
        _ => false,
    }
}
