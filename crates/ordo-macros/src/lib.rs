//! Procedural macros for Ordo modules.
//!
//! This crate provides the `#[module]` attribute, re-exported as
//! `ordo_core::module`. It is applied to an `impl Module for T` block and
//! generates the declaration methods from its arguments.
//!
//! # Attributes
//!
//! ```ignore
//! #[derive(Default)]
//! struct Clipboard;
//!
//! #[ordo_core::module(
//!     name = "clipboard",
//!     depends_on(Settings, Fonts),
//!     depends_on_named("display"),
//!     register
//! )]
//! impl Module for Clipboard {
//!     fn on_init(&mut self) -> Result<(), InitError> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! - `name = "..."`: generates `Module::name`
//! - `depends_on(Type, ...)`: hard dependencies, in order
//! - `depends_on_named("...", ...)`: named dependencies, in order
//! - `register`: submits a catalog entry to `ordo_core::MODULE_CATALOG`; the
//!   type must implement `Default` and must not be generic

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::parse::{Parse, Parser};
use syn::{parenthesized, parse_macro_input, ImplItem, ItemImpl, LitStr, Token, Type};

/// Generate `name()`/`dependencies()` for a module and optionally register
/// it in the link-time catalog.
///
/// # Example
///
/// ```ignore
/// use ordo_core::{InitError, Module};
///
/// #[derive(Default)]
/// struct Sockets;
///
/// #[ordo_core::module(name = "sockets", register)]
/// impl Module for Sockets {
///     fn on_init(&mut self) -> Result<(), InitError> {
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn module(args: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as ItemImpl);

    match parse_module_attrs(args.into()).and_then(|attrs| impl_module(attrs, item)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed `#[module(...)]` arguments.
#[derive(Default)]
struct ModuleAttrs {
    name: Option<LitStr>,
    depends_on: Vec<Type>,
    depends_on_named: Vec<LitStr>,
    register: bool,
}

impl ModuleAttrs {
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            let name: LitStr = meta.value()?.parse()?;
            if name.value().is_empty() {
                return Err(syn::Error::new_spanned(name, "module name must not be empty"));
            }
            self.name = Some(name);
        } else if meta.path.is_ident("depends_on") {
            let content;
            parenthesized!(content in meta.input);
            let types = content.parse_terminated(Type::parse, Token![,])?;
            self.depends_on.extend(types);
        } else if meta.path.is_ident("depends_on_named") {
            let content;
            parenthesized!(content in meta.input);
            let names = content.parse_terminated(<LitStr as Parse>::parse, Token![,])?;
            self.depends_on_named.extend(names);
        } else if meta.path.is_ident("register") {
            self.register = true;
        } else {
            return Err(meta.error(
                "unsupported module attribute, expected `name`, `depends_on`, `depends_on_named` or `register`",
            ));
        }
        Ok(())
    }

    fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty() || !self.depends_on_named.is_empty()
    }
}

fn parse_module_attrs(args: TokenStream2) -> syn::Result<ModuleAttrs> {
    let mut attrs = ModuleAttrs::default();
    syn::meta::parser(|meta| attrs.parse(meta)).parse2(args)?;
    Ok(attrs)
}

fn impl_module(attrs: ModuleAttrs, mut item: ItemImpl) -> syn::Result<TokenStream2> {
    let is_module_impl = item
        .trait_
        .as_ref()
        .and_then(|(_, path, _)| path.segments.last())
        .is_some_and(|segment| segment.ident == "Module");
    if !is_module_impl {
        return Err(syn::Error::new_spanned(
            &item.self_ty,
            "#[module] must be applied to an `impl Module for T` block",
        ));
    }

    check_not_defined(&item, "name", attrs.name.is_some())?;
    check_not_defined(&item, "dependencies", attrs.has_dependencies())?;

    if let Some(name) = &attrs.name {
        item.items.push(syn::parse_quote! {
            fn name(&self) -> &'static str {
                #name
            }
        });
    }

    if attrs.has_dependencies() {
        let hard = &attrs.depends_on;
        let named = &attrs.depends_on_named;
        item.items.push(syn::parse_quote! {
            fn dependencies(&self) -> ::std::vec::Vec<::ordo_core::Dependency> {
                ::std::vec![
                    #(::ordo_core::Dependency::on::<#hard>(),)*
                    #(::ordo_core::Dependency::named(#named),)*
                ]
            }
        });
    }

    let registration = if attrs.register {
        generate_catalog_entry(&attrs, &item)?
    } else {
        TokenStream2::new()
    };

    Ok(quote! {
        #item
        #registration
    })
}

/// Reject a hand-written method the attribute would also generate.
fn check_not_defined(item: &ItemImpl, method: &str, generated: bool) -> syn::Result<()> {
    if !generated {
        return Ok(());
    }
    for impl_item in &item.items {
        if let ImplItem::Fn(function) = impl_item {
            if function.sig.ident == method {
                return Err(syn::Error::new_spanned(
                    &function.sig.ident,
                    format!("`{method}` is generated by #[module]; remove this definition or the attribute argument"),
                ));
            }
        }
    }
    Ok(())
}

fn generate_catalog_entry(attrs: &ModuleAttrs, item: &ItemImpl) -> syn::Result<TokenStream2> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[module(register)] does not support generic modules",
        ));
    }

    let self_ty = &item.self_ty;
    let name = match &attrs.name {
        Some(name) => name.clone(),
        None => default_name(self_ty)?,
    };

    Ok(quote! {
        const _: () = {
            #[::ordo_core::__private::linkme::distributed_slice(::ordo_core::MODULE_CATALOG)]
            #[linkme(crate = ::ordo_core::__private::linkme)]
            static MODULE_CATALOG_ENTRY: ::ordo_core::CatalogEntry = ::ordo_core::CatalogEntry {
                name: #name,
                type_id: ::std::any::TypeId::of::<#self_ty>,
                type_name: ::std::any::type_name::<#self_ty>,
                create: || {
                    ::std::boxed::Box::new(<#self_ty as ::std::default::Default>::default())
                        as ::std::boxed::Box<dyn ::ordo_core::Module>
                },
            };
        };
    })
}

/// The unqualified type name, matching the default `Module::name`.
fn default_name(self_ty: &Type) -> syn::Result<LitStr> {
    if let Type::Path(type_path) = self_ty {
        if let Some(segment) = type_path.path.segments.last() {
            return Ok(LitStr::new(&segment.ident.to_string(), segment.ident.span()));
        }
    }
    Err(syn::Error::new_spanned(
        self_ty,
        "#[module(register)] needs `name = \"...\"` for this type",
    ))
}
