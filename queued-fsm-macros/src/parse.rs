// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Parsing of the enums the naming derives are applied to.

use std::collections::HashMap;

use syn::{Attribute, Data, DeriveInput, Fields, Generics, Ident, LitStr, Result};

/// An enum whose variants each resolve to a name.
pub struct NamedEnum {
    pub ident: Ident,
    pub generics: Generics,
    pub variants: Vec<NamedVariant>,
}

pub struct NamedVariant {
    pub ident: Ident,
    pub shape: Shape,
    pub name: String,
}

/// Which pattern matches the variant regardless of its payload.
#[derive(Clone, Copy)]
pub enum Shape {
    Unit,
    Tuple,
    Struct,
}

impl NamedEnum {
    pub fn parse(input: DeriveInput, trait_name: &str) -> Result<Self> {
        let data = match input.data {
            Data::Enum(data) => data,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    format!("{trait_name} can only be derived for enums"),
                ))
            }
        };

        let mut seen: HashMap<String, Ident> = HashMap::new();
        let mut variants = Vec::with_capacity(data.variants.len());
        for variant in data.variants {
            let name = match name_override(&variant.attrs)? {
                Some(name) => name,
                None => variant.ident.to_string(),
            };
            if name.is_empty() {
                return Err(syn::Error::new_spanned(
                    &variant.ident,
                    "fsm names must not be empty",
                ));
            }
            if let Some(first) = seen.get(&name) {
                return Err(syn::Error::new_spanned(
                    &variant.ident,
                    format!("name \"{name}\" is already used by variant `{first}`"),
                ));
            }
            seen.insert(name.clone(), variant.ident.clone());

            let shape = match variant.fields {
                Fields::Unit => Shape::Unit,
                Fields::Unnamed(_) => Shape::Tuple,
                Fields::Named(_) => Shape::Struct,
            };
            variants.push(NamedVariant {
                ident: variant.ident,
                shape,
                name,
            });
        }

        Ok(Self {
            ident: input.ident,
            generics: input.generics,
            variants,
        })
    }
}

/// Read `#[fsm(name = "...")]`, if present.
fn name_override(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut name = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("fsm")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported fsm attribute, expected `name = \"...\"`"))
            }
        })?;
    }
    Ok(name)
}
