// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;

use crate::parse::{NamedEnum, Shape};

#[derive(Clone, Copy)]
pub enum NameTrait {
    State,
    Event,
}

impl NameTrait {
    pub fn trait_name(self) -> &'static str {
        match self {
            NameTrait::State => "StateName",
            NameTrait::Event => "EventName",
        }
    }
}

/// Expand a parsed enum into its `::queued_fsm::{StateName, EventName}` impl.
pub fn expand_names(spec: &NamedEnum, target: NameTrait) -> TokenStream2 {
    let ident = &spec.ident;
    let (impl_generics, ty_generics, where_clause) = spec.generics.split_for_impl();

    let arms = spec.variants.iter().map(|variant| {
        let variant_ident = &variant.ident;
        let name = &variant.name;
        match variant.shape {
            Shape::Unit => quote! { Self::#variant_ident => #name, },
            Shape::Tuple => quote! { Self::#variant_ident(..) => #name, },
            Shape::Struct => quote! { Self::#variant_ident { .. } => #name, },
        }
    });

    let (trait_path, method) = match target {
        NameTrait::State => (quote! { ::queued_fsm::StateName }, quote! { as_state_name }),
        NameTrait::Event => (quote! { ::queued_fsm::EventName }, quote! { as_event_name }),
    };

    quote! {
        impl #impl_generics #trait_path for #ident #ty_generics #where_clause {
            fn #method(&self) -> &str {
                match *self {
                    #( #arms )*
                }
            }
        }
    }
}
