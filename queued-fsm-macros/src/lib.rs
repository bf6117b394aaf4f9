// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Proc-macro helpers for `queued-fsm`.
//!
//! This crate is an implementation detail of `queued-fsm`. End users should depend on
//! `queued-fsm` and use the re-exported derives from that crate:
//! - `#[derive(queued_fsm::StateName, queued_fsm::EventName)]`

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive `::queued_fsm::StateName` for an enum.
///
/// Each variant is named by its identifier, ignoring any payload. `#[fsm(name = "...")]` on a
/// variant overrides the name.
///
/// ```rust,ignore
/// #[derive(queued_fsm::StateName)]
/// enum Light {
///     Red,
///     #[fsm(name = "amber")]
///     Yellow,
///     Green,
/// }
/// ```
#[proc_macro_derive(StateName, attributes(fsm))]
pub fn derive_state_name(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, codegen::NameTrait::State)
}

/// Derive `::queued_fsm::EventName` for an enum.
///
/// Same naming rules as `StateName`.
#[proc_macro_derive(EventName, attributes(fsm))]
pub fn derive_event_name(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input, codegen::NameTrait::Event)
}

fn expand(input: DeriveInput, target: codegen::NameTrait) -> TokenStream {
    match parse::NamedEnum::parse(input, target.trait_name()) {
        Ok(spec) => TokenStream::from(codegen::expand_names(&spec, target)),
        Err(err) => err.to_compile_error().into(),
    }
}

mod codegen;
mod parse;
