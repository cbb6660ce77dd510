// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! # Access rules
//!
//! Each collection carries five optional rules (`list`, `view`, `create`, `update`, `delete`)
//! written in a small predicate language such as
//! `@request.auth.id != "" && (uid = @request.auth.id || manager = @request.auth.id)`.
//!
//! This crate holds everything about rules that doesn't need a record store: the AST and its
//! serialized form ([`ast`]), the parser ([`compile`]), the collection schema the rules are
//! attached to ([`collection`]), records ([`record`]), and schema-aware validation performed
//! when a collection is saved ([`validation`]).

pub mod ast;
pub mod collection;
pub mod error;
pub mod record;
pub mod validation;

mod lexer;
mod parser;

pub use parser::compile;
