//! The object-spec mini-language (§4.4): a small declarative grammar for
//! record shapes, plus the parser, generator and validator built around
//! it. See `ast` for the tree the parser produces, `parser` for the
//! grammar itself, `generate` for turning a tree into record data, and
//! `validate` for checking record data back against a tree.
//!
//! ## Top-level bin count
//!
//! `ObjSpec::n_bins` is the sum of each top-level bin's `mult` (default 1)
//! — directly what `spec := bin ("," bin)*` describes, with `bin := [mult
//! "*"] value`. For `"I,D,{3*S10:[B20,D,I8]}"` that is 3 (`I`, `D`, the
//! map), not 4: none of the three top-level items carries a `mult`
//! prefix, and the map's internal `3*S10` only repeats the map's *key*,
//! not the top-level bin itself.

pub mod ast;
pub mod generate;
pub mod parser;
pub mod validate;

pub use ast::{BinSpec, MapEntry, ObjSpec, ValueSpec};
pub use generate::{GenerateError, bin_name, populate, worst_case_bin_name_len};
pub use parser::{ParseError, parse};
pub use validate::{ValidateError, assert_valid};
