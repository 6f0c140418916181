// flux_core: lexer, parser, and tree-walking evaluator for the flux
// language.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod util;

pub mod ast;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod value;

use error::FluxError;
use interpreter::Interpreter;
use lexer::Lexer;
use parser::Parser;
use value::Value;

/// Runs a complete program through the lex -> parse -> interpret pipeline,
/// as used by `src/bin/flux.rs`.
pub fn run(source: &str) -> Result<Value, FluxError> {
    let tokens = Lexer::new(source).scan_tokens()?;
    let stmts = Parser::new(tokens).parse_program()?;
    Interpreter::new().interpret(&stmts).map_err(FluxError::from)
}
