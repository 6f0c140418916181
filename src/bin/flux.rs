// CLI driver: lex, dump tokens, parse, dump the AST, then interpret.
// Deliberately thin — all semantics live in flux_core (spec.md section 1's
// "driver itself is out of scope" framing).

use std::env;
use std::fs;
use std::process;

use flux_core::error::FluxError;
use flux_core::interpreter::Interpreter;
use flux_core::lexer::Lexer;
use flux_core::parser::Parser;

fn main() {
    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "flux".to_string());
    let path = match args.next() {
        Some(p) => p,
        None => {
            eprintln!("usage: {} <source-file>", program);
            process::exit(1);
        }
    };

    let source = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading '{}': {}", path, e);
            process::exit(1);
        }
    };

    if let Err(err) = run(&source) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(source: &str) -> Result<(), FluxError> {
    let tokens = Lexer::new(source).scan_tokens()?;
    for tok in &tokens {
        println!("{}: {:?} '{}'", tok.line, tok.kind, tok.lexeme);
    }

    let stmts = Parser::new(tokens).parse_program()?;
    for stmt in &stmts {
        println!("{:?}", stmt);
    }

    Interpreter::new().interpret(&stmts)?;
    Ok(())
}
