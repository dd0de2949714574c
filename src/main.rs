use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, bail};
use log::debug;

use plcc::analyzer::Analyzer;
use plcc::environment::Environment;
use plcc::generator;
use plcc::interpreter::Interpreter;
use plcc::{lexer, parser};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let mut emit = false;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--emit" | "-e" => {
                emit = true;
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let tokens = lexer::tokenize(&source)?;
    debug!("lexed {} tokens", tokens.len());
    let mut program = parser::parse_tokens(tokens)?;
    debug!(
        "parsed {} fields and {} methods",
        program.fields.len(),
        program.methods.len()
    );

    let environment = Environment::standard()?;
    Analyzer::new(&environment).analyze(&mut program)?;
    debug!("analysis complete");

    if emit {
        println!("{}", generator::generate(&program)?);
    } else {
        let value = Interpreter::new(&environment).run(&program)?;
        println!("{value}");
    }
    Ok(())
}
