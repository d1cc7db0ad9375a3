use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pulse::{
    lexer, parser,
    util::fmt::{tokens::print_tokens_string, tree::print_program_string},
    Census, Options,
};

mod target;

use target::{Target, DEFAULT_TARGET};

/// Compiles a pulse program to Cranelift IR or an object file.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file. Read from standard input when absent.
    input: Option<PathBuf>,

    /// Output file. Written to standard output when absent.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Emit::Ir)]
    emit: Emit,

    /// Target to compile for. Defaults to the host.
    #[arg(long, value_enum)]
    target: Option<Target>,

    /// Defaults to the input file name without its extension.
    #[arg(long, value_name = "NAME")]
    module_name: Option<String>,

    /// Print a summary of every stage to standard error.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Ir,
    Obj,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(&cli)
}

fn execute(cli: &Cli) -> Result<()> {
    let source = read_source(cli.input.as_deref())?;
    let module_name = match &cli.module_name {
        Some(name) => name.clone(),
        None => default_module_name(cli.input.as_deref()),
    };

    let output = match compile(cli, &source, &module_name) {
        Ok(output) => output,
        Err(error) => {
            report(&error);
            return Err(error).with_context(|| format!("failed to compile `{module_name}`"));
        }
    };
    write_output(cli.output.as_deref(), &output)
}

fn compile(cli: &Cli, source: &str, module_name: &str) -> Result<Vec<u8>, pulse::Error> {
    let tokens = lexer::tokenize(source)?;
    if cli.verbose {
        eprintln!("lexed {} tokens", tokens.len());
    }
    if cli.emit == Emit::Tokens {
        return Ok(print_tokens_string(&tokens).into_bytes());
    }

    let program = parser::parse(&tokens).map_err(|(_, errors)| pulse::Error::Parse(errors))?;
    if cli.verbose {
        eprintln!("parsed {}", Census::of(&program));
    }
    if cli.emit == Emit::Ast {
        return Ok(print_program_string(&program).into_bytes());
    }

    let target = cli.target.unwrap_or(DEFAULT_TARGET);
    let options = Options {
        module_name: module_name.to_owned(),
        target: target.into(),
    };
    let artifact = pulse::compile_program(&program, &options)?;
    for warning in &artifact.warnings {
        eprintln!("warning: {warning}");
    }
    if cli.verbose {
        let functions = artifact.module.defined_functions().count();
        eprintln!("generated {functions} functions for {target}");
    }
    match cli.emit {
        Emit::Obj => Ok(artifact.module.emit_object()?),
        _ => Ok(artifact.module.to_string().into_bytes()),
    }
}

/// Prints every diagnostic carried by `error`.
fn report(error: &pulse::Error) {
    match error {
        pulse::Error::Lex(error) => eprintln!("error: {error}"),
        pulse::Error::Parse(errors) => {
            for error in errors {
                eprintln!("error: {error}");
            }
        }
        pulse::Error::Codegen(diagnostics) => {
            for diagnostic in diagnostics {
                eprintln!("{}: {diagnostic}", diagnostic.severity);
            }
        }
        pulse::Error::Backend(error) => eprintln!("error: {error}"),
    }
}

fn read_source(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read standard input")?;
            Ok(buffer)
        }
    }
}

fn default_module_name(input: Option<&Path>) -> String {
    input
        .and_then(Path::file_stem)
        .map_or_else(|| "stdin".to_owned(), |stem| stem.to_string_lossy().into_owned())
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    let Some(path) = path else {
        return io::stdout()
            .write_all(bytes)
            .context("failed to write to standard output");
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))
}
