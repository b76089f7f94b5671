use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use console::style;
use vsl::{compile, has_entry_point, run_main};
use vsl_ir::object::write_object;
use vsl_source::Source;

const USAGE: &str = "usage: vsl <input-file> [-r] [-h] [-obj]

options:
  -r      write the textual IR to <input>.ll
  -obj    write the object file to <input>.o
  -h      print this message";

/// Command line options.
#[derive(Debug, Clone, PartialEq)]
struct Options {
    input: PathBuf,
    emit_ir: bool,
    emit_object: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Compile(Options),
    Help,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let mut input = None;
    let mut emit_ir = false;
    let mut emit_object = false;

    for arg in args {
        match arg.as_str() {
            "-h" => return Ok(Command::Help),
            "-r" => emit_ir = true,
            "-obj" => emit_object = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option `{}`", flag)),
            _ if input.is_some() => return Err(format!("unexpected argument `{}`", arg)),
            _ => input = Some(PathBuf::from(arg)),
        }
    }

    match input {
        Some(input) => Ok(Command::Compile(Options {
            input,
            emit_ir,
            emit_object,
        })),
        None => Err("no input file".to_string()),
    }
}

fn error(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

fn write_output(path: &Path, contents: &[u8]) -> bool {
    match fs::write(path, contents) {
        Ok(()) => true,
        Err(err) => {
            error(format!("could not write `{}`: {}", path.display(), err));
            false
        }
    }
}

fn run(options: &Options) -> bool {
    let content = match fs::read_to_string(&options.input) {
        Ok(content) => content,
        Err(err) => {
            error(format!(
                "could not read `{}`: {}",
                options.input.display(),
                err
            ));
            return false;
        }
    };

    let module_name = options
        .input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());

    let source = Source::new(&content);
    let module = compile(&source, &module_name);
    if !source.has_no_errors() {
        for err in source.errors.errors() {
            error(err);
        }
        return false;
    }

    if options.emit_ir {
        let ir = module.to_string();
        if !write_output(&options.input.with_extension("ll"), ir.as_bytes()) {
            return false;
        }
    }
    if options.emit_object {
        let object = write_object(&module);
        if !write_output(&options.input.with_extension("o"), &object) {
            return false;
        }
    }

    if has_entry_point(&module) {
        match run_main(&module, io::stdout()) {
            Ok(value) => eprintln!("Evaluated to {}", value),
            Err(err) => {
                error(err);
                return false;
            }
        }
    }

    true
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Compile(options)) => options,
        Ok(Command::Help) => {
            eprintln!("{}", USAGE);
            process::exit(1);
        }
        Err(message) => {
            error(message);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    if !run(&options) {
        process::exit(1);
    }
}
