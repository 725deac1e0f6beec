//! Vesper CLI: execute files, evaluate snippets, or run the REPL.

use std::process;

use colored::Colorize;

use vesperlang::error::VesperError;
use vesperlang::repl::Repl;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Vesper {} - Vesper Interpreter", VERSION);
    eprintln!();
    eprintln!("Usage: vesper [options] [script.vsp]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>        Evaluate code directly");
    eprintln!("  --disassemble    Print compiled bytecode before running");
    eprintln!("  --help, -h       Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  vesper                      Start interactive REPL");
    eprintln!("  vesper script.vsp           Run a script file");
    eprintln!("  vesper -e 'print 1 + 1;'    Evaluate code directly");
    eprintln!("  vesper --disassemble fib.vsp  Dump bytecode, then run");
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut options = Options {
        command: Command::Repl,
        disassemble: false,
    };

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--disassemble" => {
                options.disassemble = true;
            }
            "-e" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-e requires a code argument");
                    print_usage();
                    process::exit(64);
                }
                options.command = Command::Eval {
                    code: args[i].clone(),
                };
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                print_usage();
                process::exit(64);
            }
            _ => {
                if let Command::Run { .. } = options.command {
                    eprintln!("Only one script file can be specified");
                    print_usage();
                    process::exit(64);
                }
                options.command = Command::Run { file: arg.clone() };
            }
        }
        i += 1;
    }

    options
}

fn main() {
    let options = parse_args();

    match &options.command {
        Command::Repl => Repl::new().run(),
        Command::Run { file } => run_file(file, &options),
        Command::Eval { code } => run_source(code, &options),
    }
}

fn run_file(file: &str, options: &Options) {
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}", format!("Could not read '{}': {}", file, err).red());
            process::exit(74);
        }
    };
    run_source(&source, options);
}

fn run_source(source: &str, options: &Options) {
    match vesperlang::run_with_options(source, options.disassemble) {
        Ok(()) => {}
        Err(VesperError::Compile(errors)) => {
            for err in &errors.0 {
                eprintln!("{}", err.to_string().red());
            }
            process::exit(65);
        }
        Err(VesperError::Runtime(err)) => {
            eprintln!("{}", err.to_string().red());
            process::exit(70);
        }
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            process::exit(70);
        }
    }
}
