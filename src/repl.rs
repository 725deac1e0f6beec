//! Interactive REPL with a persistent VM and a history file.

use std::io::{self, Write};
use std::path::PathBuf;

use colored::Colorize;

use crate::error::VesperError;
use crate::vm::Vm;

const HISTORY_FILE: &str = ".vesper_history";

pub struct Repl {
    vm: Vm,
    history: Vec<String>,
    history_file: PathBuf,
}

impl Repl {
    pub fn new() -> Self {
        let history_file = Self::history_path();
        let mut repl = Self {
            vm: Vm::new(),
            history: Vec::new(),
            history_file,
        };
        repl.load_history();
        repl
    }

    fn history_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(HISTORY_FILE),
            None => PathBuf::from(HISTORY_FILE),
        }
    }

    fn load_history(&mut self) {
        if let Ok(content) = std::fs::read_to_string(&self.history_file) {
            for line in content.lines() {
                if !line.trim().is_empty() {
                    self.history.push(line.to_string());
                }
            }
        }
    }

    fn save_history(&self) {
        let content = self.history.join("\n");
        let _ = std::fs::write(&self.history_file, content);
    }

    pub fn run(&mut self) {
        println!("Vesper {} - REPL", env!("CARGO_PKG_VERSION"));
        println!("Type exit to quit.\n");

        let stdin = io::stdin();

        loop {
            print!("{} ", ">".cyan());
            if io::stdout().flush().is_err() {
                break;
            }

            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) => {
                    self.save_history();
                    println!("Goodbye!");
                    break;
                }
                Ok(_) => {
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == ".exit" || line == "quit" {
                        self.save_history();
                        println!("Goodbye!");
                        break;
                    }

                    self.history.push(line.to_string());
                    self.eval(line);
                }
                Err(err) => {
                    eprintln!("{}", format!("Read error: {}", err).red());
                    break;
                }
            }
        }
    }

    /// One line, one execution. The VM persists, so globals accumulate and
    /// a runtime error leaves it ready for the next line.
    fn eval(&mut self, line: &str) {
        match self.vm.interpret(line) {
            Ok(()) => {}
            Err(VesperError::Compile(errors)) => {
                for err in &errors.0 {
                    eprintln!("{}", err.to_string().red());
                }
            }
            Err(err) => eprintln!("{}", err.to_string().red()),
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}
