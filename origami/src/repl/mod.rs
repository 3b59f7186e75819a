//! REPL (Read-Eval-Print Loop) for origami
//!
//! One parser and one context live for the whole session, so variables,
//! functions, classes and `use` aliases carry over between lines.

use crate::error::{Error, ErrorKind, report_error};
use crate::interp::eval::exec_block;
use crate::interp::{Context, Control, Value, Vm};
use crate::parser::Parser;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const PROMPT: &str = "> ";
const HISTORY_FILE: &str = ".origami_history";
const SOURCE_NAME: &str = "<repl>";

/// What a line evaluated to.
#[derive(Debug)]
pub enum Outcome {
    Value(Value),
    Exit(i32),
    Error(Error),
}

/// Evaluation state shared by every line of a session.
pub struct Session {
    parser: Parser,
    ctx: Context,
}

impl Session {
    pub fn new(vm: Arc<Vm>) -> Self {
        let ctx = vm.create_context();
        Session {
            parser: Parser::new(vm),
            ctx,
        }
    }

    pub fn vm(&self) -> &Arc<Vm> {
        self.parser.vm()
    }

    /// Parse and run one unit of input in the session context.
    pub fn eval(&mut self, input: &str) -> Outcome {
        let program = match self.parser.parse_program(input) {
            Ok(program) => program,
            Err(err) => return Outcome::Error(err),
        };
        let result = exec_block(&program.statements, &self.ctx);
        self.vm().flush_output();
        match result {
            Ok(value) => Outcome::Value(value),
            Err(Control::Return(value)) => Outcome::Value(value),
            Err(Control::Returns(values)) => Outcome::Value(Value::array(values)),
            Err(Control::Exit(code)) => Outcome::Exit(code),
            Err(control) => Outcome::Error(
                control
                    .into_error()
                    .unwrap_or_else(|| Error::new(ErrorKind::Runtime, "unexpected control flow")),
            ),
        }
    }
}

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    session: Session,
    history_path: Option<PathBuf>,
}

impl Repl {
    pub fn new(vm: Arc<Vm>) -> RlResult<Self> {
        let mut editor = DefaultEditor::new()?;
        let history_path = dirs_home().map(|h| h.join(HISTORY_FILE));
        if let Some(path) = &history_path {
            let _ = editor.load_history(path);
        }
        Ok(Repl {
            editor,
            session: Session::new(vm),
            history_path,
        })
    }

    /// Run until `:quit`, EOF or `exit()`. Returns the exit code.
    pub fn run(&mut self) -> RlResult<i32> {
        println!("origami {}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for help, :quit to exit.\n");

        let mut code = 0;
        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);

                    if line.starts_with(':') {
                        if self.handle_command(line) {
                            break;
                        }
                        continue;
                    }

                    match self.session.eval(line) {
                        Outcome::Value(Value::Null) => {}
                        Outcome::Value(value) => println!("{value}"),
                        Outcome::Exit(exit) => {
                            code = exit;
                            break;
                        }
                        Outcome::Error(err) => report_error(SOURCE_NAME, line, &err),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(path) = &self.history_path {
            if let Err(err) = self.editor.save_history(path) {
                debug!(%err, "could not save history");
            }
        }
        Ok(code)
    }

    /// Handle `:` commands. Returns true to quit.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":quit" | ":q" | ":exit" => true,
            ":help" | ":h" | ":?" => {
                print_help();
                false
            }
            ":clear" => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help, :h, :?   Show this help");
    println!("  :quit, :q       Exit the REPL");
    println!("  :clear          Clear the screen");
    println!();
    println!("Statements run in one shared scope:");
    println!("  $x = 40;");
    println!("  function add($a, $b) {{ return $a + $b; }}");
    println!("  echo add($x, 2);");
}

fn dirs_home() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::OutputBuffer;

    fn session() -> (Session, OutputBuffer) {
        let out = OutputBuffer::new();
        (Session::new(Vm::with_output(Box::new(out.clone()))), out)
    }

    #[test]
    fn test_expression_value() {
        let (mut s, _) = session();
        assert!(matches!(s.eval("1 + 2;"), Outcome::Value(Value::Int(3))));
    }

    #[test]
    fn test_variables_persist() {
        let (mut s, out) = session();
        s.eval("$x = 40;");
        s.eval("echo $x + 2;");
        assert_eq!(out.contents(), "42");
    }

    #[test]
    fn test_functions_persist() {
        let (mut s, _) = session();
        s.eval("function twice($n) { return $n * 2; }");
        assert!(matches!(s.eval("twice(21);"), Outcome::Value(Value::Int(42))));
    }

    #[test]
    fn test_parse_error_keeps_session() {
        let (mut s, _) = session();
        s.eval("$y = 1;");
        assert!(matches!(s.eval("$y = ;"), Outcome::Error(_)));
        assert!(matches!(s.eval("$y;"), Outcome::Value(Value::Int(1))));
    }

    #[test]
    fn test_exit_code() {
        let (mut s, _) = session();
        assert!(matches!(s.eval("exit(3);"), Outcome::Exit(3)));
    }
}
