//! origami CLI

use clap::{ArgAction, Args, Parser, Subcommand};
use origami::config::{CONFIG_FILE, Config};
use origami::error::{Error, report_error};
use origami::interp::{Control, Vm};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "origami", version, about = "origami scripting language")]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a source file
    Run {
        /// Source file; defaults to `project.entry` from the config
        file: Option<PathBuf>,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Parse a file and dump the AST
    Parse {
        file: PathBuf,
        /// Emit JSON instead of the debug tree
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Tokenize a file and dump the tokens
    Tokens { file: PathBuf },
    /// Start an interactive session
    Repl {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Config file (default: origami.toml next to the file, or in the
    /// current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Namespace root, NS=DIR; may repeat
    #[arg(short = 'n', long = "namespace", value_name = "NS=DIR")]
    namespaces: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { file, project } => {
            load_config(&project, file.as_deref()).and_then(|config| {
                setup_logging(cli.verbose, cli.quiet, config.log_level.as_deref());
                run_file(file, &config)
            })
        }
        Command::Parse {
            file,
            json,
            project,
        } => load_config(&project, Some(&file)).and_then(|config| {
            setup_logging(cli.verbose, cli.quiet, config.log_level.as_deref());
            parse_file(&file, json, &config)
        }),
        Command::Tokens { file } => {
            setup_logging(cli.verbose, cli.quiet, None);
            tokenize_file(&file)
        }
        Command::Repl { project } => load_config(&project, None).and_then(|config| {
            setup_logging(cli.verbose, cli.quiet, config.log_level.as_deref());
            run_repl(&config)
        }),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins, then `-q`/`-v`, then `log_level` from the config.
/// Logs go to stderr so program output stays clean.
fn setup_logging(verbose: u8, quiet: bool, configured: Option<&str>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if quiet => EnvFilter::new("error"),
        Err(_) => match verbose {
            0 => EnvFilter::new(configured.unwrap_or("warn")),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        },
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .try_init();
}

fn load_config(args: &ProjectArgs, file: Option<&Path>) -> Result<Config, Error> {
    let path = match (&args.config, file.and_then(Path::parent)) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => dir.join(CONFIG_FILE),
        (None, None) => PathBuf::from(CONFIG_FILE),
    };
    let mut config = Config::load(&path)?;
    for flag in &args.namespaces {
        config.add_namespace_flag(flag)?;
    }
    Ok(config)
}

fn create_vm(config: &Config) -> Arc<Vm> {
    let vm = Vm::new();
    config.apply(&vm);
    vm
}

fn run_file(file: Option<PathBuf>, config: &Config) -> Result<u8, Error> {
    let Some(path) = file.or_else(|| config.entry()) else {
        return Err(Error::io_error(
            "no file given and no `project.entry` in the config",
        ));
    };
    let vm = create_vm(config);
    info!(path = %path.display(), "running");

    let result = vm.load_and_run(&path);
    vm.flush_output();
    match result {
        Ok(_) => Ok(0),
        Err(Control::Exit(code)) => {
            debug!(code, "exit");
            Ok(code.clamp(0, 255) as u8)
        }
        Err(control) => match control.into_error() {
            Some(err) => {
                report(&path, &err);
                Ok(1)
            }
            None => Err(Error::io_error("unexpected control flow at top level")),
        },
    }
}

/// Render an error against the file it points into.
fn report(entry: &Path, err: &Error) {
    let file = err
        .file
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| entry.to_path_buf());
    match std::fs::read_to_string(&file) {
        Ok(source) => report_error(&file.display().to_string(), &source, err),
        Err(_) => eprintln!("{}: {err}", err.kind.label()),
    }
}

fn parse_file(path: &Path, json: bool, config: &Config) -> Result<u8, Error> {
    let source = std::fs::read_to_string(path)?;
    let vm = create_vm(config);
    let mut parser = origami::parser::Parser::new(vm);
    parser.set_file(path);

    match parser.parse_program(&source) {
        Ok(program) if json => {
            let text = serde_json::to_string_pretty(&program)
                .map_err(|err| Error::io_error(err.to_string()))?;
            println!("{text}");
            Ok(0)
        }
        Ok(program) => {
            println!("{:#?}", program.statements);
            Ok(0)
        }
        Err(err) => {
            report_error(&path.display().to_string(), &source, &err);
            Ok(1)
        }
    }
}

fn tokenize_file(path: &Path) -> Result<u8, Error> {
    let source = std::fs::read_to_string(path)?;
    match origami::lexer::tokenize(&source) {
        Ok(tokens) => {
            for token in &tokens {
                println!(
                    "{:?} {:?} @ {}:{}",
                    token.kind,
                    token.literal,
                    token.line(),
                    token.column()
                );
            }
            Ok(0)
        }
        Err(err) => {
            report_error(&path.display().to_string(), &source, &err);
            Ok(1)
        }
    }
}

fn run_repl(config: &Config) -> Result<u8, Error> {
    let vm = create_vm(config);
    let mut repl =
        origami::repl::Repl::new(vm).map_err(|err| Error::io_error(err.to_string()))?;
    let code = repl.run().map_err(|err| Error::io_error(err.to_string()))?;
    Ok(code.clamp(0, 255) as u8)
}
