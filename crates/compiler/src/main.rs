//! Asthra Compiler CLI
//!
//! Command-line driver for the semantic-analysis and code-generation core.
//! The parser is a separate tool; this driver consumes its serialized AST
//! (JSON) and produces diagnostics or an IR listing for the back-end
//! formatter.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use asthrac::diagnostics::DiagnosticReporter;
use asthrac::{analyze_program_with_config, generate_program, CompilerConfig, Program};

#[derive(ClapParser)]
#[command(name = "asthrac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Asthra compiler core - analyze and lower parser-emitted ASTs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run semantic analysis and report diagnostics
    Check {
        /// Parser-emitted AST file (JSON)
        input: PathBuf,

        /// Emit diagnostics as stable JSON instead of human text
        #[arg(long)]
        json: bool,

        /// Path to a compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Analyze and lower to the IR listing
    Build {
        /// Parser-emitted AST file (JSON)
        input: PathBuf,

        /// Output listing path (defaults to the input filename with .ir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print code generation statistics
        #[arg(long)]
        stats: bool,

        /// Path to a compiler configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            input,
            json,
            config,
        } => run_check(&input, json, config.as_deref()),
        Commands::Build {
            input,
            output,
            stats,
            config,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("ir"));
            run_build(&input, &output, stats, config.as_deref());
        }
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "asthrac", &mut io::stdout());
}

fn load_config(path: Option<&Path>) -> CompilerConfig {
    match path {
        Some(path) => match CompilerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    }
}

fn load_ast(path: &Path) -> Program {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match serde_json::from_str(&contents) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: {} is not a valid AST file: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn print_diagnostics(reporter: &DiagnosticReporter, json: bool) {
    if reporter.is_empty() {
        return;
    }
    if json {
        println!("{}", reporter.to_json());
    } else {
        print!("{}", reporter.render_human());
    }
}

fn run_check(input: &Path, json: bool, config_path: Option<&Path>) {
    let config = load_config(config_path);
    let mut program = load_ast(input);
    let analysis = analyze_program_with_config(&mut program, &config);
    print_diagnostics(&analysis.reporter, json || config.json_diagnostics);
    if analysis.reporter.has_errors() {
        process::exit(1);
    }
}

fn run_build(input: &Path, output: &Path, stats: bool, config_path: Option<&Path>) {
    let config = load_config(config_path);
    let mut program = load_ast(input);
    let mut analysis = analyze_program_with_config(&mut program, &config);
    print_diagnostics(&analysis.reporter, config.json_diagnostics);
    if analysis.reporter.has_errors() {
        process::exit(1);
    }

    let module = match generate_program(&mut analysis, &program) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = std::fs::write(output, module.to_string()) {
        eprintln!("Error: failed to write {}: {}", output.display(), e);
        process::exit(1);
    }
    println!(
        "Compiled {} -> {} ({})",
        input.display(),
        output.display(),
        config.target.as_str()
    );
    if stats {
        println!("{}", module.stats.summary());
    }
}
