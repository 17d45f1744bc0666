mod test_runner;

use std::path::Path;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use jcsv::metadata::{DTYPES_KEY, REFS_KEY};
use jcsv::parser::metadata::parse_metadata_reporting;
use jcsv::{Document, ParseError, Parsed, Writer};

const SUBCOMMANDS: &[&str] = &["inspect", "check", "fmt", "meta", "test", "help"];

#[derive(Parser)]
#[command(name = "jcsv", version, about = "Read, check and rewrite JCSV files")]
struct Cli {
    /// Disable colored diagnostics
    #[arg(long, global = true)]
    no_color: bool,

    /// More log output on stderr (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show diagnostics and the blocks of a file
    Inspect(InspectArgs),

    /// Report diagnostics and exit non-zero on errors
    Check(CheckArgs),

    /// Rewrite a file with a freshly computed manifest
    Fmt(FmtArgs),

    /// Print or edit one block's metadata
    Meta(MetaArgs),

    /// Run .test.jcsv fixture files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct InspectArgs {
    /// JCSV file to read
    file: String,

    /// Dump the parsed document
    #[arg(long)]
    ast: bool,

    /// Print the manifest entries as read from the file
    #[arg(long)]
    manifest: bool,

    /// Print resolved reference edges
    #[arg(long)]
    refs: bool,
}

#[derive(clap::Args)]
struct CheckArgs {
    file: String,

    /// Treat warnings as errors
    #[arg(long)]
    strict: bool,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Write to this file instead of stdout
    #[arg(short, long, conflicts_with = "in_place")]
    output: Option<String>,

    /// Overwrite the input file
    #[arg(long)]
    in_place: bool,
}

#[derive(clap::Args)]
struct FmtArgs {
    file: String,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(clap::Args)]
struct MetaArgs {
    file: String,

    /// Block name
    block: String,

    /// Set a key (`key=value`, lists as `key=[a,b]`). Repeatable.
    #[arg(long, value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Remove a key. Repeatable.
    #[arg(long, value_name = "KEY")]
    unset: Vec<String>,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.jcsv file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `jcsv file.jcsv` works like `jcsv inspect file.jcsv`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().skip(1).position(|a| !a.starts_with('-')) {
        if !SUBCOMMANDS.contains(&args[pos + 1].as_str()) {
            args.insert(pos + 1, "inspect".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    setup_tracing(cli.verbose);

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    match cli.command {
        Command::Inspect(args) => do_inspect(args, color_choice),
        Command::Check(args) => do_check(args, color_choice),
        Command::Fmt(args) => do_fmt(args, color_choice),
        Command::Meta(args) => do_meta(args, color_choice),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn setup_tracing(verbose: u8) {
    let default = match verbose {
        0 => "jcsv=warn",
        1 => "jcsv=debug",
        _ => "jcsv=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// A parsed input file plus the codespan database its diagnostics point into.
struct Loaded {
    files: SimpleFiles<String, String>,
    parsed: Parsed,
}

fn load(path: &str) -> Loaded {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path, e);
            process::exit(1);
        }
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(path.to_string(), source.clone());
    let parsed = jcsv::Parser::new(source, file_id).parse();
    debug!(path, tables = parsed.document.len(), diagnostics = parsed.diagnostics.len(), "loaded");
    Loaded { files, parsed }
}

fn emit_diagnostics(color_choice: ColorChoice, files: &SimpleFiles<String, String>, diagnostics: &[ParseError]) {
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    for error in diagnostics {
        let diagnostic = error.to_diagnostic();
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &diagnostic);
    }
}

fn do_inspect(args: InspectArgs, color_choice: ColorChoice) {
    let Loaded { files, parsed } = load(&args.file);
    emit_diagnostics(color_choice, &files, &parsed.diagnostics);
    let document = &parsed.document;

    if args.ast {
        println!("{:#?}", document);
        return;
    }

    if args.manifest {
        match document.manifest() {
            Some(manifest) => {
                for (name, entry) in manifest.iter() {
                    println!("{} line {} {}", name, entry.start_line, entry.description);
                }
            }
            None => eprintln!("(no manifest)"),
        }
        return;
    }

    if args.refs {
        for edge in document.references() {
            println!("{}.{} -> {}", edge.from, edge.column, edge.to);
        }
        return;
    }

    for (name, table) in document.tables() {
        let line = document.block(name).map_or(0, |b| b.line);
        let columns: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("{}:{}", c.name, c.data.column_type()))
            .collect();
        println!(
            "#{} (line {}) {}x{} {}",
            name,
            line,
            table.row_count(),
            table.column_count(),
            columns.join(" ")
        );
    }
}

fn do_check(args: CheckArgs, color_choice: ColorChoice) {
    let Loaded { files, parsed } = load(&args.file);
    emit_diagnostics(color_choice, &files, &parsed.diagnostics);

    let errors = parsed.errors().count();
    let warnings = parsed.warnings().count();
    if errors > 0 || (args.strict && warnings > 0) {
        eprintln!("{}: {} error(s), {} warning(s)", args.file, errors, warnings);
        process::exit(1);
    }
    eprintln!("ok: {} parsed successfully ({} tables)", args.file, parsed.document.len());
}

fn do_fmt(args: FmtArgs, color_choice: ColorChoice) {
    let Loaded { files, parsed } = load(&args.file);
    emit_diagnostics(color_choice, &files, &parsed.diagnostics);
    // Skipped blocks would be lost on rewrite.
    if parsed.has_errors() {
        eprintln!("error: not rewriting '{}' because blocks were skipped", args.file);
        process::exit(1);
    }
    write_out(&parsed.document, &args.file, &args.out);
}

fn do_meta(args: MetaArgs, color_choice: ColorChoice) {
    let Loaded { files, mut parsed } = load(&args.file);
    emit_diagnostics(color_choice, &files, &parsed.diagnostics);

    let Some(metadata) = parsed.document.metadata_mut(&args.block) else {
        eprintln!("error: no block named '{}' in '{}'", args.block, args.file);
        process::exit(1);
    };

    if args.set.is_empty() && args.unset.is_empty() {
        for (key, value) in metadata.iter() {
            println!("{}={}", key, value);
        }
        return;
    }

    for key in &args.unset {
        reject_reserved(key);
        if metadata.remove(key).is_none() {
            eprintln!("warning: block '{}' has no key '{}'", args.block, key);
        }
    }

    for assignment in &args.set {
        let Some((key, _)) = assignment.split_once('=') else {
            eprintln!("error: expected KEY=VALUE, got '{}'", assignment);
            process::exit(2);
        };
        reject_reserved(key.trim());
        let (parsed_value, dropped) = parse_metadata_reporting(assignment);
        let value = match parsed_value.iter().next() {
            Some((_, value)) if parsed_value.len() == 1 && dropped.is_empty() && value.is_representable() => {
                value.clone()
            }
            _ => {
                eprintln!("error: '{}' is not a single metadata entry", assignment);
                process::exit(2);
            }
        };
        metadata.insert(key.trim(), value);
    }

    if parsed.has_errors() {
        eprintln!("error: not rewriting '{}' because blocks were skipped", args.file);
        process::exit(1);
    }
    write_out(&parsed.document, &args.file, &args.out);
}

/// `dtypes` and `refs` are derived from the table when writing.
fn reject_reserved(key: &str) {
    if key == DTYPES_KEY || key == REFS_KEY {
        eprintln!("error: '{}' is derived from the table and cannot be edited", key);
        process::exit(2);
    }
}

fn write_out(document: &Document, input: &str, out: &OutputArgs) {
    let writer = Writer::from_document(document);
    let target = if out.in_place {
        Some(input)
    } else {
        out.output.as_deref()
    };

    let result = match target {
        Some(path) => writer.write_file(path),
        None => writer.write_to(std::io::stdout().lock()),
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
