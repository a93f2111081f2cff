//! specmock stub linter CLI
//!
//! Usage:
//!   specmock-lint <file_or_directory>... [OPTIONS]

use clap::{Parser, ValueEnum};
use specmock_lint::{fix_stub, lint_paths, load_stub_file, LintOptions, LintResult, Severity};
use specmock_stub::stub::discover_stub_files;
use specmock_stub::Contract;
use std::path::PathBuf;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// specmock stub linter
#[derive(Parser, Debug)]
#[command(name = "specmock-lint")]
#[command(author, version, about = "Validate specmock stub files before loading them")]
struct Args {
    /// Stub files or directories containing stub files
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Contract files to validate stubs against
    #[arg(short, long = "contract", value_delimiter = ',')]
    contracts: Vec<PathBuf>,

    /// Rename misspelled keys and join array header values in place
    #[arg(short, long)]
    fix: bool,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Only show errors (hide warnings and info)
    #[arg(short = 'e', long)]
    errors_only: bool,

    #[arg(short, long)]
    verbose: bool,

    /// Treat warnings as errors
    #[arg(short, long)]
    strict: bool,
}

fn main() {
    let args = Args::parse();
    let text = args.output == OutputFormat::Text;

    if text {
        println!("{BOLD}{CYAN}specmock stub linter{RESET}");
        println!("{DIM}{RULE}{RESET}");
    }

    let contract = if args.contracts.is_empty() {
        None
    } else {
        match Contract::from_files(&args.contracts) {
            Ok(contract) => Some(contract),
            Err(e) => {
                eprintln!("{RED}Failed to load contract:{RESET} {e}");
                std::process::exit(2);
            }
        }
    };

    let files = discover_stub_files(&args.paths);
    if files.is_empty() {
        if text {
            println!("{YELLOW}Warning:{RESET} No JSON files found");
        }
        std::process::exit(0);
    }

    if args.fix {
        apply_fixes(&files, text);
    }

    let options = LintOptions {
        verbose: args.verbose,
        contract,
    };
    if text {
        for path in &args.paths {
            println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}", path.display());
        }
        println!("{DIM}Found:{RESET}    {BOLD}{}{RESET} stub file(s)", files.len());
        if options.verbose {
            for file in &files {
                println!("  {DIM}{}{RESET}", file.display());
            }
        }
    }

    let result = lint_paths(&args.paths, &options);

    match args.output {
        OutputFormat::Json => print_results_json(&result),
        OutputFormat::Text => print_results(&result, &args),
    }

    std::process::exit(if result.fails(args.strict) { 1 } else { 0 });
}

fn print_results_json(result: &LintResult) {
    match serde_json::to_string_pretty(result) {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("{RED}Failed to serialize results: {e}{RESET}"),
    }
}

fn print_results(result: &LintResult, args: &Args) {
    println!();

    let by_file = result.by_file(args.errors_only);

    if by_file.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    }

    for (file, issues) in &by_file {
        let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
        let warnings = issues.iter().filter(|i| i.severity == Severity::Warning).count();

        let status = match (errors, warnings) {
            (0, 0) => format!("{CYAN}INFO{RESET}"),
            (0, _) => format!("{YELLOW}WARN{RESET}"),
            _ => format!("{RED}FAIL{RESET}"),
        };
        let mut counts = Vec::new();
        if errors > 0 {
            counts.push(format!("{RED}{errors} error(s){RESET}"));
        }
        if warnings > 0 {
            counts.push(format!("{YELLOW}{warnings} warning(s){RESET}"));
        }
        let counts = if counts.is_empty() {
            String::new()
        } else {
            format!(" {DIM}({RESET}{}{DIM}){RESET}", counts.join(", "))
        };

        println!("{status} {BOLD}{CYAN}{}{RESET}{counts}", file.display());

        for issue in issues {
            let color = severity_color(issue.severity);
            let marker = format!("{color}|{RESET}");
            let location = issue
                .location
                .as_ref()
                .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
                .unwrap_or_default();

            println!(
                "  {marker} {location}{BOLD}{color}{}{RESET}: {} {DIM}({color}{}{DIM}){RESET}",
                issue.severity.label(),
                issue.message,
                issue.code
            );
            if let Some(suggestion) = &issue.suggestion {
                for line in suggestion.lines() {
                    println!("  {marker}   {GREEN}-> {line}{RESET}");
                }
            }
        }
        println!();
    }

    println!("{DIM}{RULE}{RESET}");
    println!("{BOLD}{CYAN}Summary{RESET}");
    println!("{DIM}{RULE}{RESET}");
    println!("  {DIM}Files checked:{RESET} {BOLD}{}{RESET}", result.files_checked);

    if result.errors > 0 {
        println!("  {RED}Errors:{RESET}    {BOLD}{RED}{}{RESET}", result.errors);
    } else {
        println!("  {GREEN}Errors:{RESET}    {BOLD}{GREEN}0{RESET}");
    }
    if result.warnings > 0 {
        println!("  {YELLOW}Warnings:{RESET}  {BOLD}{YELLOW}{}{RESET}", result.warnings);
    } else {
        println!("  {DIM}Warnings:{RESET}  {BOLD}0{RESET}");
    }
    println!();

    if result.errors == 0 && result.warnings == 0 {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    } else if result.errors == 0 {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{RED}{BOLD}Linting failed with errors{RESET}");
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}

fn apply_fixes(files: &[PathBuf], text: bool) {
    let mut applied = 0;

    for file in files {
        // unparseable files are reported by the lint pass
        let Ok(mut stub) = load_stub_file(file) else {
            continue;
        };
        let fixes = fix_stub(&mut stub);
        if fixes.is_empty() {
            continue;
        }

        let written = serde_json::to_string_pretty(&stub)
            .map_err(|e| e.to_string())
            .and_then(|content| std::fs::write(file, content).map_err(|e| e.to_string()));
        match written {
            Ok(()) => {
                applied += fixes.len();
                if text {
                    println!("{GREEN}Fixed:{RESET} {}", file.display());
                    for fix in &fixes {
                        println!("  {DIM}{fix}{RESET}");
                    }
                }
            }
            Err(e) => eprintln!("{RED}Error writing {}: {e}{RESET}", file.display()),
        }
    }

    if text && applied > 0 {
        println!("{GREEN}Applied {applied} fix(es){RESET}\n");
    }
}
