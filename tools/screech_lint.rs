/// Screech Linter — parses story files and reports every diagnostic.
///
/// Usage: screech_lint <file>... [--config <options.ron>] [--strict] [--keep-comments]
use screech::core::parser::{parse_collect, ParseOptions};
use screech::core::template::Template;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: screech_lint <file>... [--config <options.ron>] [--strict] [--keep-comments]");
        process::exit(0);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    let mut config = None;
    let mut strict = false;
    let mut keep_comments = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config = Some(PathBuf::from(&args[i]));
            }
            "--strict" => strict = true,
            "--keep-comments" => keep_comments = true,
            other if other.starts_with("--") => {
                eprintln!("Unknown argument: {}", other);
                process::exit(2);
            }
            other => files.push(PathBuf::from(other)),
        }
        i += 1;
    }

    let mut options = match config {
        Some(ref path) => match ParseOptions::load_from_ron(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("ERROR: Failed to load options '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => ParseOptions::default(),
    };
    options.strict |= strict;
    options.keep_comments |= keep_comments;

    let mut failed = 0;
    let mut total_issues = 0;

    for path in &files {
        match lint_file(path, &options) {
            Ok(count) => total_issues += count,
            Err(message) => {
                eprintln!("ERROR: {}: {}", path.display(), message);
                failed += 1;
            }
        }
    }

    println!(
        "\nSummary: {} files, {} issues, {} failed",
        files.len(),
        total_issues,
        failed
    );

    if failed > 0 || (options.strict && total_issues > 0) {
        process::exit(1);
    }
}

/// Parse one file and print its issues. Returns the issue count.
fn lint_file(path: &Path, options: &ParseOptions) -> Result<usize, String> {
    let source = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let doc = Template::from_source(&source, Vec::new()).map_err(|e| e.to_string())?;
    let (tree, issues) = parse_collect(&doc, options).map_err(|e| e.to_string())?;

    println!("=== {} ===", path.display());
    println!(
        "  {} nodes, {} scopes",
        tree.len(),
        tree.scope_names().count()
    );
    for issue in &issues {
        println!("  {}", issue);
    }
    if issues.is_empty() {
        println!("  All checks passed!");
    }
    Ok(issues.len())
}
