/// Screech Player — reads a story file at the terminal.
///
/// Usage: screech_play <file> [--config <options.ron>] [--auto] [--seed <n>] [--max <steps>]
///
/// Interactive mode prints each line and waits for a choice number when
/// options are offered. `--auto` picks choices at random from a seeded RNG,
/// stopping after `--max` steps.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use screech::core::parser::{parse_collect, ParseOptions};
use screech::core::reader::{Output, Reader};
use screech::core::template::Template;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    println!("Usage: screech_play <file> [--config <options.ron>] [--auto] [--seed <n>] [--max <steps>]");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut file = None;
    let mut config = None;
    let mut auto = false;
    let mut seed: u64 = 42;
    let mut max_steps: usize = 1000;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config = Some(PathBuf::from(&args[i]));
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--max" if i + 1 < args.len() => {
                i += 1;
                max_steps = args[i].parse().unwrap_or(1000);
            }
            "--auto" => auto = true,
            other if !other.starts_with("--") && file.is_none() => {
                file = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(file) = file else {
        print_usage();
        process::exit(1);
    };

    let options = match config {
        Some(ref path) => ParseOptions::load_from_ron(path).unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load options '{}': {}", path.display(), e);
            process::exit(1);
        }),
        None => ParseOptions::default(),
    };

    let source = std::fs::read_to_string(&file).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to read '{}': {}", file.display(), e);
        process::exit(1);
    });
    let doc = Template::from_source(&source, Vec::new()).unwrap_or_else(|e| {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    });
    let (tree, issues) = parse_collect(&doc, &options).unwrap_or_else(|e| {
        eprintln!("ERROR: {}", e);
        process::exit(1);
    });
    for issue in &issues {
        eprintln!("WARNING: {}", issue);
    }
    if options.strict && !issues.is_empty() {
        process::exit(1);
    }

    let mut reader = Reader::new(Arc::new(tree), ());
    let mut rng = StdRng::seed_from_u64(seed);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut steps = 0;

    loop {
        if auto && steps >= max_steps {
            println!("\n(stopped after {} steps)", steps);
            break;
        }
        steps += 1;

        match reader.try_advance() {
            Ok(true) => {}
            Ok(false) => {
                println!("\n(the end)");
                break;
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                process::exit(1);
            }
        }

        let count = match reader.output() {
            Some(Output::Line(line)) => {
                println!("{}", line);
                continue;
            }
            Some(Output::Choices(options)) => {
                println!();
                for (n, option) in options.iter().enumerate() {
                    println!("  {}. {}", n + 1, option);
                }
                options.len()
            }
            None => continue,
        };

        let picked = if auto {
            let picked = rng.gen_range(0..count);
            println!("> {}", picked + 1);
            picked
        } else {
            match prompt_choice(&stdin, &mut stdout, count) {
                Some(picked) => picked,
                None => break,
            }
        };

        if let Err(e) = reader.try_choose(picked) {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    }
}

/// Ask until a valid 1-based choice is entered. `None` on EOF or `quit`.
fn prompt_choice(stdin: &io::Stdin, stdout: &mut io::Stdout, count: usize) -> Option<usize> {
    loop {
        print!("choice> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            return None;
        }
        let line = line.trim();
        if matches!(line, "quit" | "exit" | "q") {
            return None;
        }
        match line.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => return Some(n - 1),
            _ => println!("Enter a number from 1 to {}.", count),
        }
    }
}
