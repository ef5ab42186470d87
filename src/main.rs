use std::io::{self, BufRead};
use std::path::PathBuf;

use gleaner::DefinitionReader;

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    if let Err(code) = run(&config) {
        std::process::exit(code);
    }
}

struct CliConfig {
    definitions: PathBuf,
    id_key: Option<String>,
    safe: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut definitions: Option<PathBuf> = None;
    let mut id_key: Option<String> = None;
    let mut safe = false;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("gleaner {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--safe" => safe = true,
            "--id-key" => {
                let value = args.next().ok_or_else(|| "error: --id-key expects a value".to_string())?;
                id_key = Some(value);
            }
            _ if arg.starts_with("--id-key=") => {
                id_key = Some(arg.trim_start_matches("--id-key=").to_string());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                if definitions.is_some() {
                    return Err("error: definitions file provided multiple times".to_string());
                }
                definitions = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(definitions) = definitions else {
        return Err(format!("error: no definitions file provided\n\n{}", help_text()));
    };

    Ok(CliConfig { definitions, id_key, safe })
}

fn run(config: &CliConfig) -> Result<(), i32> {
    let reader = DefinitionReader::from_file(&config.definitions).map_err(|err| {
        eprintln!("error: can not read '{}': {err}", config.definitions.display());
        2
    })?;
    let extractor = reader.read().map_err(|err| {
        eprintln!("error: {err}");
        2
    })?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| {
            eprintln!("error: failed to read stdin: {err}");
            1
        })?;
        let result = if config.safe {
            extractor.extract_safe(&line)
        } else {
            match extractor.extract(&line) {
                Ok(result) => result,
                Err(err) => {
                    eprintln!("error: {err}");
                    return Err(1);
                }
            }
        };
        match result {
            Some(result) => {
                let map = result.as_map(config.id_key.as_deref());
                println!("{}", serde_json::Value::Object(map));
            }
            None => println!("-"),
        }
    }
    Ok(())
}

fn help_text() -> String {
    format!(
        "gleaner {version}

Definition-driven field extraction CLI.

Usage:
  gleaner [OPTIONS] <definitions-file>

Reads input lines from stdin and prints one JSON object per matched line,
or '-' for lines no extraction rule matches.

Options:
  --id-key <KEY>    Include the matched rule's name under <KEY> in each
                    JSON object.
  --safe            On an automaton/regexp disagreement, fall back to the
                    next candidate rule instead of failing.
  -h, --help        Show this help message.
  -V, --version     Print version information.

Exit codes:
  0  Success.
  1  Internal error.
  2  Invalid arguments or bad definitions.
",
        version = env!("CARGO_PKG_VERSION")
    )
}
