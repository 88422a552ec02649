use std::{env, fs, process::ExitCode, time::Instant};

use tether::{Error, SessionConfig};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: tether [FILE | -c CODE] [--json] [--trace-vm]";

#[derive(Debug, Default)]
struct Options {
    file: Option<String>,
    code: Option<String>,
    json: bool,
    trace_vm: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("TETHER_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let options = match parse_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let (code, script_name) = match (&options.code, &options.file) {
        (Some(code), _) => (code.clone(), "<command>".to_owned()),
        (None, Some(file)) => match read_file(file) {
            Ok(code) => (code, file.clone()),
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        (None, None) => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let config = SessionConfig::default()
        .with_script_name(script_name)
        .with_trace_vm(options.trace_vm);
    if let Err(err) = tether::initialize_with(config) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    let outcome = tether::evaluate(&code).and_then(|result| Ok((result.type_name()?, result.repr()?)));
    let elapsed = start.elapsed();
    tracing::debug!(?elapsed, "evaluation finished");

    let exit = match outcome {
        Ok((type_name, repr)) => {
            if options.json {
                println!("{}", serde_json::json!({ "type": type_name, "repr": repr }));
            } else {
                println!("{repr}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err, options.json);
            ExitCode::FAILURE
        }
    };

    if let Err(err) = tether::teardown() {
        tracing::warn!(%err, "teardown failed");
    }
    exit
}

fn report(err: &Error, json: bool) {
    match (err.exception(), json) {
        (Some(record), true) => match serde_json::to_string_pretty(record) {
            Ok(rendered) => eprintln!("{rendered}"),
            Err(_) => eprintln!("{record}"),
        },
        (Some(record), false) => eprintln!("{record}"),
        (None, true) => eprintln!("{}", serde_json::json!({ "error": err.to_string() })),
        (None, false) => eprintln!("error: {err}"),
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" => {
                let code = args.next().ok_or("-c expects an argument")?;
                options.code = Some(code);
            }
            "--json" => options.json = true,
            "--trace-vm" => options.trace_vm = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            other => {
                if options.file.is_some() {
                    return Err(format!("unexpected argument {other}"));
                }
                options.file = Some(other.to_owned());
            }
        }
    }
    Ok(options)
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) if !metadata.is_file() => return Err(format!("{file_path} is not a file")),
        Ok(_) => {}
        Err(err) => return Err(format!("reading {file_path}: {err}")),
    }
    fs::read_to_string(file_path).map_err(|err| format!("reading {file_path}: {err}"))
}
