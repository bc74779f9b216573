use anyhow::{Context, Result, anyhow, bail};
use dms_heatmap::{
    about,
    config::ViewerParameters,
    protocol::{DmsError, ErrorCode},
    session::Session,
    shell::{execute_shell_command, parse_shell_line, parse_shell_tokens, shell_help_text},
};
use serde::Serialize;
use std::{
    env,
    io::{self, BufRead, Write},
};

fn usage() {
    eprintln!(
        "Usage:\n  \
  dms_heatmap_cli --version\n  \
  dms_heatmap_cli [--config PARAMS.json] [--data PATH_OR_URL] COMMAND [ARGS...]\n  \
  dms_heatmap_cli [--config PARAMS.json] [--data PATH_OR_URL] shell\n\n\
{}\n\n  \
  Set RUST_LOG=info (or debug) for diagnostics on stderr",
        shell_help_text()
    );
}

struct GlobalArgs {
    config: Option<String>,
    data: Option<String>,
    cmd_idx: usize,
}

fn parse_global_args(args: &[String]) -> Result<GlobalArgs> {
    let mut out = GlobalArgs {
        config: None,
        data: None,
        cmd_idx: 1,
    };
    while out.cmd_idx < args.len() {
        let slot = match args[out.cmd_idx].as_str() {
            "--config" => &mut out.config,
            "--data" => &mut out.data,
            _ => break,
        };
        let value = args
            .get(out.cmd_idx + 1)
            .ok_or_else(|| anyhow!("Missing value after {}", args[out.cmd_idx]))?;
        *slot = Some(value.clone());
        out.cmd_idx += 2;
    }
    Ok(out)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text =
        serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn run_interactive(session: &mut Session) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("Could not read shell input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if matches!(trimmed, "exit" | "quit") {
            break;
        }
        // Errors are reported per line so one bad command does not end the session.
        let outcome = parse_shell_line(trimmed)
            .map_err(|e| DmsError::new(ErrorCode::InvalidInput, e))
            .and_then(|cmd| execute_shell_command(session, &cmd));
        match outcome {
            Ok(output) => print_json(&output)?,
            Err(e) => print_json(&serde_json::json!({ "error": e }))?,
        }
        stdout.flush().context("Could not flush stdout")?;
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let globals = parse_global_args(&args)?;
    if args.len() <= globals.cmd_idx {
        usage();
        bail!("Missing command");
    }

    let parameters = match &globals.config {
        Some(path) => ViewerParameters::load_from_path(path)?,
        None => ViewerParameters::default(),
    };
    let mut session = Session::with_parameters(parameters)?;
    if let Some(source) = &globals.data {
        session.load(&dms_heatmap::DataSource::parse(source))?;
    }

    let tokens = &args[globals.cmd_idx..];
    if tokens[0] == "shell" {
        if tokens.len() != 1 {
            bail!("shell takes no arguments");
        }
        return run_interactive(&mut session);
    }

    let command = parse_shell_tokens(tokens).map_err(|e| {
        usage();
        anyhow!(e)
    })?;
    let output = execute_shell_command(&mut session, &command)?;
    print_json(&output)
}
