use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use crossterm::style::Stylize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use act::cli::{self, ConfigFile};
use act::config::Config;
use act::error::Error;
use act::memory::MemoryHost;
use act::runtime::Engine;
use act::script::value::Value;

const USAGE: &str = "Usage: act [-d] [-f[<config>]] [-t<target.json>] [-c<code>] [<file>…]";

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("act: {e}");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    // ── Load user config ──────────────────────────────────────────────────────
    let mut config = Config::new();
    let config_path = match &args.config {
        ConfigFile::Skip => None, // -f alone: skip user config
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    if let Some(path) = config_path {
        match Config::load_file(&path) {
            Ok((loaded, errors)) => {
                for e in errors {
                    eprintln!("act: warning: {}: {e}", path.display());
                }
                config = loaded;
            }
            Err(e) => eprintln!("act: warning: {}: {e}", path.display()),
        }
    }
    if args.debug {
        config.debug = true;
    }

    init_tracing(config.debug);

    // `&` sentences run on the local task set, so the whole engine lives on
    // one thread.
    let rt = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("act: {e}");
            std::process::exit(1);
        }
    };
    let local = tokio::task::LocalSet::new();
    let ok = local.block_on(&rt, run(config, args));
    // Let detached `&` sentences finish before exiting.
    rt.block_on(local);

    if !ok {
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "act=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

async fn run(config: Config, args: cli::CliArgs) -> bool {
    let host = Rc::new(MemoryHost::new().with_echo(true));

    // ── Script target ─────────────────────────────────────────────────────────
    let target = match &args.target {
        Some(path) => match load_target(path).await {
            Ok(v) => v,
            Err(e) => {
                eprintln!("act: {}: {e}", path.display());
                return false;
            }
        },
        None => host.body(),
    };

    let engine = Engine::new(config, host);

    // ── Scripts, then -c<code> ────────────────────────────────────────────────
    let mut last = Value::Undefined;
    for path in &args.files {
        let code = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("act: {}: {e}", path.display());
                return false;
            }
        };
        match engine.run(target.clone(), &code).await {
            Ok(v) => last = v,
            Err(e) => {
                report(&path.display().to_string(), &code, &e);
                return false;
            }
        }
    }

    if let Some(code) = &args.command {
        match engine.run(target.clone(), code).await {
            Ok(v) => last = v,
            Err(e) => {
                report("-c", code, &e);
                return false;
            }
        }
    }

    if !last.is_nullish() {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{last}");
    }
    true
}

async fn load_target(path: &Path) -> act::error::Result<Value> {
    let text = tokio::fs::read_to_string(path).await?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    Ok(Value::from(json))
}

/// Print a failure to stderr.  Syntax errors get the offending line, with
/// the bad token highlighted when stderr is a terminal.
fn report(name: &str, code: &str, err: &Error) {
    eprintln!("act: {name}: {err}");
    match err {
        Error::Syntax(e) => {
            let is_tty = unsafe { libc::isatty(libc::STDERR_FILENO) != 0 };
            for line in e.excerpt(code).lines() {
                if is_tty {
                    eprintln!("    {}", highlight(line));
                } else {
                    eprintln!("    {line}");
                }
            }
        }
        Error::Runtime(e) => {
            for line in e.report().lines().skip(1) {
                eprintln!("  {}", line.trim_start());
            }
        }
        _ => {}
    }
}

/// Colour the `>>token<<` marker of an excerpt line.
fn highlight(line: &str) -> String {
    let Some(start) = line.find(">>") else {
        return line.to_owned();
    };
    let Some(len) = line[start + 2..].find("<<") else {
        return line.to_owned();
    };
    let bad = &line[start + 2..start + 2 + len];
    format!(
        "{}{}{}",
        &line[..start],
        bad.red().bold(),
        &line[start + 2 + len + 2..]
    )
}
