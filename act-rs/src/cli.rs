//! Command-line argument parsing.
//!
//! Usage:
//!   act [-d] [-f[<config>]] [-t<target.json>] [-c<code>] [<file>…]

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// JSON file whose contents become the script target (`-t<file>`).
    pub target: Option<PathBuf>,
    /// Code to run after the files (`-c<code>`).
    pub command: Option<String>,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Script files, run in order.
    pub files: Vec<PathBuf>,
}

/// How to choose the user config file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// `config.act` in the platform config directory (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip user config.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or(&[]))
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.files.extend(argv[i + 1..].iter().map(PathBuf::from));
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            args.files.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else {
                        // A separate word is always a script file.
                        args.config = ConfigFile::Skip;
                    }
                }

                // -c<code> / -t<file>
                flag @ ('c' | 't') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else if flag == 'c' {
                        return Err("-c requires a code argument".to_owned());
                    } else {
                        return Err("-t requires a file argument".to_owned());
                    };
                    if flag == 'c' {
                        args.command = Some(value);
                    } else {
                        args.target = Some(PathBuf::from(value));
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    if args.files.is_empty() && args.command.is_none() {
        return Err("nothing to run: give a script file or -c<code>".to_owned());
    }
    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// `config.act` in the platform config directory, if it exists.
pub fn find_user_config() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "act")?;
    let path = dirs.config_dir().join("config.act");
    path.exists().then_some(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn nothing_to_run() {
        assert!(parse_argv(&argv(&[])).is_err());
        assert!(parse_argv(&argv(&["-d"])).is_err());
    }

    #[test]
    fn files_positional() {
        let a = parse_argv(&argv(&["a.act", "b.act"])).unwrap();
        assert_eq!(a.files, vec![PathBuf::from("a.act"), PathBuf::from("b.act")]);
        assert!(matches!(a.config, ConfigFile::Search));
    }

    #[test]
    fn command_embedded() {
        let a = parse_argv(&argv(&["-c1 + 2"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("1 + 2"));
    }

    #[test]
    fn command_separate() {
        let a = parse_argv(&argv(&["-c", "log: 1"])).unwrap();
        assert_eq!(a.command.as_deref(), Some("log: 1"));
    }

    #[test]
    fn combined_flags() {
        let a = parse_argv(&argv(&["-dfc", "1"])).unwrap();
        assert!(a.debug);
        assert!(matches!(a.config, ConfigFile::Skip));
        assert_eq!(a.command.as_deref(), Some("1"));
    }

    #[test]
    fn target_embedded_and_separate() {
        let a = parse_argv(&argv(&["-tpage.json", "x.act"])).unwrap();
        assert_eq!(a.target, Some(PathBuf::from("page.json")));
        let a = parse_argv(&argv(&["-t", "page.json", "x.act"])).unwrap();
        assert_eq!(a.target, Some(PathBuf::from("page.json")));
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f", "x.txt"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        assert_eq!(a.files, vec![PathBuf::from("x.txt")]);
    }

    #[test]
    fn config_explicit() {
        let a = parse_argv(&argv(&["-fmy.act", "x"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.act")));
        let a = parse_argv(&argv(&["-f", "my.act"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        assert_eq!(a.files, vec![PathBuf::from("my.act")]);
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-weird.act"])).unwrap();
        assert_eq!(a.files, vec![PathBuf::from("-weird.act")]);
    }

    #[test]
    fn unknown_flag() {
        let err = parse_argv(&argv(&["-z", "a"])).unwrap_err();
        assert_eq!(err, "unknown option: -z");
    }

    #[test]
    fn missing_values() {
        assert!(parse_argv(&argv(&["-c"])).is_err());
        assert!(parse_argv(&argv(&["a.act", "-t"])).is_err());
    }
}
