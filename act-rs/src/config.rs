//! Engine configuration and the `config.act` file parser.
//!
//! | Setting | Default | Effect |
//! |---------|---------|--------|
//! | `convert_to_camel_case` | `true` | `font_size` also finds a `fontSize` member |
//! | `debug` | `false` | a `debug!` event for every solved node |
//! | `debug_lexer` | `false` | a `trace!` event for every token |
//! | `debug_parser` | `false` | the parsed tree at `debug!` level |
//! | `origin` | `http://localhost` | base for `/path` literals |
//!
//! File format: one setting per line, `name = value` or `/set name=value`
//! (`/set name value` also works).  Blank lines and lines starting with `;`
//! are ignored.  Bad lines are reported and skipped; the rest still loads.

use std::path::Path;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Settings handed to the parser and the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub convert_to_camel_case: bool,
    pub debug: bool,
    pub debug_lexer: bool,
    pub debug_parser: bool,
    pub origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            convert_to_camel_case: true,
            debug: false,
            debug_lexer: false,
            debug_parser: false,
            origin: "http://localhost".to_owned(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string on top of the defaults.
    ///
    /// Returns the config and a list of any errors; lines with errors leave
    /// their setting unchanged.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let errors = config.apply_str(s);
        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply every setting in `s` to this config.
    pub fn apply_str(&mut self, s: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let assignment = match line.strip_prefix('/') {
                Some(rest) => {
                    let (cmd, args) = rest.split_once(|c: char| c.is_ascii_whitespace()).unwrap_or((rest, ""));
                    if cmd != "set" {
                        errors.push(ConfigError { line: lineno, message: format!("unknown command '/{cmd}'") });
                        continue;
                    }
                    parse_set(&split_args(args.trim()))
                }
                None => parse_assignment(line),
            };

            let result = assignment.and_then(|(name, value)| self.set(&name, &value));
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        errors
    }

    /// Set one option by name.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "convert_to_camel_case" => self.convert_to_camel_case = parse_bool(name, value)?,
            "debug" => self.debug = parse_bool(name, value)?,
            "debug_lexer" => self.debug_lexer = parse_bool(name, value)?,
            "debug_parser" => self.debug_parser = parse_bool(name, value)?,
            "origin" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(format!("origin: expected an http(s) URL, got '{value}'"));
                }
                self.origin = value.to_owned();
            }
            _ => return Err(format!("unknown setting '{name}'")),
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        _ => Err(format!("{name}: expected a boolean, got '{value}'")),
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if !in_quotes => in_quotes = true,
            '"' if in_quotes => in_quotes = false,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── Assignments ───────────────────────────────────────────────────────────────

/// `name = value`, with optional quotes around the value.
fn parse_assignment(line: &str) -> Result<(String, String), String> {
    let Some((name, value)) = line.split_once('=') else {
        return Err(format!("expected 'name = value', got '{line}'"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err("setting name cannot be empty".into());
    }
    let value = split_args(value.trim()).join(" ");
    Ok((name.to_owned(), value))
}

/// Parse `/set <name>=<value>` or `/set <name> <value>`.
fn parse_set(tokens: &[String]) -> Result<(String, String), String> {
    if tokens.is_empty() {
        return Err("/set: requires an argument".into());
    }

    let (name, value) = if let Some(eq) = tokens[0].find('=') {
        (tokens[0][..eq].to_owned(), tokens[0][eq + 1..].to_owned())
    } else if tokens.len() >= 2 {
        (tokens[0].clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("/set: missing value for '{}'", tokens[0]));
    };

    if name.is_empty() {
        return Err("/set: variable name cannot be empty".into());
    }
    Ok((name, value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- split_args -----------------------------------------------------------

    #[test]
    fn split_simple() {
        assert_eq!(split_args("foo bar baz"), ["foo", "bar", "baz"]);
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#""http://a b" 42"#), ["http://a b", "42"]);
    }

    // -- settings -------------------------------------------------------------

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert!(cfg.convert_to_camel_case);
        assert!(!cfg.debug);
        assert_eq!(cfg.origin, "http://localhost");
    }

    #[test]
    fn plain_assignment() {
        let (cfg, errs) = Config::load_str("debug = on\norigin = \"https://example.com\"");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(cfg.debug);
        assert_eq!(cfg.origin, "https://example.com");
    }

    #[test]
    fn set_equals_syntax() {
        let (cfg, errs) = Config::load_str("/set convert_to_camel_case=0");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(!cfg.convert_to_camel_case);
    }

    #[test]
    fn set_space_syntax() {
        let (cfg, errs) = Config::load_str("/set debug_parser yes");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(cfg.debug_parser);
    }

    #[test]
    fn bad_lines_are_reported_and_skipped() {
        let (cfg, errs) = Config::load_str("debug = maybe\nwhat = 1\n/def x\norigin = ftp://x\ndebug_lexer = 1");
        assert_eq!(errs.len(), 4, "{errs:?}");
        assert_eq!(errs[0].line, 1);
        assert!(errs[1].message.contains("unknown setting"));
        assert_eq!(errs[2].to_string(), "line 3: unknown command '/def'");
        assert!(!cfg.debug);
        assert_eq!(cfg.origin, "http://localhost");
        assert!(cfg.debug_lexer);
    }

    // -- Comments & skipping --------------------------------------------------

    #[test]
    fn semicolon_comments_ignored() {
        let (cfg, errs) = Config::load_str(
            ";; This is a comment\n\
             ; Also a comment\n\
             debug=true",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert!(cfg.debug);
    }

    #[test]
    fn blank_lines_ignored() {
        let (cfg, errs) = Config::load_str("\n\n/set debug=1\n\n");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(cfg.debug);
    }

    #[test]
    fn load_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.act");
        std::fs::write(&path, "debug = 1\n").unwrap();
        let (cfg, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert!(cfg.debug);
        assert!(Config::load_file(&dir.path().join("missing.act")).is_err());
    }
}
