//! User-facing output. Every message goes through [`emit`], which renders it
//! as colored text or as one JSON object per line.

use colored::*;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Debug => "debug",
        }
    }

    /// Diagnostics go to stderr so stdout stays parseable.
    fn is_diagnostic(self) -> bool {
        matches!(self, Level::Warn | Level::Error)
    }
}

#[derive(Debug, Clone, Copy)]
struct Renderer {
    format: OutputFormat,
    color: bool,
}

static RENDERER: RwLock<Renderer> = RwLock::new(Renderer {
    format: OutputFormat::Text,
    color: true,
});

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

pub fn set_debug_mode(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::Relaxed);
}

pub fn is_debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

/// Select the output format. Color is also dropped when `NO_COLOR` is set.
pub fn init(format: OutputFormat, color: bool) {
    let color = color && std::env::var_os("NO_COLOR").is_none();
    if let Ok(mut r) = RENDERER.write() {
        r.format = format;
        r.color = color;
    }
}

fn renderer() -> Renderer {
    match RENDERER.read() {
        Ok(r) => *r,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

pub fn get_output_format() -> OutputFormat {
    renderer().format
}

#[derive(Serialize)]
struct Event<'a> {
    level: &'a str,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

fn colorize(level: Level, s: &str, enable: bool) -> String {
    if !enable {
        return s.to_string();
    }
    match level {
        Level::Info => s.normal().to_string(),
        Level::Success => s.green().bold().to_string(),
        Level::Warn => s.yellow().bold().to_string(),
        Level::Error => s.red().bold().to_string(),
        Level::Debug => s.dimmed().to_string(),
    }
}

/// Drop CSI escape sequences (`ESC [ ... final`), which command output
/// captured from package managers often carries.
fn strip_ansi(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'[') {
            i += 2;
            while let Some(&b) = bytes.get(i) {
                i += 1;
                if (b'@'..=b'~').contains(&b) {
                    break;
                }
            }
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn render(r: Renderer, level: Level, code: &str, message: &str, data: Option<serde_json::Value>) -> Option<String> {
    match r.format {
        OutputFormat::Text => Some(colorize(level, message, r.color)),
        OutputFormat::Json => {
            let clean = strip_ansi(message);
            serde_json::to_string(&Event {
                level: level.as_str(),
                code,
                message: &clean,
                data,
            })
            .ok()
        }
    }
}

/// Report `message` at `level`. `code` is a dotted event name such as
/// `install.failed`; `data` is attached in JSON mode only.
pub fn emit(level: Level, code: &str, message: &str, data: Option<serde_json::Value>) {
    if level == Level::Debug && !is_debug_enabled() {
        return;
    }
    let Some(line) = render(renderer(), level, code, message, data) else {
        return;
    };
    if level.is_diagnostic() {
        let _ = writeln!(io::stderr(), "{}", line);
    } else {
        let _ = writeln!(io::stdout(), "{}", line);
    }
}

pub mod prelude {
    pub use super::{Level, OutputFormat, emit, get_output_format};
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: Renderer = Renderer {
        format: OutputFormat::Json,
        color: false,
    };

    #[test]
    fn strip_ansi_removes_color_codes() {
        let colored = "\x1b[1;32mok\x1b[0m done";
        assert_eq!(strip_ansi(colored), "ok done");
    }

    #[test]
    fn strip_ansi_keeps_multibyte_text() {
        assert_eq!(strip_ansi("✓ installed"), "✓ installed");
    }

    #[test]
    fn colorize_is_identity_without_color() {
        assert_eq!(colorize(Level::Error, "boom", false), "boom");
    }

    #[test]
    fn json_event_carries_code_and_data() {
        let line = render(
            JSON,
            Level::Warn,
            "distros.repo",
            "\x1b[33mrepo exists\x1b[0m",
            Some(serde_json::json!({ "repo": "home:AvengeMedia:danklinux" })),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "warn");
        assert_eq!(value["code"], "distros.repo");
        assert_eq!(value["message"], "repo exists");
        assert_eq!(value["data"]["repo"], "home:AvengeMedia:danklinux");
    }

    #[test]
    fn json_event_omits_missing_data() {
        let line = render(JSON, Level::Info, "distros.list", "6 distributions", None).unwrap();
        assert!(!line.contains("\"data\""));
    }
}
