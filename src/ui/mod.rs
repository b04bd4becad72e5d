//! User-facing output. Diagnostics go through `log`; everything the user is
//! meant to read goes through a [`Renderer`].

use colored::*;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

    fn to_stderr(self) -> bool {
        matches!(self, Level::Error | Level::Warn)
    }
}

pub const SEPARATOR_LIGHT: &str = "─";

#[derive(Serialize)]
struct Event<'a> {
    level: &'a str,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    format: OutputFormat,
    color: bool,
    debug: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: true,
            debug: false,
        }
    }
}

impl Renderer {
    pub fn new(format: OutputFormat, color: bool, debug: bool) -> Self {
        // `colored` reads its own global override; keep it in step.
        if !color {
            colored::control::set_override(false);
        }
        Self {
            format,
            color,
            debug,
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Render one event as the line that [`emit`](Self::emit) would print.
    /// `None` for debug events when debug output is off.
    pub fn render(
        &self,
        level: Level,
        code: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Option<String> {
        if level == Level::Debug && !self.debug {
            return None;
        }
        match self.format {
            OutputFormat::Text => Some(colorize(level, message, self.color)),
            OutputFormat::Json => {
                let clean = strip_ansi(message);
                let event = Event {
                    level: level.as_str(),
                    code,
                    message: &clean,
                    data,
                };
                // Serializing strings and a Value cannot fail.
                serde_json::to_string(&event).ok()
            }
        }
    }

    pub fn emit(&self, level: Level, code: &str, message: &str, data: Option<serde_json::Value>) {
        let Some(line) = self.render(level, code, message, data) else {
            return;
        };
        if level.to_stderr() {
            let _ = writeln!(io::stderr(), "{line}");
        } else {
            let _ = writeln!(io::stdout(), "{line}");
        }
    }

    /// Print pre-rendered text (tables, scripts). Suppressed in JSON mode.
    pub fn text(&self, text: impl std::fmt::Display) {
        if self.is_json() {
            return;
        }
        let _ = writeln!(io::stdout(), "{text}");
    }

    pub fn separator(&self) {
        self.text(SEPARATOR_LIGHT.repeat(60));
    }
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
        Level::Debug => s.cyan().to_string(),
    }
}

/// Drop CSI escape sequences such as `\x1b[1;32m`.
fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

pub mod prelude {
    pub use super::{Level, OutputFormat, Renderer};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi("plain ü"), "plain ü");
    }

    #[test]
    fn test_json_event_shape() {
        let renderer = Renderer::new(OutputFormat::Json, false, false);
        let line = renderer
            .render(
                Level::Success,
                "install.result",
                "\x1b[32mInstalled\x1b[0m App.ID",
                Some(json!({"package_id": "App.ID"})),
            )
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "success");
        assert_eq!(value["code"], "install.result");
        assert_eq!(value["message"], "Installed App.ID");
        assert_eq!(value["data"]["package_id"], "App.ID");
    }

    #[test]
    fn test_json_event_without_data_omits_field() {
        let renderer = Renderer::new(OutputFormat::Json, false, false);
        let line = renderer.render(Level::Info, "x", "hello", None).unwrap();
        assert!(!line.contains("\"data\""));
    }

    #[test]
    fn test_text_without_color_is_verbatim() {
        let renderer = Renderer::new(OutputFormat::Text, false, false);
        assert_eq!(
            renderer.render(Level::Error, "x", "boom", None).as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn test_debug_hidden_unless_enabled() {
        let quiet = Renderer::new(OutputFormat::Text, false, false);
        assert!(quiet.render(Level::Debug, "x", "trace", None).is_none());
        let loud = Renderer::new(OutputFormat::Text, false, true);
        assert!(loud.render(Level::Debug, "x", "trace", None).is_some());
    }
}
