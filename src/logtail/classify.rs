//! Severity classification and message normalization for database log lines.

use regex::Regex;

use crate::error::AgentError;

/// Log-line classification bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Log,
    Warning,
    Error,
    Fatal,
    Panic,
}

impl Severity {
    /// Every severity, in export order
    pub const ALL: [Severity; 5] = [
        Severity::Log,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
        Severity::Panic,
    ];

    /// Label value used in exported metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Panic => "panic",
        }
    }

    /// Keyword as written by the server, e.g. `ERROR`
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Log => "LOG",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Panic => "PANIC",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.keyword() == keyword)
    }

    /// Whether messages of this severity are aggregated per normalized text
    pub fn tracks_messages(&self) -> bool {
        !matches!(self, Self::Log)
    }
}

/// A classified line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    /// Normalized message body; `None` for plain `LOG` lines
    pub message: Option<String>,
}

/// Compiled classification and normalization patterns
#[derive(Debug)]
pub struct LineParser {
    // One alternation over every keyword; the leftmost match decides.
    severity: Regex,
    literals: Regex,
    digits: Regex,
}

impl LineParser {
    pub fn new() -> Result<Self, AgentError> {
        let keywords: Vec<&str> = Severity::ALL.iter().map(|s| s.keyword()).collect();
        let pattern = format!(r"(?:^|\s)({}):\s+", keywords.join("|"));

        Ok(Self {
            severity: compile(&pattern)?,
            literals: compile(r#""[^"]*"|'[^']*'"#)?,
            digits: compile(r"\d+")?,
        })
    }

    /// Classify one line by the first severity keyword in it. Lines without
    /// one (continuations, blank lines) yield `None`.
    pub fn parse(&self, line: &str) -> Option<LogEntry> {
        let line = line.trim_end_matches(['\r', '\n']);

        let caps = self.severity.captures(line)?;
        let severity = Severity::from_keyword(caps.get(1)?.as_str())?;
        let end = caps.get(0)?.end();

        let message = severity
            .tracks_messages()
            .then(|| self.normalize(line[end..].trim_end()));
        Some(LogEntry { severity, message })
    }

    /// Replace quoted literals and digit runs with `?` so messages differing
    /// only in literal values share one bucket.
    pub fn normalize(&self, message: &str) -> String {
        let without_literals = self.literals.replace_all(message, "?");
        self.digits.replace_all(&without_literals, "?").into_owned()
    }
}

fn compile(pattern: &str) -> Result<Regex, AgentError> {
    Regex::new(pattern).map_err(|source| AgentError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> LineParser {
        LineParser::new().unwrap()
    }

    #[test]
    fn test_syntax_errors_share_template() {
        let parser = parser();
        let a = parser
            .parse(r#"2024-03-01 10:00:00 UTC [1234] ERROR:  syntax error at or near "invalid" at character 1"#)
            .unwrap();
        let b = parser
            .parse(r#"2024-03-01 10:00:05 UTC [1240] ERROR:  syntax error at or near ")" at character 721"#)
            .unwrap();

        assert_eq!(a.severity, Severity::Error);
        assert_eq!(a, b);
        assert_eq!(
            a.message.as_deref(),
            Some("syntax error at or near ? at character ?")
        );
    }

    #[test]
    fn test_each_severity_is_recognized() {
        let parser = parser();
        let cases = [
            ("[1] LOG:  checkpoint starting: time", Severity::Log),
            ("[1] WARNING:  there is no transaction in progress", Severity::Warning),
            ("[1] ERROR:  relation \"foo\" does not exist", Severity::Error),
            ("[1] FATAL:  password authentication failed for user \"app\"", Severity::Fatal),
            ("[1] PANIC:  could not write to file \"pg_wal/xlogtemp.123\"", Severity::Panic),
        ];

        for (line, expected) in cases {
            assert_eq!(parser.parse(line).unwrap().severity, expected, "line: {line}");
        }
    }

    #[test]
    fn test_log_lines_have_no_message_bucket() {
        let entry = parser().parse("LOG:  database system is ready to accept connections").unwrap();
        assert_eq!(entry.severity, Severity::Log);
        assert_eq!(entry.message, None);
    }

    #[test]
    fn test_unmatched_lines_are_ignored() {
        let parser = parser();
        assert_eq!(parser.parse(""), None);
        assert_eq!(parser.parse("\tSTATEMENT:  select 1"), None);
        assert_eq!(parser.parse("continuation of a previous line"), None);
        // Keyword must sit at a prefix boundary.
        assert_eq!(parser.parse("XERROR:  nope"), None);
        assert_eq!(parser.parse("ERROR: single space still counts"), Some(LogEntry {
            severity: Severity::Error,
            message: Some("single space still counts".to_string()),
        }));
    }

    #[test]
    fn test_leftmost_keyword_wins() {
        let parser = parser();

        let entry = parser
            .parse("LOG:  statement: select 'ERROR:  not really'")
            .unwrap();
        assert_eq!(entry.severity, Severity::Log);

        let entry = parser
            .parse("2024-03-01 10:00:00 UTC [42] ERROR:  LOG: custom audit failure")
            .unwrap();
        assert_eq!(entry.severity, Severity::Error);
        assert_eq!(entry.message.as_deref(), Some("LOG: custom audit failure"));

        let entry = parser
            .parse("2024-03-01 10:00:00 UTC [42] FATAL:  WARNING: quota exceeded for role 7")
            .unwrap();
        assert_eq!(entry.severity, Severity::Fatal);
        assert_eq!(entry.message.as_deref(), Some("WARNING: quota exceeded for role ?"));
    }

    #[test]
    fn test_normalize_digits_and_quotes() {
        let parser = parser();
        assert_eq!(
            parser.normalize("duplicate key value violates unique constraint \"users_pkey\""),
            "duplicate key value violates unique constraint ?"
        );
        assert_eq!(
            parser.normalize("canceling statement due to statement timeout after 30000 ms"),
            "canceling statement due to statement timeout after ? ms"
        );
        assert_eq!(
            parser.normalize("invalid input syntax for type integer: 'abc'"),
            "invalid input syntax for type integer: ?"
        );
    }

    #[test]
    fn test_trailing_newline_is_stripped() {
        let entry = parser().parse("FATAL:  terminating connection 42\r\n").unwrap();
        assert_eq!(entry.message.as_deref(), Some("terminating connection ?"));
    }
}
