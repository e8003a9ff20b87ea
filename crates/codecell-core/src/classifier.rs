//! Heuristic classification of process failures into a small error taxonomy
//!
//! A pure function from `(language, exit code, stderr text)` to a named error
//! kind. The table is ordered and first-match-wins; adding a language or a new
//! kind means adding rows, not touching control flow. This is deliberately a
//! substring heuristic, not a parser of toolchain diagnostics: when nothing
//! matches, the kind is `Unknown` and the raw stderr is left untouched for the
//! caller.

use std::fmt;

use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DivisionByZero,
    SyntaxError,
    ReferenceError,
    Uncaught,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DivisionByZero => "division by zero",
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::ReferenceError => "undefined reference",
            ErrorKind::Uncaught => "uncaught exception",
            ErrorKind::Unknown => "unknown runtime error",
        };
        f.write_str(name)
    }
}

struct Rule {
    /// `None` applies the rule to every language.
    language: Option<Language>,
    pattern: &'static str,
    kind: ErrorKind,
}

/// Ordered rule table; earlier rows win. Language-specific markers come before
/// the generic uncaught-exception markers of the same language.
const RULES: &[Rule] = &[
    // Python
    Rule { language: Some(Language::Python), pattern: "ZeroDivisionError", kind: ErrorKind::DivisionByZero },
    Rule { language: Some(Language::Python), pattern: "SyntaxError", kind: ErrorKind::SyntaxError },
    Rule { language: Some(Language::Python), pattern: "IndentationError", kind: ErrorKind::SyntaxError },
    Rule { language: Some(Language::Python), pattern: "NameError", kind: ErrorKind::ReferenceError },
    Rule { language: Some(Language::Python), pattern: "Traceback (most recent call last)", kind: ErrorKind::Uncaught },
    // JavaScript
    Rule { language: Some(Language::JavaScript), pattern: "SyntaxError", kind: ErrorKind::SyntaxError },
    Rule { language: Some(Language::JavaScript), pattern: "ReferenceError", kind: ErrorKind::ReferenceError },
    Rule { language: Some(Language::JavaScript), pattern: "RangeError", kind: ErrorKind::Uncaught },
    Rule { language: Some(Language::JavaScript), pattern: "TypeError", kind: ErrorKind::Uncaught },
    Rule { language: Some(Language::JavaScript), pattern: "UnhandledPromiseRejection", kind: ErrorKind::Uncaught },
    // Java
    Rule { language: Some(Language::Java), pattern: "ArithmeticException", kind: ErrorKind::DivisionByZero },
    Rule { language: Some(Language::Java), pattern: "NullPointerException", kind: ErrorKind::Uncaught },
    Rule { language: Some(Language::Java), pattern: "ClassNotFoundException", kind: ErrorKind::ReferenceError },
    Rule { language: Some(Language::Java), pattern: "Exception in thread", kind: ErrorKind::Uncaught },
    // Any language: interpreter/VM level stack trace markers
    Rule { language: None, pattern: "Segmentation fault", kind: ErrorKind::Uncaught },
];

// Exit codes for signal deaths follow the 128+signo shell convention; the
// host invoker synthesizes them for signalled children.
const EXIT_SIGFPE: i64 = 128 + 8;
const EXIT_SIGSEGV: i64 = 128 + 11;
const EXIT_SIGABRT: i64 = 128 + 6;

/// Classify a non-zero exit. Signal-derived codes are checked before the
/// stderr table because native binaries (C/C++) often die without writing
/// anything to stderr at all.
pub fn classify(language: Language, exit_code: Option<i64>, stderr: &str) -> ErrorKind {
    match exit_code {
        Some(EXIT_SIGFPE) => return ErrorKind::DivisionByZero,
        Some(EXIT_SIGSEGV) | Some(EXIT_SIGABRT) => return ErrorKind::Uncaught,
        _ => {}
    }

    for rule in RULES {
        let applies = rule.language.map_or(true, |l| l == language);
        if applies && stderr.contains(rule.pattern) {
            return rule.kind;
        }
    }
    ErrorKind::Unknown
}
