//! The closed vocabulary of supported languages and their toolchain facts
//!
//! Everything the engine knows about a language lives here: how its name is
//! spelled on the wire, whether it needs a compile phase, what file extension
//! its sources carry, which interpreter or toolchain binary runs it, and which
//! container image stands in for that toolchain when isolation is enabled.
//! The interpreted/compiled partition is consumed only by the dispatcher.

use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    Python,
    Java,
    C,
    Cpp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageKind {
    Interpreted,
    Compiled,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::JavaScript,
        Language::Python,
        Language::Java,
        Language::C,
        Language::Cpp,
    ];

    pub fn kind(&self) -> LanguageKind {
        match self {
            Language::JavaScript | Language::Python => LanguageKind::Interpreted,
            Language::Java | Language::C | Language::Cpp => LanguageKind::Compiled,
        }
    }

    /// Canonical wire spelling, as accepted in `ExecutionRequest.language`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::JavaScript => "js",
            Language::Python => "py",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Interpreter binary for the interpreted partition.
    pub fn interpreter(&self) -> Option<&'static str> {
        match self {
            Language::JavaScript => Some("node"),
            Language::Python => Some("python3"),
            _ => None,
        }
    }

    /// Default container image fulfilling this language's toolchain when the
    /// isolation boundary is active.
    pub fn default_image(&self) -> &'static str {
        match self {
            Language::JavaScript => "node:18-slim",
            Language::Python => "python:3.10-slim",
            Language::Java => "eclipse-temurin:17-jdk",
            Language::C | Language::Cpp => "gcc:13",
        }
    }
}

impl FromStr for Language {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "javascript" | "js" | "node" | "nodejs" => Ok(Language::JavaScript),
            "python" | "python3" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "c" => Ok(Language::C),
            "cpp" | "c++" => Ok(Language::Cpp),
            other => Err(EngineError::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
