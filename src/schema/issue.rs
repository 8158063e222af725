/// Parse diagnostics. Issues never abort a parse.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// Leading whitespace mixes tabs and spaces relative to the indent unit.
    MixedIndentation,
    /// Indentation deeper than the structure allows, or not a whole number
    /// of indent units.
    UnexpectedIndentation,
    /// A token that needs a name (scope header, go-to) has none.
    TokenEmpty,
    /// A token that takes no content (return, close-choice) has some.
    TokenNonEmpty,
    /// A go-to names a scope that does not exist.
    UnknownScope,
}

impl IssueKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MixedIndentation => "mixed-indentation",
            Self::UnexpectedIndentation => "unexpected-indentation",
            Self::TokenEmpty => "token-empty",
            Self::TokenNonEmpty => "token-non-empty",
            Self::UnknownScope => "unknown-scope",
        }
    }
}

/// A single diagnostic produced while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Zero-based source line.
    pub line: usize,
    /// Raw text of the offending line, when available.
    pub text: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, line: usize, text: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            text: text.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} [{}]: {}", self.line + 1, self.kind.name(), self.message)?;
        if let Some(text) = &self.text {
            write!(f, "\n    | {}", text)?;
        }
        Ok(())
    }
}
