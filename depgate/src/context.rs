use std::fmt;

use serde::Serialize;

/// Which pipeline stage produced a non-fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnsupportedManifest,
    Resolution,
    CheckRuntime,
    Cancelled,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedManifest => write!(f, "unsupported manifest"),
            Self::Resolution => write!(f, "resolution"),
            Self::CheckRuntime => write!(f, "check runtime"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A recorded non-fatal failure. The affected unit is excluded from
/// aggregation; processing continues.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Dependency name or manifest path the diagnostic is about.
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            check: None,
            message: message.into(),
        }
    }

    pub fn for_check(
        subject: impl Into<String>,
        check: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::CheckRuntime,
            subject: subject.into(),
            check: Some(check.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.check {
            Some(check) => write!(f, "{} [{}] {}: {}", self.kind, check, self.subject, self.message),
            None => write!(f, "{} {}: {}", self.kind, self.subject, self.message),
        }
    }
}
