//! Error handling for oldloom
//!
//! This module provides the error taxonomy for the workspace pipeline and the
//! user-facing error rendering used by the CLI. The error system follows two rules:
//! 1. **Strongly-typed errors** where the category matters to the caller (configuration,
//!    data integrity, network), so code can react with `downcast_ref`
//! 2. **`anyhow` context everywhere else**, so the deepest cause and the file or stage that
//!    produced it survive to the top-level report
//!
//! # Error Categories
//!
//! - **Configuration**: [`LoomError::Configuration`], [`LoomError::MissingArtifact`],
//!   [`LoomError::AmbiguousArtifact`]: fail fast during stage setup
//! - **Transient I/O**: [`LoomError::Network`], [`LoomError::HttpStatus`],
//!   [`LoomError::FileSystem`]: abort the stage, never retried in-process
//! - **Data integrity**: [`LoomError::DataIntegrity`], [`LoomError::ChecksumMismatch`],
//!   [`LoomError::MalformedPatch`], [`LoomError::ClassFormat`]: the suspect file should be
//!   deleted and re-fetched rather than the build simply re-run
//! - **Graph**: [`LoomError::StageNotInstalled`], [`LoomError::UndeclaredDependency`],
//!   [`LoomError::CycleDetected`]
//!
//! Stage failures are wrapped in a [`StageFailure`] context by the provider graph so the
//! report can name the failing stage.
//!
//! # Examples
//!
//! ```rust,no_run
//! use oldloom_cli::core::{LoomError, user_friendly_error};
//!
//! let err = anyhow::Error::from(LoomError::MissingArtifact {
//!     configuration: "forge".to_string(),
//! });
//! user_friendly_error(err).display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for oldloom operations
#[derive(Error, Debug)]
pub enum LoomError {
    /// A required setting is absent or invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// A dependency configuration that must resolve to exactly one artifact resolved to none
    #[error("Configuration '{configuration}' did not resolve to any artifact")]
    MissingArtifact {
        /// Name of the dependency configuration
        configuration: String,
    },

    /// A dependency configuration that must resolve to exactly one artifact resolved to several
    #[error("Configuration '{configuration}' resolved to {count} artifacts, expected exactly one")]
    AmbiguousArtifact {
        /// Name of the dependency configuration
        configuration: String,
        /// Number of artifacts found
        count: usize,
        /// The candidates, for the error report
        candidates: Vec<PathBuf>,
    },

    /// The server answered with a status other than 2xx or 304
    #[error("HTTP {status} while fetching {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code returned by the server
        status: u16,
    },

    /// Transport-level failure (DNS, connect, timeout, truncated body)
    #[error("Network error while fetching {url}: {reason}")]
    Network {
        /// Requested URL
        url: String,
        /// Transport error message
        reason: String,
    },

    /// Offline mode was requested but the file is not cached yet
    #[error("Offline mode is enabled and {path} has never been downloaded")]
    Offline {
        /// Destination that would have been fetched
        path: PathBuf,
    },

    /// A file exists but its contents cannot be trusted
    #[error("Corrupt or unexpected data in {path}: {reason}")]
    DataIntegrity {
        /// The suspect file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Content hash did not match the expected value
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The file whose hash was checked
        path: PathBuf,
        /// Expected digest
        expected: String,
        /// Computed digest
        actual: String,
    },

    /// A binary patch stream could not be decoded
    #[error("Malformed binary patch for {class}: {reason}")]
    MalformedPatch {
        /// Class the patch targets
        class: String,
        /// Decoder diagnostic
        reason: String,
    },

    /// A class file could not be parsed or written
    #[error("Invalid class file {class}: {reason}")]
    ClassFormat {
        /// Entry name or class name
        class: String,
        /// Parser diagnostic
        reason: String,
    },

    /// A stage's outputs were requested before the stage was installed
    #[error("Stage '{stage}' has not been installed")]
    StageNotInstalled {
        /// Stage name
        stage: String,
    },

    /// A stage read the outputs of a node it never declared as a dependency
    #[error("Stage '{stage}' read from '{dependency}' without declaring it as a dependency")]
    UndeclaredDependency {
        /// The reading stage
        stage: String,
        /// The node being read
        dependency: String,
    },

    /// The provider graph re-entered a stage that was still resolving its dependencies
    #[error("Dependency cycle detected at stage '{stage}'")]
    CycleDetected {
        /// The stage that was reached twice on the same path
        stage: String,
    },

    /// File system operation failed
    #[error("File system error during {operation}: {path}")]
    FileSystem {
        /// Operation that failed (e.g. "create directory")
        operation: String,
        /// Path involved
        path: PathBuf,
    },

    /// Anything else
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl LoomError {
    /// Whether the error means a cached file is bad and must be re-fetched.
    #[must_use]
    pub const fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::DataIntegrity { .. }
                | Self::ChecksumMismatch { .. }
                | Self::MalformedPatch { .. }
                | Self::ClassFormat { .. }
        )
    }

    /// Whether the error is a configuration problem that re-running cannot fix.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::MissingArtifact { .. } | Self::AmbiguousArtifact { .. }
        )
    }
}

/// Lifecycle phase in which a stage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    /// Cheap path/key computation
    Setup,
    /// Expensive transformation
    Install,
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Install => f.write_str("install"),
        }
    }
}

/// Context attached by the provider graph to every error raised inside a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// Stage name
    pub stage: &'static str,
    /// Phase that was running
    pub phase: StagePhase,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage '{}' failed during {}", self.stage, self.phase)
    }
}

/// User-facing wrapper that adds details and a suggestion to an error
///
/// Rendered by [`ErrorContext::display`] with terminal colours: the error in red, details in
/// yellow, the suggestion in green.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message (deepest cause)
    pub error: String,
    /// Stage that failed, when known
    pub stage: Option<String>,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from a message
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            stage: None,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Record the stage that failed
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    pub fn display(&self) {
        if let Some(stage) = &self.stage {
            eprintln!("{}: {} ({})", "error".red().bold(), self.error, format!("stage {stage}").bold());
        } else {
            eprintln!("{}: {}", "error".red().bold(), self.error);
        }

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(stage) = &self.stage {
            write!(f, "\nStage: {stage}")?;
        }

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Find the first [`LoomError`] anywhere in an error chain.
#[must_use]
pub fn find_loom_error(error: &anyhow::Error) -> Option<&LoomError> {
    error
        .downcast_ref::<LoomError>()
        .or_else(|| error.chain().find_map(|cause| cause.downcast_ref::<LoomError>()))
}

/// Convert any error to a user-friendly [`ErrorContext`]
///
/// The report names the failing stage (from [`StageFailure`]), the deepest cause of the
/// chain, and a suggestion tailored to the error category.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let stage = error.downcast_ref::<StageFailure>().map(|failure| failure.stage.to_string());
    let deepest = error.root_cause().to_string();

    let chain: Vec<String> = error.chain().map(std::string::ToString::to_string).collect();
    let details = if chain.len() > 1 {
        let mut message = String::from("Caused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
        Some(message)
    } else {
        None
    };

    let mut context = ErrorContext::new(deepest);
    if let Some(stage) = stage {
        context = context.with_stage(stage);
    }
    if let Some(details) = details {
        context = context.with_details(details);
    }

    if let Some(loom_error) = find_loom_error(&error) {
        return context.with_suggestion(suggestion_for(loom_error));
    }

    if let Some(io_error) = error.chain().find_map(|c| c.downcast_ref::<std::io::Error>()) {
        let suggestion = match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                "Check permissions on the cache directories (see 'oldloom cache info')"
            }
            std::io::ErrorKind::NotFound => "Check that the file or directory exists and the path is correct",
            _ => "Re-run the command; stages that already completed are served from the cache",
        };
        return context.with_suggestion(suggestion);
    }

    if error.chain().any(|c| c.downcast_ref::<toml::de::Error>().is_some()) {
        return context.with_suggestion("Check the TOML syntax in oldloom.toml");
    }

    context
}

fn suggestion_for(error: &LoomError) -> String {
    match error {
        LoomError::Configuration { .. } => {
            "Fix the setting in oldloom.toml and re-run".to_string()
        }
        LoomError::MissingArtifact { configuration } => format!(
            "Declare exactly one artifact under [dependencies] {configuration} = [...] in oldloom.toml"
        ),
        LoomError::AmbiguousArtifact { configuration, candidates, .. } => format!(
            "Keep only one artifact in the '{configuration}' configuration (found: {})",
            candidates.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
        ),
        LoomError::HttpStatus { .. } | LoomError::Network { .. } => {
            "Check your internet connection and re-run; completed stages are cached".to_string()
        }
        LoomError::Offline { .. } => "Run once without --offline to populate the cache".to_string(),
        LoomError::DataIntegrity { path, .. } | LoomError::ChecksumMismatch { path, .. } => format!(
            "Delete {} and re-run so it is fetched again; re-running alone will not fix it",
            path.display()
        ),
        LoomError::MalformedPatch { .. } | LoomError::ClassFormat { .. } => {
            "The input artifact is corrupt or of an unsupported version; re-fetch it or run with --refresh-dependencies".to_string()
        }
        LoomError::StageNotInstalled { .. }
        | LoomError::UndeclaredDependency { .. }
        | LoomError::CycleDetected { .. } => {
            "This is a bug in the pipeline wiring; please report it".to_string()
        }
        LoomError::FileSystem { .. } => {
            "Check disk space and permissions on the cache directories".to_string()
        }
        LoomError::Other { .. } => "Run with --verbose for more information".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_integrity_classification() {
        let err = LoomError::ChecksumMismatch {
            path: PathBuf::from("a.jar"),
            expected: "00".into(),
            actual: "11".into(),
        };
        assert!(err.is_integrity_error());
        assert!(!err.is_configuration_error());

        let err = LoomError::MissingArtifact {
            configuration: "forge".into(),
        };
        assert!(err.is_configuration_error());
        assert!(!err.is_integrity_error());
    }

    #[test]
    fn test_user_friendly_error_names_stage_and_deepest_cause() {
        let result: anyhow::Result<()> = Err(LoomError::MalformedPatch {
            class: "net.minecraft.Foo".into(),
            reason: "unknown opcode".into(),
        }
        .into());
        let err = result
            .context("Failed to apply client binpatches")
            .context(StageFailure {
                stage: "binpatched",
                phase: StagePhase::Install,
            })
            .unwrap_err();

        let ctx = user_friendly_error(err);
        assert_eq!(ctx.stage.as_deref(), Some("binpatched"));
        assert!(ctx.error.contains("unknown opcode"));
        assert!(ctx.suggestion.unwrap().contains("re-fetch"));
    }

    #[test]
    fn test_generic_error_has_no_stage() {
        let ctx = user_friendly_error(anyhow::anyhow!("boom"));
        assert!(ctx.stage.is_none());
        assert_eq!(ctx.error, "boom");
        assert!(ctx.details.is_none());
    }

    #[test]
    fn test_display_includes_sections() {
        let ctx = ErrorContext::new("broken")
            .with_stage("merged")
            .with_details("d")
            .with_suggestion("s");
        let text = ctx.to_string();
        assert!(text.contains("Stage: merged"));
        assert!(text.contains("Details: d"));
        assert!(text.contains("Suggestion: s"));
    }
}
