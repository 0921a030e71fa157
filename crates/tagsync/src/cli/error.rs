//! User-facing CLI errors: what failed, the situation, and commands to try.

use std::fmt;
use std::path::Path;

/// A usage or environment error with hints for the user.
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    /// Rendered as `TRY:` lines
    pub hints: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            hints: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn not_a_directory(path: &Path) -> Self {
        Self::new(format!("Not a directory: {}", path.display()))
            .hint(format!("ls -ld {}", path.display()))
    }

    /// A scan reached a directory marked as a backup target.
    pub fn destination_guard(path: &Path) -> Self {
        Self::new(format!("Refusing to scan backup destination: {}", path.display()))
            .with_context("The directory carries a tagsync.json descriptor with \"type\": \"dest\"")
            .hint("Scan the source tree instead of the backup target")
            .hint(format!(
                "If this is no longer a backup target: rm {}",
                path.join("tagsync.json").display()
            ))
    }

    pub fn conflicting_flags(a: &str, b: &str) -> Self {
        Self::new(format!("{} and {} cannot be used together", a, b))
            .hint(format!("Run the command twice, once with {} and once with {}", a, b))
    }

    /// A backup group needs at least one source and a destination.
    pub fn missing_backup_destination() -> Self {
        Self::new("Need at least one source and a destination in each group")
            .with_context("The last path of each group is the destination")
            .hint("tagsync backup ~/work /mnt/backup")
            .hint("tagsync backup -n photos ~/pics /mnt/a -n docs ~/docs /mnt/b")
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\nCONTEXT: {}", context)?;
        }
        if !self.hints.is_empty() {
            writeln!(f)?;
            for hint in &self.hints {
                write!(f, "\n  TRY: {}", hint)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
