//! Execution transports for the Composer tool.
//!
//! Two interchangeable strategies implement [`Runner`]: [`CliRunner`] spawns
//! `php composer.phar` as a child process, [`EmbeddedRunner`] drives an
//! in-process application entry point. Callers depend on the trait only,
//! never on the concrete variant.

mod cli;
mod embedded;

pub use cli::CliRunner;
pub use embedded::{AppInput, ComposerApp, EmbeddedRunner};

#[cfg(test)]
pub use embedded::MockComposerApp;

use crate::error::Result;
use crate::events::Callback;
use crate::options::CommandOptions;

/// The environment variable Composer reads its home/cache directory from.
pub const COMPOSER_HOME_ENV: &str = "COMPOSER_HOME";

/// Composer's project manifest file.
pub const MANIFEST_FILE: &str = "composer.json";

/// One Composer invocation: subcommand, flag options and positional tokens.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub command: String,
    pub options: CommandOptions,
    pub tokens: Vec<String>,
    /// Mutating operations (install/update/require) may run uncaptured on an
    /// unmuted process transport, for direct terminal visibility.
    pub streamed: bool,
}

impl Invocation {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Default::default()
        }
    }

    pub fn options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.tokens.push(token.to_string());
        self
    }

    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }
}

/// A strategy for running Composer.
///
/// Implementations are synchronous and blocking: a call runs to completion
/// with no timeout and no cancellation. Every call touches per-invocation
/// execution context (working directory, `COMPOSER_HOME`), so concurrent
/// invocations against the same working directory must be serialized by the
/// caller.
#[cfg_attr(test, mockall::automock)]
pub trait Runner: Send {
    /// Run one invocation and return the captured output lines. A non-zero
    /// exit status is an [`crate::Error::ExecutionFailed`] carrying the
    /// captured text.
    fn execute(&mut self, invocation: &Invocation) -> Result<Vec<String>>;

    /// Route mutating operations through the visible, uncaptured path.
    fn unmute(&mut self);

    /// Route mutating operations through the silent, captured path.
    fn mute(&mut self);

    /// Whether the transport can produce machine-readable (JSON) listings.
    fn supports_structured_output(&self) -> bool;

    /// Register an observer for a named event. `output` is the only event
    /// raised by the transports; see [`crate::events::Events::add_event`].
    fn add_event(&mut self, event: &str, callback: Callback, priority: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let invocation = Invocation::new("require")
            .options(CommandOptions::new().flag("prefer-dist"))
            .token("vendor/pkg:^2.0")
            .streamed();

        assert_eq!(invocation.command, "require");
        assert_eq!(invocation.tokens, ["vendor/pkg:^2.0"]);
        assert!(invocation.streamed);
        assert!(invocation.options.contains("prefer-dist"));
    }

    #[test]
    fn test_invocation_defaults_to_captured() {
        let invocation = Invocation::new("show");
        assert!(!invocation.streamed);
        assert!(invocation.tokens.is_empty());
    }
}
