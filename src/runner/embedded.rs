//! In-process transport: drives Composer's application entry point directly,
//! for environments where spawning a child process is unavailable.

use std::env;
use std::path::PathBuf;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{Callback, Events, OUTPUT_EVENT};
use crate::output::{CapturedOutput, OutputChannel};
use crate::parser;

use super::{COMPOSER_HOME_ENV, Invocation, MANIFEST_FILE, Runner};

/// Event source id this transport reports to output observers.
const SOURCE: &str = "embedded";

/// The tool-side entry point the embedded transport drives.
///
/// The application accepts an argument-input object and an output sink,
/// returns the invocation status code, and can reset its internal state
/// between invocations.
#[cfg_attr(test, mockall::automock)]
pub trait ComposerApp: Send {
    /// Run one command synchronously, writing all output into `output`.
    fn run(&mut self, input: &AppInput, output: &mut CapturedOutput) -> anyhow::Result<i32>;

    /// Drop state accumulated by a previous invocation.
    fn reset(&mut self);
}

/// The invocation-argument structure handed to the application entry point.
#[derive(Debug, Clone)]
pub struct AppInput {
    pub command: String,
    pub working_dir: PathBuf,
    /// Serialized options followed by the positional tokens.
    pub arguments: Vec<String>,
}

/// Runs Composer inside the host process.
///
/// Always silent: output goes into the capturing sink, never to the terminal,
/// so `mute`/`unmute` are no-ops here. Every call resets the application
/// first so no state leaks between invocations.
///
/// The application inherits the host process context, so each call sets the
/// process working directory and `COMPOSER_HOME` globally. That makes this
/// transport non-reentrant within one process; callers must serialize use.
pub struct EmbeddedRunner<A: ComposerApp> {
    app: A,
    working_dir: PathBuf,
    composer_dir: PathBuf,
    events: Events,
}

impl<A: ComposerApp> EmbeddedRunner<A> {
    /// Create a runner for the project in `working_dir`, which must exist and
    /// contain a `composer.json` manifest.
    pub fn new(app: A, working_dir: impl Into<PathBuf>) -> Result<Self> {
        let working_dir = working_dir.into();

        if !working_dir.is_dir() {
            return Err(Error::WorkingDirMissing(working_dir));
        }
        if !working_dir.join(MANIFEST_FILE).is_file() {
            return Err(Error::ManifestMissing(working_dir));
        }

        let composer_dir = working_dir.clone();

        Ok(Self {
            app,
            working_dir,
            composer_dir,
            events: Events::new(),
        })
    }
}

impl<A: ComposerApp> Runner for EmbeddedRunner<A> {
    #[tracing::instrument(skip(self, invocation), fields(command = %invocation.command))]
    fn execute(&mut self, invocation: &Invocation) -> Result<Vec<String>> {
        // Fresh application state per call.
        self.app.reset();

        // SAFETY: this transport is non-reentrant; no other thread touches
        // the environment while an invocation runs.
        unsafe {
            env::set_var(COMPOSER_HOME_ENV, &self.composer_dir);
        }
        env::set_current_dir(&self.working_dir)?;

        let mut arguments = vec![format!("--working-dir={}", self.working_dir.display())];
        arguments.extend(invocation.options.to_args());
        arguments.extend(invocation.tokens.iter().cloned());

        let input = AppInput {
            command: invocation.command.clone(),
            working_dir: self.working_dir.clone(),
            arguments,
        };

        debug!("running embedded composer {}", invocation.command);
        let mut output = CapturedOutput::new();
        let status = self.app.run(&input, &mut output)?;
        output.flush();
        let lines = output.into_lines();

        // The application cannot stream, so observers receive the captured
        // lines once the invocation finished.
        for line in &lines {
            if let Err(errors) = self.events.fire(OUTPUT_EVENT, SOURCE, line, OutputChannel::Stdout)
            {
                warn!("{errors}");
            }
        }

        // The tool's own diagnostics can signal a fatal condition even when
        // the status code does not carry it.
        if let Some(detail) = parser::find_exception_detail(&lines) {
            return Err(Error::ToolException(detail));
        }

        if status != 0 {
            return Err(Error::ExecutionFailed {
                status,
                output: lines,
            });
        }

        Ok(lines)
    }

    fn unmute(&mut self) {}

    fn mute(&mut self) {}

    fn supports_structured_output(&self) -> bool {
        true
    }

    fn add_event(&mut self, event: &str, callback: Callback, priority: i32) {
        self.events.add_event(event, callback, priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn project_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{}").unwrap();
        dir
    }

    #[test]
    fn test_missing_working_dir_is_a_setup_error() {
        let result = EmbeddedRunner::new(MockComposerApp::new(), "/definitely/not/here");
        assert!(matches!(result, Err(Error::WorkingDirMissing(_))));
    }

    #[test]
    fn test_missing_manifest_is_a_setup_error() {
        let dir = tempdir().unwrap();
        let result = EmbeddedRunner::new(MockComposerApp::new(), dir.path());
        assert!(matches!(result, Err(Error::ManifestMissing(_))));
    }

    #[test]
    fn test_successful_run_returns_captured_lines() {
        let dir = project_dir();

        let mut app = MockComposerApp::new();
        let mut sequence = mockall::Sequence::new();
        app.expect_reset()
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(());
        app.expect_run()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, output| {
                output.write("vendor/alpha 1.0.0", true);
                output.write("vendor/beta 2.0.0", true);
                Ok(0)
            });

        let mut runner = EmbeddedRunner::new(app, dir.path()).unwrap();
        let lines = runner.execute(&Invocation::new("show")).unwrap();

        assert_eq!(lines, ["vendor/alpha 1.0.0", "vendor/beta 2.0.0"]);
    }

    #[test]
    fn test_exception_marker_wins_over_status_code() {
        let dir = project_dir();

        let mut app = MockComposerApp::new();
        app.expect_reset().return_const(());
        app.expect_run().returning(|_, output| {
            output.write("  [RuntimeException]", true);
            output.write("  The lock file is not up to date.", true);
            // Composer reported success even though the output says otherwise.
            Ok(0)
        });

        let mut runner = EmbeddedRunner::new(app, dir.path()).unwrap();
        let error = runner.execute(&Invocation::new("update")).unwrap_err();

        match error {
            Error::ToolException(detail) => {
                assert_eq!(detail, "The lock file is not up to date.");
            }
            other => panic!("expected ToolException, got {other:?}"),
        }
    }

    #[test]
    fn test_nonzero_status_carries_output() {
        let dir = project_dir();

        let mut app = MockComposerApp::new();
        app.expect_reset().return_const(());
        app.expect_run().returning(|_, output| {
            output.write("Your requirements could not be resolved.", true);
            Ok(2)
        });

        let mut runner = EmbeddedRunner::new(app, dir.path()).unwrap();
        let error = runner.execute(&Invocation::new("install")).unwrap_err();

        match error {
            Error::ExecutionFailed { status, output } => {
                assert_eq!(status, 2);
                assert_eq!(output, ["Your requirements could not be resolved."]);
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_input_carries_working_dir_options_and_tokens() {
        let dir = project_dir();
        let working_dir = dir.path().to_path_buf();

        let mut app = MockComposerApp::new();
        app.expect_reset().return_const(());
        let expected_dir = working_dir.clone();
        app.expect_run()
            .withf(move |input, _| {
                input.command == "require"
                    && input.working_dir == expected_dir
                    && input.arguments.iter().any(|a| a == "--prefer-dist")
                    && input.arguments.last().map(String::as_str) == Some("vendor/pkg:^2.0")
            })
            .returning(|_, _| Ok(0));

        let mut runner = EmbeddedRunner::new(app, dir.path()).unwrap();
        let invocation = Invocation::new("require")
            .options(crate::options::CommandOptions::new().flag("prefer-dist"))
            .token("vendor/pkg:^2.0");

        runner.execute(&invocation).unwrap();
    }

    #[test]
    fn test_observers_receive_captured_lines() {
        let dir = project_dir();

        let mut app = MockComposerApp::new();
        app.expect_reset().return_const(());
        app.expect_run().returning(|_, output| {
            output.write("Generating autoload files", true);
            Ok(0)
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let mut runner = EmbeddedRunner::new(app, dir.path()).unwrap();
        runner.add_event(
            OUTPUT_EVENT,
            Arc::new(move |source, chunk, _| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((source.to_string(), chunk.to_string()));
                Ok(())
            }),
            0,
        );

        runner.execute(&Invocation::new("dump-autoload")).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            [("embedded".to_string(), "Generating autoload files".to_string())]
        );
    }
}
