//! Spawned-process transport: runs `php composer.phar` as a child process.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{Callback, Events, OUTPUT_EVENT};
use crate::output::{CapturedOutput, OutputChannel};

use super::{COMPOSER_HOME_ENV, Invocation, Runner};

/// Event source id this transport reports to output observers.
const SOURCE: &str = "cli";

/// Runs Composer as a child process, streaming its combined output through a
/// [`CapturedOutput`] sink.
///
/// Success is the child's exit status, never the textual content. No timeout
/// is applied: a long-running install must not be preempted. The working
/// directory and `COMPOSER_HOME` are confined to the child process, but one
/// runner must still not be used for concurrent invocations against the same
/// working directory.
#[derive(Debug)]
pub struct CliRunner {
    working_dir: PathBuf,
    composer_dir: PathBuf,
    php_binary: PathBuf,
    muted: bool,
    events: Events,
}

impl CliRunner {
    /// Create a runner for the project in `working_dir`, which must exist.
    /// The Composer home (and the `composer.phar` location) defaults to the
    /// working directory.
    pub fn new(working_dir: impl Into<PathBuf>, composer_dir: Option<PathBuf>) -> Result<Self> {
        let working_dir = working_dir.into();

        if !working_dir.is_dir() {
            return Err(Error::WorkingDirMissing(working_dir));
        }

        let composer_dir = composer_dir.unwrap_or_else(|| working_dir.clone());

        Ok(Self {
            working_dir,
            composer_dir,
            php_binary: PathBuf::from("php"),
            muted: false,
            events: Events::new(),
        })
    }

    /// Override the PHP interpreter used to run `composer.phar`.
    pub fn with_php_binary(mut self, php: impl Into<PathBuf>) -> Self {
        self.php_binary = php.into();
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut command = Command::new(&self.php_binary);
        command
            .arg(self.composer_dir.join("composer.phar"))
            .arg(format!("--working-dir={}", self.working_dir.display()))
            .args(invocation.options.to_args())
            .arg(&invocation.command)
            .args(&invocation.tokens)
            .current_dir(&self.working_dir)
            .env(COMPOSER_HOME_ENV, &self.composer_dir);
        command
    }

    /// Visible path: the child inherits our stdio, nothing is captured.
    fn execute_visible(&self, invocation: &Invocation) -> Result<Vec<String>> {
        let mut command = self.command(invocation);
        debug!("running visible: {:?}", command);

        let status = command.status()?;
        if !status.success() {
            return Err(Error::ExecutionFailed {
                status: status.code().unwrap_or(-1),
                output: Vec::new(),
            });
        }

        Ok(Vec::new())
    }

    /// Captured path: both channels are piped through the output sink, and
    /// every chunk is forwarded to registered observers as it arrives.
    fn execute_captured(&self, invocation: &Invocation) -> Result<Vec<String>> {
        let mut command = self.command(invocation);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("running captured: {:?}", command);

        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let sink = Mutex::new(CapturedOutput::new());

        thread::scope(|scope| {
            scope.spawn(|| pump(stdout, &sink, &self.events, OutputChannel::Stdout));
            scope.spawn(|| pump(stderr, &sink, &self.events, OutputChannel::Stderr));
        });

        let status = child.wait()?;

        let mut sink = sink.into_inner().unwrap();
        sink.flush();
        let lines = sink.into_lines();

        if !status.success() {
            return Err(Error::ExecutionFailed {
                status: status.code().unwrap_or(-1),
                output: lines,
            });
        }

        Ok(lines)
    }
}

/// Drain one child stream into the shared sink, notifying observers per chunk.
fn pump(
    stream: Option<impl Read>,
    sink: &Mutex<CapturedOutput>,
    events: &Events,
    channel: OutputChannel,
) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut buffer = [0u8; 4096];

    loop {
        match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => {
                let chunk = String::from_utf8_lossy(&buffer[..read]);

                if let Err(errors) = events.fire(OUTPUT_EVENT, SOURCE, &chunk, channel) {
                    warn!("{errors}");
                }

                // Feed the sink at line granularity where the chunk allows it;
                // a trailing piece without a newline stays buffered for the
                // next read.
                let mut sink = sink.lock().unwrap();
                for piece in chunk.split_inclusive('\n') {
                    sink.write(piece, false);
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => {
                warn!("error reading composer {channel}: {error}");
                break;
            }
        }
    }
}

impl Runner for CliRunner {
    #[tracing::instrument(skip(self, invocation), fields(command = %invocation.command))]
    fn execute(&mut self, invocation: &Invocation) -> Result<Vec<String>> {
        if invocation.streamed && !self.muted {
            self.execute_visible(invocation)
        } else {
            self.execute_captured(invocation)
        }
    }

    fn unmute(&mut self) {
        self.muted = false;
    }

    fn mute(&mut self) {
        self.muted = true;
    }

    fn supports_structured_output(&self) -> bool {
        false
    }

    fn add_event(&mut self, event: &str, callback: Callback, priority: i32) {
        self.events.add_event(event, callback, priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Write a shell stub standing in for composer.phar; the runner invokes
    /// it through `sh` instead of `php`.
    #[cfg(unix)]
    fn stub_runner(dir: &Path, script: &str) -> CliRunner {
        std::fs::write(dir.join("composer.phar"), script).unwrap();
        CliRunner::new(dir, None).unwrap().with_php_binary("sh")
    }

    #[test]
    fn test_missing_working_dir_is_a_setup_error() {
        let result = CliRunner::new("/definitely/not/here", None);
        assert!(matches!(result, Err(Error::WorkingDirMissing(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_captured_execution_collects_lines() {
        let dir = tempdir().unwrap();
        let mut runner = stub_runner(
            dir.path(),
            "echo 'vendor/alpha 1.0.0'\necho 'vendor/beta 2.0.0'\n",
        );

        let lines = runner.execute(&Invocation::new("show")).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].trim_end(), "vendor/alpha 1.0.0");
        assert_eq!(lines[1].trim_end(), "vendor/beta 2.0.0");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_carries_captured_output() {
        let dir = tempdir().unwrap();
        let mut runner = stub_runner(dir.path(), "echo 'something went wrong'\nexit 3\n");

        let error = runner.execute(&Invocation::new("install")).unwrap_err();

        match error {
            Error::ExecutionFailed { status, output } => {
                assert_eq!(status, 3);
                assert_eq!(output[0].trim_end(), "something went wrong");
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_composer_home_is_set_for_the_child() {
        let dir = tempdir().unwrap();
        let mut runner = stub_runner(dir.path(), "echo \"home $COMPOSER_HOME\"\n");

        let lines = runner.execute(&Invocation::new("show")).unwrap();

        assert!(lines[0].contains(dir.path().to_str().unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_observers_see_both_channels() {
        let dir = tempdir().unwrap();
        let mut runner = stub_runner(dir.path(), "echo out\necho err >&2\n");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        runner.add_event(
            OUTPUT_EVENT,
            Arc::new(move |source, chunk, channel| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((source.to_string(), chunk.to_string(), channel));
                Ok(())
            }),
            0,
        );

        runner.execute(&Invocation::new("update")).unwrap();

        let seen = seen.lock().unwrap();
        let stdout_text: String = seen
            .iter()
            .filter(|(_, _, channel)| *channel == OutputChannel::Stdout)
            .map(|(_, chunk, _)| chunk.as_str())
            .collect();
        let stderr_text: String = seen
            .iter()
            .filter(|(_, _, channel)| *channel == OutputChannel::Stderr)
            .map(|(_, chunk, _)| chunk.as_str())
            .collect();

        assert!(stdout_text.contains("out"));
        assert!(stderr_text.contains("err"));
        assert!(seen.iter().all(|(source, _, _)| source == "cli"));
    }

    #[cfg(unix)]
    #[test]
    fn test_streamed_invocation_is_visible_when_unmuted() {
        let dir = tempdir().unwrap();
        let mut runner = stub_runner(dir.path(), "exit 0\n");

        // Unmuted + streamed: runs on the terminal, nothing captured.
        let lines = runner
            .execute(&Invocation::new("install").streamed())
            .unwrap();
        assert!(lines.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_streamed_invocation_is_captured_when_muted() {
        let dir = tempdir().unwrap();
        let mut runner = stub_runner(dir.path(), "echo 'Installing dependencies'\n");
        runner.mute();

        let lines = runner
            .execute(&Invocation::new("install").streamed())
            .unwrap();
        assert_eq!(lines[0].trim_end(), "Installing dependencies");
    }

    #[cfg(unix)]
    #[test]
    fn test_interleaved_partial_writes_reassemble() {
        let dir = tempdir().unwrap();
        // printf without a newline, then complete the line in a second write.
        let mut runner = stub_runner(dir.path(), "printf 'vendor/pkg '\nsleep 0\necho '1.0.0'\n");

        let lines = runner.execute(&Invocation::new("show")).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].trim_end(), "vendor/pkg 1.0.0");
    }
}
