//! The Composer facade: shapes logical operations into transport calls and
//! typed results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::events::Callback;
use crate::options::CommandOptions;
use crate::parser::{self, OutdatedPackage, PackageRecord, WhyEntry};
use crate::runner::{CliRunner, ComposerApp, EmbeddedRunner, Invocation, Runner};

/// Which transport strategy a [`Composer`] is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Spawn `php composer.phar` as a child process.
    Cli,
    /// Drive an in-process application entry point.
    Embedded,
}

/// Programmatic access point to Composer.
///
/// One instance serves one project directory; calls are synchronous and
/// blocking for the duration of the external tool's execution, and calls
/// against the same working directory must not run concurrently.
pub struct Composer {
    runner: Box<dyn Runner>,
    mode: Mode,
    muted: bool,
    /// Observers registered so far, replayed onto a swapped-in transport.
    observers: Vec<(String, Callback, i32)>,
}

/// JSON payload of `show --outdated --format=json`.
#[derive(Debug, Deserialize)]
struct OutdatedListing {
    #[serde(default)]
    installed: Vec<ListedPackage>,
}

#[derive(Debug, Deserialize)]
struct ListedPackage {
    name: String,
    version: String,
}

impl Composer {
    /// A facade driving the spawned-process transport.
    pub fn new(working_dir: impl Into<PathBuf>, composer_dir: Option<PathBuf>) -> Result<Self> {
        let runner = CliRunner::new(working_dir, composer_dir)?;
        Ok(Self::with_runner(Box::new(runner), Mode::Cli))
    }

    /// A facade driving an embedded application entry point.
    pub fn embedded<A: ComposerApp + 'static>(
        app: A,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let runner = EmbeddedRunner::new(app, working_dir)?;
        Ok(Self::with_runner(Box::new(runner), Mode::Embedded))
    }

    /// Wrap an already constructed transport.
    pub fn with_runner(runner: Box<dyn Runner>, mode: Mode) -> Self {
        Self {
            runner,
            mode,
            muted: false,
            observers: Vec::new(),
        }
    }

    /// Swap the transport. The current mute state is re-applied and all
    /// registered observers are re-attached to the new runner.
    pub fn set_runner(&mut self, runner: Box<dyn Runner>, mode: Mode) {
        self.runner = runner;
        self.mode = mode;

        if self.muted {
            self.runner.mute();
        } else {
            self.runner.unmute();
        }

        for (event, callback, priority) in &self.observers {
            self.runner
                .add_event(event, std::sync::Arc::clone(callback), *priority);
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// `composer install`. Prefers pre-built dist archives unless the caller
    /// already chose a source preference. Returns the captured output lines
    /// (empty when the unmuted process transport wrote to the terminal).
    #[tracing::instrument(skip(self, options))]
    pub fn install(&mut self, options: CommandOptions) -> Result<Vec<String>> {
        let invocation = Invocation::new("install")
            .options(prefer_dist_default(options))
            .streamed();
        self.runner.execute(&invocation)
    }

    /// `composer update`, with the same dist preference defaulting as
    /// [`Composer::install`].
    #[tracing::instrument(skip(self, options))]
    pub fn update(&mut self, options: CommandOptions) -> Result<Vec<String>> {
        let invocation = Invocation::new("update")
            .options(prefer_dist_default(options))
            .streamed();
        self.runner.execute(&invocation)
    }

    /// `composer require` for one or more packages. A version constraint is
    /// joined onto a single package with a colon separator.
    #[tracing::instrument(skip(self, packages, version, options))]
    pub fn require_package(
        &mut self,
        packages: &[String],
        version: Option<&str>,
        options: CommandOptions,
    ) -> Result<Vec<String>> {
        let mut invocation = Invocation::new("require")
            .options(prefer_dist_default(options))
            .streamed();

        match (packages, version) {
            ([package], Some(version)) if !version.is_empty() => {
                invocation = invocation.token(&format!("{package}:{version}"));
            }
            _ => {
                for package in packages {
                    invocation = invocation.token(package);
                }
            }
        }

        self.runner.execute(&invocation)
    }

    /// Outdated dependencies. Uses Composer's machine-readable JSON listing
    /// when the transport supports it, falling back to heuristic line
    /// parsing of the human-readable listing otherwise.
    #[tracing::instrument(skip(self, options))]
    pub fn outdated(
        &mut self,
        direct: bool,
        options: CommandOptions,
    ) -> Result<Vec<PackageRecord>> {
        if self.runner.supports_structured_output() {
            return self.outdated_structured(direct, options);
        }

        let mut options = options.flag("no-plugins");
        if direct {
            options = options.flag("direct");
        }

        let lines = self
            .runner
            .execute(&Invocation::new("outdated").options(options))?;

        if let Some(detail) = parser::find_exception_detail(&lines) {
            return Err(Error::ToolException(detail));
        }

        Ok(lines
            .iter()
            .filter_map(|line| parser::parse_package_line(line))
            .collect())
    }

    fn outdated_structured(
        &mut self,
        direct: bool,
        options: CommandOptions,
    ) -> Result<Vec<PackageRecord>> {
        let mut options = options.flag("outdated").value("format", "json");
        if direct {
            options = options.flag("direct");
        }

        let lines = self
            .runner
            .execute(&Invocation::new("show").options(options))?;

        if let Some(detail) = parser::find_exception_detail(&lines) {
            return Err(Error::ToolException(detail));
        }

        // The JSON payload shares the stream with ordinary chatter; the first
        // line that decodes wins.
        for line in &lines {
            if parser::is_noise_line(line) {
                continue;
            }
            if let Ok(listing) = serde_json::from_str::<OutdatedListing>(line) {
                return Ok(listing
                    .installed
                    .into_iter()
                    .map(|package| PackageRecord {
                        package: package.name,
                        version: package.version.trim_start_matches('v').to_string(),
                    })
                    .collect());
            }
        }

        Ok(Vec::new())
    }

    /// True when at least one dependency can be updated.
    pub fn updates_available(&mut self, direct: bool) -> Result<bool> {
        Ok(!self.outdated(direct, CommandOptions::new())?.is_empty())
    }

    /// The packages a real `composer update` would change, extracted from a
    /// dry run. Both historical diff formats are understood; the first line
    /// per package wins.
    #[tracing::instrument(skip(self))]
    pub fn get_outdated_packages(&mut self) -> Result<Vec<OutdatedPackage>> {
        let lines = self.runner.execute(
            &Invocation::new("update").options(CommandOptions::new().flag("dry-run")),
        )?;

        Ok(parser::parse_dry_run_updates(&lines))
    }

    /// Search the package repositories. Returns package name -> description.
    #[tracing::instrument(skip(self, options))]
    pub fn search(
        &mut self,
        needle: &str,
        options: CommandOptions,
    ) -> Result<BTreeMap<String, String>> {
        let lines = self
            .runner
            .execute(&Invocation::new("search").options(options).token(needle))?;

        Ok(lines
            .iter()
            .filter_map(|line| parser::parse_search_line(line))
            .collect())
    }

    /// Installed package names, optionally scoped to one package.
    #[tracing::instrument(skip(self, package, options))]
    pub fn show(
        &mut self,
        package: Option<&str>,
        options: CommandOptions,
    ) -> Result<Vec<String>> {
        let mut invocation = Invocation::new("show").options(options.flag("no-plugins"));
        if let Some(package) = package {
            invocation = invocation.token(package);
        }

        let lines = self.runner.execute(&invocation)?;

        Ok(lines
            .iter()
            .filter_map(|line| parser::parse_show_line(line))
            .collect())
    }

    /// Why a package is installed: its dependents and the constraints they
    /// place on it.
    #[tracing::instrument(skip(self, package))]
    pub fn why(&mut self, package: &str) -> Result<Vec<WhyEntry>> {
        let lines = self
            .runner
            .execute(&Invocation::new("why").token(package))?;

        Ok(lines
            .iter()
            .filter_map(|line| parser::parse_why_line(line))
            .collect())
    }

    /// All installed packages mapped to their current versions.
    #[tracing::instrument(skip(self))]
    pub fn get_versions(&mut self) -> Result<BTreeMap<String, String>> {
        let lines = self.runner.execute(
            &Invocation::new("show").options(CommandOptions::new().flag("installed")),
        )?;

        Ok(parser::parse_installed_versions(&lines))
    }

    /// Regenerate the autoloader without downloading anything. Failures are
    /// swallowed; the return value reports success.
    #[tracing::instrument(skip(self, options))]
    pub fn dump_autoload(&mut self, options: CommandOptions) -> bool {
        match self
            .runner
            .execute(&Invocation::new("dump-autoload").options(options))
        {
            Ok(_) => true,
            Err(error) => {
                warn!("dump-autoload failed: {error}");
                false
            }
        }
    }

    /// Clear Composer's cache. Failures are swallowed; the return value
    /// reports success.
    #[tracing::instrument(skip(self))]
    pub fn clear_cache(&mut self) -> bool {
        match self.runner.execute(&Invocation::new("clear-cache")) {
            Ok(_) => true,
            Err(error) => {
                warn!("clear-cache failed: {error}");
                false
            }
        }
    }

    /// Let install/update/require write straight to the terminal. Only
    /// meaningful for the process transport; the embedded transport is always
    /// silent.
    pub fn unmute(&mut self) {
        self.muted = false;
        self.runner.unmute();
    }

    /// Capture install/update/require output silently instead of showing it.
    pub fn mute(&mut self) {
        self.muted = true;
        self.runner.mute();
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Register an output observer; see [`crate::events::Events::add_event`].
    pub fn add_event(&mut self, event: &str, callback: Callback, priority: i32) {
        self.runner
            .add_event(event, std::sync::Arc::clone(&callback), priority);
        self.observers.push((event.to_string(), callback, priority));
    }
}

/// Apply the `--prefer-dist` default unless the caller picked a preference.
fn prefer_dist_default(options: CommandOptions) -> CommandOptions {
    if options.contains("prefer-dist") || options.contains("prefer-source") {
        options
    } else {
        options.flag("prefer-dist")
    }
}
