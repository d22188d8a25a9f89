use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use composer_bridge::composer::{Composer, Mode};
use composer_bridge::options::CommandOptions;
use composer_bridge::runner::CliRunner;

/// composer-bridge - drive Composer programmatically
///
/// Runs Composer for a project directory and turns its textual output into
/// structured listings. The composer.phar is looked up in the Composer home
/// directory (defaults to the working directory) and run with the `php`
/// interpreter.
#[derive(Parser, Debug)]
#[command(author, version = env!("COMPOSER_BRIDGE_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory containing composer.json (also via COMPOSER_BRIDGE_DIR)
    #[arg(
        long = "working-dir",
        short = 'd',
        env = "COMPOSER_BRIDGE_DIR",
        value_name = "PATH",
        default_value = ".",
        global = true
    )]
    working_dir: PathBuf,

    /// Composer home directory holding composer.phar (defaults to the working dir)
    #[arg(long = "composer-dir", value_name = "PATH", global = true)]
    composer_dir: Option<PathBuf>,

    /// PHP interpreter used to run composer.phar
    #[arg(long = "php", env = "COMPOSER_BRIDGE_PHP", value_name = "BIN", global = true)]
    php: Option<PathBuf>,

    /// Capture install/update/require output instead of streaming it to the terminal
    #[arg(long, global = true)]
    mute: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install the project dependencies
    Install(PreferenceArgs),

    /// Update dependencies to their latest constrained versions
    Update(PreferenceArgs),

    /// Add packages to the project requirements
    Require(RequireArgs),

    /// List outdated dependencies
    Outdated(OutdatedArgs),

    /// Show which packages a dry-run update would change
    Diff,

    /// Search the package repositories
    Search(SearchArgs),

    /// List installed packages
    Show(ShowArgs),

    /// Explain why a package is installed
    Why(WhyArgs),

    /// Regenerate the autoloader files
    DumpAutoload,

    /// Clear the Composer cache
    ClearCache,

    /// Print installed packages with their versions
    Versions,
}

#[derive(clap::Args, Debug)]
struct PreferenceArgs {
    /// Prefer source checkouts over dist archives
    #[arg(long)]
    prefer_source: bool,

    /// Skip dev requirements
    #[arg(long)]
    no_dev: bool,
}

#[derive(clap::Args, Debug)]
struct RequireArgs {
    /// Packages to require, e.g. "vendor/pkg"
    #[arg(value_name = "PACKAGE", required = true)]
    packages: Vec<String>,

    /// Version constraint for a single package, e.g. "^2.0"
    #[arg(long, value_name = "CONSTRAINT")]
    constraint: Option<String>,

    /// Prefer source checkouts over dist archives
    #[arg(long)]
    prefer_source: bool,
}

#[derive(clap::Args, Debug)]
struct OutdatedArgs {
    /// Check only direct dependencies
    #[arg(long)]
    direct: bool,

    /// Only report whether updates are available
    #[arg(long)]
    check: bool,
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// The search term
    #[arg(value_name = "NEEDLE")]
    needle: String,
}

#[derive(clap::Args, Debug)]
struct ShowArgs {
    /// Restrict the listing to one package
    #[arg(value_name = "PACKAGE")]
    package: Option<String>,
}

#[derive(clap::Args, Debug)]
struct WhyArgs {
    /// The package to explain
    #[arg(value_name = "PACKAGE")]
    package: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut composer = build_composer(&cli)?;
    if cli.mute {
        composer.mute();
    }

    match &cli.command {
        Commands::Install(args) => {
            let lines = composer
                .install(preference_options(args))
                .map_err(dump_diagnostics)?;
            print_lines(&lines);
        }
        Commands::Update(args) => {
            let lines = composer
                .update(preference_options(args))
                .map_err(dump_diagnostics)?;
            print_lines(&lines);
        }
        Commands::Require(args) => {
            let mut options = CommandOptions::new();
            if args.prefer_source {
                options = options.flag("prefer-source");
            }
            let lines = composer
                .require_package(&args.packages, args.constraint.as_deref(), options)
                .map_err(dump_diagnostics)?;
            print_lines(&lines);
        }
        Commands::Outdated(args) => {
            let outdated = composer.outdated(args.direct, CommandOptions::new())?;
            if args.check {
                if outdated.is_empty() {
                    println!("everything up to date");
                } else {
                    println!("{} update(s) available", outdated.len());
                }
            } else if outdated.is_empty() {
                println!("All dependencies are up to date.");
            } else {
                for record in outdated {
                    println!("{} {}", record.package, record.version);
                }
            }
        }
        Commands::Diff => {
            let updates = composer.get_outdated_packages()?;
            if updates.is_empty() {
                println!("Nothing to update.");
            }
            for update in updates {
                println!("{} {} -> {}", update.package, update.old_version, update.version);
            }
        }
        Commands::Search(args) => {
            for (name, description) in composer.search(&args.needle, CommandOptions::new())? {
                println!("{name} {description}");
            }
        }
        Commands::Show(args) => {
            for package in composer.show(args.package.as_deref(), CommandOptions::new())? {
                println!("{package}");
            }
        }
        Commands::Why(args) => {
            for entry in composer.why(&args.package)? {
                println!("{} {} ({})", entry.package, entry.version, entry.constraint);
            }
        }
        Commands::DumpAutoload => {
            if !composer.dump_autoload(CommandOptions::new()) {
                anyhow::bail!("dump-autoload failed");
            }
            println!("Autoload files generated.");
        }
        Commands::ClearCache => {
            if !composer.clear_cache() {
                anyhow::bail!("clear-cache failed");
            }
            println!("Cache cleared.");
        }
        Commands::Versions => {
            for (name, version) in composer.get_versions()? {
                println!("{name} {version}");
            }
        }
    }

    Ok(())
}

fn build_composer(cli: &Cli) -> Result<Composer> {
    let composer_dir = cli
        .composer_dir
        .clone()
        .or_else(|| fallback_composer_dir(&cli.working_dir));

    let mut runner = CliRunner::new(&cli.working_dir, composer_dir)?;
    if let Some(php) = &cli.php {
        runner = runner.with_php_binary(php);
    }
    Ok(Composer::with_runner(Box::new(runner), Mode::Cli))
}

/// When the project directory carries no composer.phar, fall back to the
/// conventional per-user location.
fn fallback_composer_dir(working_dir: &Path) -> Option<PathBuf> {
    if working_dir.join("composer.phar").exists() {
        return None;
    }

    let home = dirs::home_dir()?.join(".composer");
    if home.join("composer.phar").exists() {
        log::debug!("using composer.phar from {}", home.display());
        Some(home)
    } else {
        None
    }
}

fn preference_options(args: &PreferenceArgs) -> CommandOptions {
    let mut options = CommandOptions::new();
    if args.prefer_source {
        options = options.flag("prefer-source");
    }
    if args.no_dev {
        options = options.flag("no-dev");
    }
    options
}

/// Print the diagnostic lines a failed execution captured, then pass the
/// error on.
fn dump_diagnostics(error: composer_bridge::Error) -> anyhow::Error {
    for line in error.output() {
        eprintln!("{}", line.trim_end());
    }
    error.into()
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line.trim_end());
    }
}
