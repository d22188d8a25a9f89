//! Programmatic facade over the Composer package manager.
//!
//! Runs Composer for a project directory, either as a spawned
//! `php composer.phar` child process or through an embedded application
//! entry point, captures the streamed output into whole lines, and parses
//! Composer's human-readable listings into typed records.
//!
//! ```no_run
//! use composer_bridge::{Composer, options::CommandOptions};
//!
//! # fn main() -> composer_bridge::Result<()> {
//! let mut composer = Composer::new("/srv/app", None)?;
//! for outdated in composer.outdated(false, CommandOptions::new())? {
//!     println!("{} {}", outdated.package, outdated.version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod composer;
pub mod error;
pub mod events;
pub mod options;
pub mod output;
pub mod parser;
pub mod runner;

pub use composer::{Composer, Mode};
pub use error::{Error, Result};
