//! External command execution.
//!
//! Engines never spawn processes directly; they describe a [`Command`] and
//! hand it to a [`CommandRunner`], so tests can substitute a recording fake.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::SyncError;

/// A program invocation in a working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub dir: PathBuf,
    pub name: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Command {
    pub fn new<I, S>(dir: &Path, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// The command line as a user would type it.
    pub fn cli(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs commands and returns their standard output.
///
/// A non-zero exit is a [`SyncError::Command`] carrying the captured output.
pub trait CommandRunner {
    fn run(&self, command: &Command) -> Result<String, SyncError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &Command) -> Result<String, SyncError> {
        (**self).run(command)
    }
}

/// [`CommandRunner`] backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &Command) -> Result<String, SyncError> {
        tracing::debug!("running {} in {}", command.cli(), command.dir.display());
        let output = std::process::Command::new(&command.name)
            .args(&command.args)
            .envs(&command.env)
            .current_dir(&command.dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SyncError::Command {
                command: command.cli(),
                output: e.to_string(),
                source: Some(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let captured = [stdout.trim(), stderr.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(SyncError::Command {
                command: command.cli(),
                output: format!("{}: {captured}", output.status),
                source: None,
            });
        }
        Ok(stdout)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording runner shared by unit tests.

    use std::cell::RefCell;

    use super::*;

    type Reply = Box<dyn Fn(&Command) -> Result<String, SyncError>>;

    /// Records every command and answers through `reply`.
    pub(crate) struct FakeRunner {
        pub(crate) calls: RefCell<Vec<Command>>,
        reply: Reply,
    }

    impl FakeRunner {
        pub(crate) fn new(reply: impl Fn(&Command) -> Result<String, SyncError> + 'static) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                reply: Box::new(reply),
            }
        }

        pub(crate) fn ok() -> Self {
            Self::new(|_| Ok(String::new()))
        }

        pub(crate) fn clis(&self) -> Vec<String> {
            self.calls.borrow().iter().map(Command::cli).collect()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, command: &Command) -> Result<String, SyncError> {
            self.calls.borrow_mut().push(command.clone());
            (self.reply)(command)
        }
    }
}
