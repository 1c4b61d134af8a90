pub mod tokio_process;

pub use tokio_process::ProcessPrivilegedExecutor;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::config::PrivilegedConfig;
use crate::models::{CoreError, CoreErrorKind};
use crate::orchestration::CancellationToken;

pub type ExecutionResult<T> = Result<T, CoreError>;

pub type ActionFuture = Pin<Box<dyn Future<Output = ExecutionResult<ActionOutcome>> + Send>>;

/// Package changes that need elevated privileges.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PrivilegedAction {
    Install(String),
    Uninstall(String),
    Upgrade(String),
    UpgradeAll,
}

impl PrivilegedAction {
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Install(package) | Self::Uninstall(package) | Self::Upgrade(package) => {
                Some(package.as_str())
            }
            Self::UpgradeAll => None,
        }
    }

    /// Arguments passed to the package helper.
    pub fn helper_args(&self) -> Vec<String> {
        let mut args: Vec<String> = match self {
            Self::Install(package) | Self::Upgrade(package) => {
                vec!["-S".to_string(), package.clone()]
            }
            Self::Uninstall(package) => vec!["-Rdd".to_string(), package.clone()],
            Self::UpgradeAll => vec!["-Syu".to_string()],
        };
        args.push("--noconfirm".to_string());
        args
    }
}

impl Display for PrivilegedAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install(package) => write!(f, "install {package}"),
            Self::Uninstall(package) => write!(f, "uninstall {package}"),
            Self::Upgrade(package) => write!(f, "upgrade {package}"),
            Self::UpgradeAll => f.write_str("upgrade all packages"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessExitStatus {
    ExitCode(i32),
    Terminated,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionOutcome {
    pub action: PrivilegedAction,
    pub status: ProcessExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ActionOutcome {
    pub fn success(&self) -> bool {
        self.status == ProcessExitStatus::ExitCode(0)
    }
}

/// Runs privileged package actions. Only the CLI drives this; discovery
/// never mutates the system.
pub trait PrivilegedExecutor: Send + Sync {
    fn run(&self, action: PrivilegedAction, cancellation: CancellationToken) -> ActionFuture;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        if self.program.trim().is_empty() {
            return Err(invalid_input("command program must not be empty"));
        }

        if self
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(invalid_input(
                "command args must be non-empty and must not contain NUL bytes",
            ));
        }

        Ok(())
    }
}

/// Builds `<elevation> <helper> <args..>` for `action`.
pub fn command_for(config: &PrivilegedConfig, action: &PrivilegedAction) -> ExecutionResult<CommandSpec> {
    if let Some(package) = action.package() {
        validate_package_name(package)?;
    }

    let command = CommandSpec::new(config.elevation.as_str())
        .arg(config.helper.as_str())
        .args(action.helper_args());
    command.validate()?;
    Ok(command)
}

/// Rejects names the helper would parse as options or that carry whitespace.
fn validate_package_name(package: &str) -> ExecutionResult<()> {
    if package.is_empty() {
        return Err(invalid_input("package name must not be empty"));
    }
    if package.starts_with('-') {
        return Err(invalid_input("package name must not start with '-'"));
    }
    if package.chars().any(|c| c.is_whitespace() || c == '\0') {
        return Err(invalid_input(
            "package name must not contain whitespace or NUL bytes",
        ));
    }
    Ok(())
}

fn invalid_input(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}

#[cfg(test)]
mod tests {
    use super::{PrivilegedAction, command_for};
    use crate::config::PrivilegedConfig;
    use crate::models::CoreErrorKind;

    #[test]
    fn builds_helper_commands() {
        let config = PrivilegedConfig::default();

        let install = command_for(&config, &PrivilegedAction::Install("neovim".into())).unwrap();
        assert_eq!(install.program, "pkexec");
        assert_eq!(install.args, vec!["yay", "-S", "neovim", "--noconfirm"]);

        let uninstall = command_for(&config, &PrivilegedAction::Uninstall("neovim".into())).unwrap();
        assert_eq!(uninstall.args, vec!["yay", "-Rdd", "neovim", "--noconfirm"]);

        let upgrade_all = command_for(&config, &PrivilegedAction::UpgradeAll).unwrap();
        assert_eq!(upgrade_all.args, vec!["yay", "-Syu", "--noconfirm"]);
    }

    #[test]
    fn option_like_package_names_are_rejected() {
        let error = command_for(
            &PrivilegedConfig::default(),
            &PrivilegedAction::Install("--overwrite=*".into()),
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }

    #[test]
    fn empty_program_is_rejected() {
        let config = PrivilegedConfig {
            elevation: " ".to_string(),
            ..PrivilegedConfig::default()
        };
        let error = command_for(&config, &PrivilegedAction::UpgradeAll).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }
}
