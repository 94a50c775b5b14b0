//! Remote command execution on the grading host.
//!
//! Each call opens its own ssh session, runs exactly one command line, and
//! tears the session down again. Commands are built from structured parts
//! ([`RemoteCommand`]) and every part is checked against a conservative
//! character set before it is rendered into a shell line.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ServiceConfig;
use crate::error::RemoteError;

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// `cd <workdir> && ./<program> <args...>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub workdir: String,
    pub program: String,
    pub args: Vec<String>,
}

impl RemoteCommand {
    pub fn new(workdir: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Render the shell line sent to the remote host.
    pub fn render(&self) -> Result<String, RemoteError> {
        check_part(&self.workdir, true)?;
        check_part(&self.program, false)?;
        let mut line = format!("cd {} && ./{}", self.workdir, self.program);
        for arg in &self.args {
            check_part(arg, false)?;
            line.push(' ');
            line.push_str(arg);
        }
        Ok(line)
    }
}

fn check_part(part: &str, is_path: bool) -> Result<(), RemoteError> {
    let allowed = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') || (is_path && matches!(c, '/' | '~'))
    };
    if part.is_empty() || part.starts_with('-') || !part.chars().all(allowed) {
        return Err(RemoteError::InvalidArgument(part.to_string()));
    }
    Ok(())
}

/// Output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommandResult {
    pub raw_output: String,
    /// Last line of output, ignoring trailing newlines.
    pub last_line: String,
}

impl RemoteCommandResult {
    pub fn from_output(raw_output: String) -> Self {
        let last_line = raw_output
            .trim_end_matches(['\n', '\r'])
            .rsplit('\n')
            .next()
            .unwrap_or_default()
            .trim_end_matches('\r')
            .to_string();
        Self {
            raw_output,
            last_line,
        }
    }
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, command: &RemoteCommand) -> Result<RemoteCommandResult, RemoteError>;

    /// Host name used in user-facing messages.
    fn host(&self) -> &str;
}

/// Runs commands through the system ssh client in batch mode (key or agent
/// authentication, never an interactive prompt).
#[derive(Debug, Clone)]
pub struct SshExecutor {
    program: String,
    host: String,
    user: String,
    port: u16,
    identity: Option<PathBuf>,
    timeout: Duration,
}

impl SshExecutor {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            program: config.ssh_program.clone(),
            host: config.ssh_host.clone(),
            user: config.ssh_user.clone(),
            port: config.ssh_port,
            identity: config.ssh_identity.clone(),
            timeout: config.remote_timeout(),
        }
    }

    fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    fn command(&self, line: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(self.port.to_string());
        if let Some(identity) = &self.identity {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(self.destination())
            .arg(line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, command: &RemoteCommand) -> Result<RemoteCommandResult, RemoteError> {
        let line = command.render()?;
        tracing::info!(host = %self.host, command = %line, "Running remote command");

        // Dropping the child on timeout kills the session.
        let child = self.command(&line).spawn()?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout))??;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(SSH_CONNECTION_FAILURE) => {
                return Err(RemoteError::Connection {
                    status: SSH_CONNECTION_FAILURE,
                    stderr,
                });
            }
            Some(0) => {}
            code => tracing::warn!(
                host = %self.host,
                exit = code.unwrap_or(-1),
                %stderr,
                "Remote command exited unsuccessfully"
            ),
        }

        let result = RemoteCommandResult::from_output(String::from_utf8_lossy(&output.stdout).into_owned());
        tracing::info!(last_line = %result.last_line, "Remote command finished");
        Ok(result)
    }

    fn host(&self) -> &str {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_autograder_command() {
        let cmd = RemoteCommand::new("/srv/cs106b/submissions", "run-autograder")
            .arg("4")
            .arg("jdoe");
        assert_eq!(
            cmd.render().unwrap(),
            "cd /srv/cs106b/submissions && ./run-autograder 4 jdoe"
        );
    }

    #[test]
    fn refuses_shell_metacharacters() {
        let cmd = RemoteCommand::new("/srv/b/submissions", "run-autograder").arg("x; rm -rf ~");
        assert!(matches!(cmd.render(), Err(RemoteError::InvalidArgument(_))));

        let cmd = RemoteCommand::new("/srv/b submissions", "run-autograder");
        assert!(cmd.render().is_err());

        let cmd = RemoteCommand::new("/srv", "../bin/sh").arg("-c");
        assert!(cmd.render().is_err());
    }

    #[test]
    fn last_line_skips_trailing_newlines() {
        let result = RemoteCommandResult::from_output("compiling\nInjected 12 submissions\n".into());
        assert_eq!(result.last_line, "Injected 12 submissions");

        let result = RemoteCommandResult::from_output("single".into());
        assert_eq!(result.last_line, "single");

        let result = RemoteCommandResult::from_output("a\r\nb\r\n".into());
        assert_eq!(result.last_line, "b");

        let result = RemoteCommandResult::from_output(String::new());
        assert_eq!(result.last_line, "");
    }

    #[test]
    fn ssh_arguments() {
        let config = ServiceConfig {
            ssh_host: "myth.stanford.edu".into(),
            ssh_user: "grader".into(),
            ssh_port: 2222,
            ssh_identity: Some(PathBuf::from("/keys/grader")),
            ..Default::default()
        };
        let ssh = SshExecutor::from_config(&config);
        assert_eq!(ssh.destination(), "grader@myth.stanford.edu");

        let cmd = ssh.command("cd /x && ./y");
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-i",
                "/keys/grader",
                "grader@myth.stanford.edu",
                "cd /x && ./y",
            ]
        );
    }

    #[tokio::test]
    async fn missing_ssh_binary_is_a_spawn_error() {
        let config = ServiceConfig {
            ssh_program: "/nonexistent/ssh-client".into(),
            ..Default::default()
        };
        let ssh = SshExecutor::from_config(&config);
        let cmd = RemoteCommand::new("/srv/a/submissions", "run-autograder").arg("1");
        assert!(matches!(ssh.run(&cmd).await, Err(RemoteError::Spawn(_))));
    }

    /// Writes an executable `sh` script standing in for the ssh client.
    #[cfg(unix)]
    fn fake_ssh(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("ssh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_255_is_a_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            ssh_program: fake_ssh(&dir, "echo boom >&2\nexit 255"),
            ..Default::default()
        };
        let ssh = SshExecutor::from_config(&config);
        let cmd = RemoteCommand::new("/srv/a/submissions", "run-autograder").arg("1");
        match ssh.run(&cmd).await {
            Err(RemoteError::Connection { status, stderr }) => {
                assert_eq!(status, 255);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected connection failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn other_exit_codes_still_return_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            ssh_program: fake_ssh(&dir, "echo compiling\necho \"ran: $6\"\nexit 3"),
            ..Default::default()
        };
        let ssh = SshExecutor::from_config(&config);
        let cmd = RemoteCommand::new("/srv/a/submissions", "run-autograder").arg("2");
        let result = ssh.run(&cmd).await.unwrap();
        assert_eq!(result.last_line, "ran: cd /srv/a/submissions && ./run-autograder 2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_session_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            ssh_program: fake_ssh(&dir, "exec sleep 5"),
            remote_timeout_secs: 1,
            ..Default::default()
        };
        let ssh = SshExecutor::from_config(&config);
        let cmd = RemoteCommand::new("/srv/a/submissions", "run-autograder").arg("1");

        let started = std::time::Instant::now();
        let result = ssh.run(&cmd).await;
        assert!(
            matches!(result, Err(RemoteError::Timeout(d)) if d == Duration::from_secs(1)),
            "got {result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
