//! Autograder injection for one student or a whole assignment.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::course::{AssignmentTarget, validate_identifier};
use crate::error::ValidationError;
use crate::remote::{RemoteCommand, RemoteExecutor};

/// Script in each class's submission directory.
pub const AUTOGRADER_SCRIPT: &str = "run-autograder";

pub struct GradingController {
    config: Arc<ServiceConfig>,
    executor: Arc<dyn RemoteExecutor>,
}

impl GradingController {
    pub fn new(config: Arc<ServiceConfig>, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { config, executor }
    }

    /// `cd <dir><letter>/submissions && ./run-autograder <n> [<student>]`
    pub fn build_command(&self, target: &AssignmentTarget, student: Option<&str>) -> RemoteCommand {
        let workdir = format!(
            "{}{}/submissions",
            self.config.submissions_dir,
            target.class_letter.to_ascii_lowercase()
        );
        let cmd = RemoteCommand::new(workdir, AUTOGRADER_SCRIPT).arg(target.assignment.to_string());
        match student {
            Some(student) => cmd.arg(student),
            None => cmd,
        }
    }

    /// Resolve the assignment from `channel_name` and run the autograder for
    /// `student`, or for every student when `None`. Always returns the text to
    /// show the user: the script's last output line on success, an
    /// `Error: ...` line otherwise.
    pub async fn inject(&self, channel_name: &str, student: Option<&str>) -> String {
        tracing::info!(channel = %channel_name, student = student.unwrap_or("<all>"), "Injecting autograder");

        let command = match self.resolve(channel_name, student) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(channel = %channel_name, "Rejected injection: {e}");
                return format!("Error: {e}");
            }
        };

        match self.executor.run(&command).await {
            Ok(result) => {
                tracing::info!(channel = %channel_name, result = %result.last_line, "Ran autograder");
                result.last_line
            }
            Err(e) => {
                tracing::error!(channel = %channel_name, host = self.executor.host(), "Autograder run failed: {e}");
                format!("Error: could not reach {}: {e}", self.executor.host())
            }
        }
    }

    fn resolve(&self, channel_name: &str, student: Option<&str>) -> Result<RemoteCommand, ValidationError> {
        let target = AssignmentTarget::from_channel_name(channel_name, &self.config.course_code)?;
        if !self.config.is_known_class(target.class_letter) {
            return Err(ValidationError::UnknownClass {
                course: self.config.course_code.clone(),
                letter: target.class_letter,
            });
        }
        let student = student.map(validate_identifier).transpose()?;
        Ok(self.build_command(&target, student))
    }
}
