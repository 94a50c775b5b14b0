//! Service configuration.
//!
//! Parsed once at startup from flags and environment variables, then shared
//! read-only with every handler through `Arc<ServiceConfig>`. Nothing else in
//! the crate reads the process environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "classbot-server",
    about = "Slack webhooks for course channel setup and autograder injection"
)]
pub struct ServiceConfig {
    /// Address to listen on (host:port). Falls back to 0.0.0.0:$PORT, then 0.0.0.0:5000.
    #[arg(long, env = "CLASSBOT_ADDR")]
    pub listen_addr: Option<String>,

    /// Port used when no explicit listen address is given.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Slack verification token expected on every inbound request.
    #[arg(long, env = "VER_TOKEN", default_value = "", hide_env_values = true)]
    pub verification_token: String,

    /// Slack team ids allowed to call this service.
    #[arg(long, env = "TEAM_IDS", value_delimiter = ',')]
    pub team_ids: Vec<String>,

    /// Slack API token used for channel creation and invitations.
    #[arg(long, env = "TOKEN", default_value = "", hide_env_values = true)]
    pub api_token: String,

    /// Base URL of the Slack Web API.
    #[arg(long, env = "SLACK_API_URL", default_value = "https://slack.com/api")]
    pub api_base_url: String,

    /// Channel ids every invitee joins in addition to the created ones.
    #[arg(long, env = "CHANNELS", value_delimiter = ',')]
    pub default_channels: Vec<String>,

    /// Domain appended to account ids to form invitation emails.
    #[arg(long, env = "EMAIL_DOMAIN", default_value = "stanford.edu")]
    pub email_domain: String,

    /// Numeric course code shared by all sections (e.g. "106").
    #[arg(long, env = "COURSE_CODE", default_value = "106")]
    pub course_code: String,

    /// Class letters known to the grading host.
    #[arg(long, env = "GRADER_CLASSES", value_delimiter = ',', default_value = "A,B,X,J")]
    pub grader_classes: Vec<String>,

    /// Grading host reached over ssh.
    #[arg(long, env = "HOST", default_value = "localhost")]
    pub ssh_host: String,

    /// Login name on the grading host.
    #[arg(long, env = "SSH_USER", default_value = "")]
    pub ssh_user: String,

    #[arg(long, env = "SSH_PORT", default_value_t = 22)]
    pub ssh_port: u16,

    /// Private key used for the ssh session (agent or ssh config otherwise).
    #[arg(long, env = "SSH_IDENTITY")]
    pub ssh_identity: Option<PathBuf>,

    /// ssh client binary.
    #[arg(long, env = "SSH_PROGRAM", default_value = "ssh")]
    pub ssh_program: String,

    /// Prefix of the per-class directory on the grading host; the class
    /// letter and `/submissions` are appended.
    #[arg(long, env = "DIR_PATH", default_value = "")]
    pub submissions_dir: String,

    /// Upper bound on one remote autograder run.
    #[arg(long, env = "REMOTE_TIMEOUT_SECS", default_value_t = 300)]
    pub remote_timeout_secs: u64,

    /// Upper bound on one outbound Slack API call.
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 30)]
    pub api_timeout_secs: u64,

    /// Emit JSON logs.
    #[arg(long, env = "CLASSBOT_LOG_JSON")]
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            port: None,
            verification_token: String::new(),
            team_ids: Vec::new(),
            api_token: String::new(),
            api_base_url: "https://slack.com/api".to_string(),
            default_channels: Vec::new(),
            email_domain: "stanford.edu".to_string(),
            course_code: "106".to_string(),
            grader_classes: ["A", "B", "X", "J"].iter().map(|s| s.to_string()).collect(),
            ssh_host: "localhost".to_string(),
            ssh_user: String::new(),
            ssh_port: 22,
            ssh_identity: None,
            ssh_program: "ssh".to_string(),
            submissions_dir: String::new(),
            remote_timeout_secs: 300,
            api_timeout_secs: 30,
            log_json: false,
        }
    }
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> String {
        match (&self.listen_addr, self.port) {
            (Some(addr), _) => addr.clone(),
            (None, Some(port)) => format!("0.0.0.0:{port}"),
            (None, None) => "0.0.0.0:5000".to_string(),
        }
    }

    /// Whether a request carrying `token` from `team_id` may act on this service.
    ///
    /// An unset verification token rejects everything.
    pub fn authorizes(&self, token: &str, team_id: &str) -> bool {
        !self.verification_token.is_empty()
            && token == self.verification_token
            && self.team_ids.iter().any(|t| t == team_id)
    }

    pub fn is_known_class(&self, letter: char) -> bool {
        let letter = letter.to_string();
        self.grader_classes
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(&letter))
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}
