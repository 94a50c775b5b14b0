//! Course sections, their channels, and the identifiers parsed out of
//! slash-command text and channel names.

use crate::config::ServiceConfig;
use crate::error::ValidationError;

/// Channels every section gets before its per-assignment channels.
pub const FIXED_CHANNELS: [&str; 3] = ["announcements", "general", "section"];

/// Marks a per-assignment channel; the assignment number follows it.
pub const ASSIGNMENT_MARKER: &str = "assignment";

/// Largest homework count `/setup` accepts. Keeps batches small and
/// `<prefix>_assignmentN` well inside the platform's 80-char name limit.
pub const MAX_HOMEWORK_COUNT: u32 = 50;

/// A course section and how many homeworks it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassReference {
    /// Always uppercase and present in the configured allow-list.
    pub class_letter: char,
    pub homework_count: u32,
}

impl ClassReference {
    pub fn new(
        class_letter: char,
        homework_count: u32,
        config: &ServiceConfig,
    ) -> Result<Self, ValidationError> {
        if !class_letter.is_ascii_alphabetic() {
            return Err(ValidationError::InvalidClass(class_letter.to_string()));
        }
        if homework_count > MAX_HOMEWORK_COUNT {
            return Err(ValidationError::InvalidHomeworkCount(homework_count.to_string()));
        }
        let class_letter = class_letter.to_ascii_uppercase();
        if !config.is_known_class(class_letter) {
            return Err(ValidationError::UnknownClass {
                course: config.course_code.clone(),
                letter: class_letter,
            });
        }
        Ok(Self {
            class_letter,
            homework_count,
        })
    }

    /// Lowercase channel prefix, e.g. `106a`.
    pub fn prefix(&self, course_code: &str) -> String {
        format!("{course_code}{}", self.class_letter.to_ascii_lowercase())
    }

    /// All channels for this section in creation order: the fixed channels,
    /// then `assignment1..=homework_count`.
    pub fn channel_specs(&self, course_code: &str) -> Vec<ChannelSpec> {
        let prefix = self.prefix(course_code);
        let assignments = (1..=self.homework_count).map(|n| format!("{ASSIGNMENT_MARKER}{n}"));
        FIXED_CHANNELS
            .iter()
            .map(|s| s.to_string())
            .chain(assignments)
            .map(|suffix| ChannelSpec {
                name: format!("{prefix}_{suffix}"),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
}

/// A channel that exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub spec: ChannelSpec,
    /// Opaque id assigned by the platform.
    pub remote_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationTarget {
    pub short_id: String,
    pub email: String,
}

impl InvitationTarget {
    pub fn new(short_id: &str, email_domain: &str) -> Result<Self, ValidationError> {
        let short_id = validate_identifier(short_id)?;
        Ok(Self {
            short_id: short_id.to_string(),
            email: format!("{short_id}@{email_domain}"),
        })
    }
}

/// A parsed `/setup` command: `[letter] [homework count] [id ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    pub class: ClassReference,
    pub invitees: Vec<InvitationTarget>,
}

impl SetupRequest {
    pub const USAGE: &'static str = "usage: /setup [class letter] [# homeworks] [id1 id2 ...]";

    /// Ids may be separated by whitespace or commas.
    pub fn parse(text: &str, config: &ServiceConfig) -> Result<Self, ValidationError> {
        let mut words = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|w| !w.is_empty());

        let class = words.next().ok_or(ValidationError::MissingClass)?;
        let mut chars = class.chars();
        let letter = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(ValidationError::InvalidClass(class.to_string())),
        };

        let count = words.next().ok_or(ValidationError::MissingHomeworkCount)?;
        let homework_count = count
            .parse::<u32>()
            .map_err(|_| ValidationError::InvalidHomeworkCount(count.to_string()))?;

        let class = ClassReference::new(letter, homework_count, config)?;
        let invitees = words
            .map(|id| InvitationTarget::new(id, &config.email_domain))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { class, invitees })
    }
}

/// The section and assignment an assignment channel belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentTarget {
    /// Uppercase; not yet checked against the allow-list.
    pub class_letter: char,
    pub assignment: u32,
}

impl AssignmentTarget {
    /// Parses names like `106b-assignment4` or `cs106a_assignment12`: the
    /// character after the course code is the class letter, the digits after
    /// `assignment` are the assignment number.
    pub fn from_channel_name(name: &str, course_code: &str) -> Result<Self, ValidationError> {
        if !is_assignment_channel(name, course_code) {
            return Err(ValidationError::NotAssignmentChannel);
        }

        let class_start = name.find(course_code).unwrap_or_default() + course_code.len();
        let class_letter = name[class_start..]
            .chars()
            .next()
            .filter(char::is_ascii_alphabetic)
            .ok_or_else(|| ValidationError::MissingClassLetter(name.to_string()))?
            .to_ascii_uppercase();

        let number_start = name.find(ASSIGNMENT_MARKER).unwrap_or_default() + ASSIGNMENT_MARKER.len();
        let digits: String = name[number_start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        let assignment = digits
            .parse::<u32>()
            .map_err(|_| ValidationError::MissingAssignmentNumber(name.to_string()))?;

        Ok(Self {
            class_letter,
            assignment,
        })
    }
}

/// Whether `name` contains both the course code and the assignment marker.
pub fn is_assignment_channel(name: &str, course_code: &str) -> bool {
    name.contains(course_code) && name.contains(ASSIGNMENT_MARKER)
}

/// Account ids end up in emails and remote command lines, so only
/// `[A-Za-z0-9._-]` is accepted and a leading `-` is refused.
pub fn validate_identifier(id: &str) -> Result<&str, ValidationError> {
    let valid = !id.is_empty()
        && !id.starts_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(id)
    } else {
        Err(ValidationError::InvalidIdentifier(id.to_string()))
    }
}
