use std::sync::LazyLock;

use regex::Regex;
use url::Url;

pub const NAME_MIN_LENGTH: usize = 2;
pub const NAME_MAX_LENGTH: usize = 100;
pub const TAG_MIN_LENGTH: usize = 2;
pub const TAG_MAX_LENGTH: usize = 100;

/// Names the portal routes claim for itself.
const RESERVED_NAMES: &[&str] = &["new", "edit", "search"];

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9_\-]*$").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w \-.]*$").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Field-level validation for package and showcase input. Each check returns
/// the message to attach to the offending field.
pub struct InputValidator;

impl InputValidator {
    /// URL-safe package names: 2–100 lowercase ascii letters, digits, `-` or `_`.
    pub fn validate_name(name: &str) -> Result<(), String> {
        if RESERVED_NAMES.contains(&name) {
            return Err("That name cannot be used".into());
        }
        if name.chars().count() < NAME_MIN_LENGTH {
            return Err(format!("Must be at least {NAME_MIN_LENGTH} characters long"));
        }
        if name.chars().count() > NAME_MAX_LENGTH {
            return Err(format!(
                "Name must be a maximum of {NAME_MAX_LENGTH} characters long"
            ));
        }
        if !NAME_RE.is_match(name) {
            return Err(
                "Must be purely lowercase alphanumeric (ascii) characters and these symbols: -_"
                    .into(),
            );
        }
        Ok(())
    }

    /// Absolute http(s) URLs with a host.
    pub fn validate_url(value: &str) -> Result<(), String> {
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
            _ => Err("Please provide a valid URL".into()),
        }
    }

    pub fn validate_tag(tag: &str) -> Result<(), String> {
        let len = tag.chars().count();
        if len < TAG_MIN_LENGTH {
            return Err(format!(
                "Tag \"{tag}\" length is less than minimum {TAG_MIN_LENGTH}"
            ));
        }
        if len > TAG_MAX_LENGTH {
            return Err(format!(
                "Tag \"{tag}\" length is more than maximum {TAG_MAX_LENGTH}"
            ));
        }
        if !TAG_RE.is_match(tag) {
            return Err(format!(
                "Tag \"{tag}\" must be alphanumeric characters or symbols: -_."
            ));
        }
        Ok(())
    }

    /// Split a comma separated tag string, dropping blanks.
    pub fn parse_tag_string(input: &str) -> Vec<String> {
        input
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn validate_email(value: &str) -> Result<(), String> {
        if EMAIL_RE.is_match(value) {
            Ok(())
        } else {
            Err(format!("Email {value} is not a valid format"))
        }
    }

    /// Strip control characters from free text, keeping newlines and tabs.
    pub fn sanitize(input: &str) -> String {
        input
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }
}
