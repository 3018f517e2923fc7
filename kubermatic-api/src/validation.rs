//! Input validation for request bodies and path parameters

use kubermatic_common::Error;
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_EMAIL_LENGTH: usize = 320;
/// DNS-1123 label limit, node and node deployment names become object names
pub const MAX_RESOURCE_ID_LENGTH: usize = 63;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

static RESOURCE_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap()
});

pub type ValidationResult<T> = Result<T, Error>;

pub fn validate_email(email: &str) -> ValidationResult<()> {
    if email.is_empty() {
        return Err(Error::InvalidInput("Email cannot be empty".to_string()));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Email too long (maximum {} characters)",
            MAX_EMAIL_LENGTH
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(Error::InvalidInput(format!("Invalid email format: {}", email)));
    }

    Ok(())
}

/// Human readable project name
pub fn validate_project_name(name: &str) -> ValidationResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Project name cannot be empty".to_string()));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Project name too long (max {} characters)",
            MAX_NAME_LENGTH
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(Error::InvalidInput(
            "Project name cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Names of nodes and node deployments
pub fn validate_resource_id(id: &str) -> ValidationResult<()> {
    if id.is_empty() {
        return Err(Error::InvalidInput("Name cannot be empty".to_string()));
    }

    if id.len() > MAX_RESOURCE_ID_LENGTH || !RESOURCE_ID_REGEX.is_match(id) {
        return Err(Error::InvalidInput(format!(
            "Invalid name {}: must consist of lower case alphanumeric characters or '-', and be at most {} characters",
            id, MAX_RESOURCE_ID_LENGTH
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("bob@acme.com").is_ok());
        assert!(validate_email("Bob@ACME.com").is_ok());
        assert!(validate_email("john.doe@company.co.uk").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("@acme.com").is_err());
        assert!(validate_email("bob@").is_err());
    }

    #[test]
    fn test_validate_project_name() {
        assert!(validate_project_name("plan9").is_ok());
        assert!(validate_project_name("my first project").is_ok());
        assert!(validate_project_name("   ").is_err());
        assert!(validate_project_name("bad\nname").is_err());
        assert!(validate_project_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_validate_resource_id() {
        assert!(validate_resource_id("venus").is_ok());
        assert!(validate_resource_id("node-deployment-1").is_ok());
        assert!(validate_resource_id("Venus").is_err());
        assert!(validate_resource_id("-venus").is_err());
        assert!(validate_resource_id(&"a".repeat(64)).is_err());
    }
}
