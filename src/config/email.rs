//! Email configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Sender identity for member notifications
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// From email address
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// From name
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    /// Get formatted "From" header value
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_address)
    }

    /// Validate email configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.from_address.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(ValidationError::InvalidFromEmail),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

fn default_from_address() -> String {
    "billing@khm.example".to_string()
}

fn default_from_name() -> String {
    "KHM Billing".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_config_defaults() {
        let config = EmailConfig::default();
        assert_eq!(config.from_address, "billing@khm.example");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_header() {
        let config = EmailConfig {
            from_address: "support@example.com".to_string(),
            from_name: "Support Team".to_string(),
        };
        assert_eq!(config.from_header(), "Support Team <support@example.com>");
    }

    #[test]
    fn test_validation_invalid_from_address() {
        for address in ["invalid-email", "@example.com", "user@localhost"] {
            let config = EmailConfig {
                from_address: address.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{} should be rejected", address);
        }
    }
}
