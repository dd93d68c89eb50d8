//! Gateway environment (sandbox or live).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Which side of the provider an order was processed against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEnvironment {
    #[default]
    Sandbox,
    Live,
}

impl GatewayEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => "sandbox",
            GatewayEnvironment::Live => "live",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, GatewayEnvironment::Live)
    }
}

impl fmt::Display for GatewayEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayEnvironment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" => Ok(GatewayEnvironment::Sandbox),
            "live" | "production" => Ok(GatewayEnvironment::Live),
            other => Err(ValidationError::invalid_format(
                "gateway_environment",
                format!("unknown environment '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("test".parse::<GatewayEnvironment>().unwrap(), GatewayEnvironment::Sandbox);
        assert_eq!("LIVE".parse::<GatewayEnvironment>().unwrap(), GatewayEnvironment::Live);
        assert!("staging".parse::<GatewayEnvironment>().is_err());
    }
}
