//! Site user as seen by the billing core.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::UserId;

/// Fields needed to create a gateway customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingUser {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub login: String,
}

impl BillingUser {
    /// Display name, falling back to the login.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_falls_back_to_login() {
        let mut user = BillingUser {
            id: UserId::new(1),
            email: "a@example.com".to_string(),
            display_name: Some("  ".to_string()),
            login: "alice".to_string(),
        };
        assert_eq!(user.name(), "alice");
        user.display_name = Some("Alice A.".to_string());
        assert_eq!(user.name(), "Alice A.");
    }
}
