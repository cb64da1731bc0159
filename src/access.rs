use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    fmt, fs,
    path::Path,
    str::FromStr,
};

use crate::{auth::SessionUser, error::AppError};

/// Role
///
/// Access tier of a portal user. There is no role table: the tier is encoded as a
/// suffix on the username handed out by the identity server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Customer,
    BankCashier,
    DiscoEmployee,
}

impl Role {
    /// Resolves the role from the username suffix (`_u1`, `_u2`, `_u3`).
    pub fn from_username(username: &str) -> Option<Role> {
        if username.ends_with("_u1") {
            Some(Role::Customer)
        } else if username.ends_with("_u2") {
            Some(Role::BankCashier)
        } else if username.ends_with("_u3") {
            Some(Role::DiscoEmployee)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::BankCashier => "bank_cashier",
            Role::DiscoEmployee => "disco_employee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "bank_cashier" => Ok(Role::BankCashier),
            "disco_employee" => Ok(Role::DiscoEmployee),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read access policy {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed access policy: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid access policy: {0}")]
    Invalid(String),
}

/// On-disk layout of the policy file.
#[derive(Deserialize)]
struct PolicyFile {
    roles: HashMap<String, Vec<String>>,
}

/// AccessController
///
/// Static role -> allowed function mapping, loaded once at startup. Functions are the
/// route paths of the gated pages; the form page and its submission share one name.
#[derive(Debug, Clone, Default)]
pub struct AccessController {
    grants: HashMap<Role, HashSet<String>>,
}

impl AccessController {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile = toml::from_str(text)?;

        let mut grants = HashMap::new();
        for (name, functions) in file.roles {
            let role = name.parse::<Role>().map_err(PolicyError::Invalid)?;
            if let Some(bad) = functions.iter().find(|f| !f.starts_with('/')) {
                return Err(PolicyError::Invalid(format!(
                    "function '{}' for role '{}' must be a route path",
                    bad, role
                )));
            }
            grants.insert(role, functions.into_iter().collect());
        }

        Ok(Self { grants })
    }

    /// Grants `function` to `role`. Used when assembling policies in code.
    pub fn allow(mut self, role: Role, function: &str) -> Self {
        self.grants
            .entry(role)
            .or_default()
            .insert(function.to_string());
        self
    }

    /// A user without a recognised role is never allowed.
    pub fn is_allowed(&self, role: Option<Role>, function: &str) -> bool {
        role.and_then(|r| self.grants.get(&r))
            .is_some_and(|functions| functions.contains(function))
    }

    pub fn authorize(&self, user: &SessionUser, function: &str) -> Result<(), AppError> {
        if self.is_allowed(user.role, function) {
            Ok(())
        } else {
            tracing::warn!(
                username = %user.username,
                role = ?user.role,
                function,
                "access denied"
            );
            Err(AppError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"
        [roles]
        customer = ["/bill-retrieval", "/bill-payment"]
        bank_cashier = ["/bill-payment"]
        disco_employee = ["/bill-retrieval", "/bill-adjustments"]
    "#;

    #[test]
    fn role_is_derived_from_username_suffix() {
        assert_eq!(Role::from_username("ali_u1"), Some(Role::Customer));
        assert_eq!(Role::from_username("hbl_teller_u2"), Some(Role::BankCashier));
        assert_eq!(Role::from_username("officer_u3"), Some(Role::DiscoEmployee));
        assert_eq!(Role::from_username("u1_admin"), None);
        assert_eq!(Role::from_username(""), None);
    }

    #[test]
    fn policy_grants_only_listed_functions() {
        let ctrl = AccessController::from_toml_str(POLICY).unwrap();

        assert!(ctrl.is_allowed(Some(Role::Customer), "/bill-payment"));
        assert!(!ctrl.is_allowed(Some(Role::Customer), "/bill-adjustments"));
        assert!(ctrl.is_allowed(Some(Role::DiscoEmployee), "/bill-adjustments"));
        assert!(!ctrl.is_allowed(Some(Role::BankCashier), "/bill-retrieval"));
    }

    #[test]
    fn missing_role_is_denied() {
        let ctrl = AccessController::from_toml_str(POLICY).unwrap();
        assert!(!ctrl.is_allowed(None, "/bill-payment"));
    }

    #[test]
    fn unknown_role_name_is_rejected() {
        let err = AccessController::from_toml_str("[roles]\nauditor = [\"/bill-payment\"]")
            .unwrap_err();
        assert!(matches!(err, PolicyError::Invalid(_)));
    }

    #[test]
    fn function_must_be_a_path() {
        let err = AccessController::from_toml_str("[roles]\ncustomer = [\"bill-payment\"]")
            .unwrap_err();
        assert!(matches!(err, PolicyError::Invalid(_)));
    }

    #[test]
    fn authorize_returns_forbidden() {
        let ctrl = AccessController::default().allow(Role::BankCashier, "/bill-payment");
        let user = SessionUser::new("teller_u2");

        assert!(ctrl.authorize(&user, "/bill-payment").is_ok());
        assert!(matches!(
            ctrl.authorize(&user, "/bill-adjustments"),
            Err(AppError::Forbidden)
        ));
    }
}
