//! Device Capability Checks
//!
//! Feature call sites ask an [`AccessControl`] implementation whether a widget
//! may call a device function. The decision comes back as an
//! [`AccessStatus`]; [`check_access`] turns anything other than a grant into
//! a typed [`AccessError`] that the call site maps to a script-level failure.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use widget_plugin_api::WidgetId;

/// Decision of the access control engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Granted,
    PrivilegeDenied,
    PrivacyDenied,
    InternalError,
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessStatus::Granted => write!(f, "granted"),
            AccessStatus::PrivilegeDenied => write!(f, "privilege denied"),
            AccessStatus::PrivacyDenied => write!(f, "privacy denied"),
            AccessStatus::InternalError => write!(f, "internal error"),
        }
    }
}

/// A device function call being authorized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRequest {
    pub function_name: String,
    pub feature: String,
    #[serde(default)]
    pub device_capabilities: Vec<String>,
}

impl FunctionRequest {
    pub fn new(function_name: impl Into<String>, feature: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            feature: feature.into(),
            device_capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.device_capabilities.push(capability.into());
        self
    }
}

/// Errors surfaced to feature call sites
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Access to '{function}' denied: missing privilege")]
    PrivilegeDenied { function: String },

    #[error("Access to '{function}' denied by privacy settings")]
    PrivacyDenied { function: String },

    #[error("Access check for '{function}' failed")]
    Internal { function: String },

    #[error("Feature '{feature}' is not available")]
    Unavailable { feature: String },
}

/// Binary decision function of the access control engine
pub trait AccessControl: Send + Sync {
    fn check(&self, widget: WidgetId, request: &FunctionRequest) -> AccessStatus;
}

/// Run an access check and convert a refusal into an error.
pub fn check_access(
    control: &dyn AccessControl,
    widget: WidgetId,
    request: &FunctionRequest,
) -> Result<(), AccessError> {
    let status = control.check(widget, request);
    let function = request.function_name.clone();

    match status {
        AccessStatus::Granted => Ok(()),
        AccessStatus::PrivilegeDenied => Err(AccessError::PrivilegeDenied { function }),
        AccessStatus::PrivacyDenied => Err(AccessError::PrivacyDenied { function }),
        AccessStatus::InternalError => {
            tracing::warn!(widget, function = %request.function_name, feature = %request.feature, "Access check failed");
            Err(AccessError::Internal { function })
        }
    }
}

/// Fixed grant/deny lists.
///
/// Device capabilities with an explicit status win over features. Features
/// not listed get the default decision.
#[derive(Debug, Clone)]
pub struct StaticAccessPolicy {
    default: AccessStatus,
    granted_features: HashSet<String>,
    denied_features: HashSet<String>,
    capabilities: HashMap<String, AccessStatus>,
}

impl StaticAccessPolicy {
    /// Grant everything not explicitly denied
    pub fn allow_all() -> Self {
        Self::with_default(AccessStatus::Granted)
    }

    /// Deny everything not explicitly granted
    pub fn deny_all() -> Self {
        Self::with_default(AccessStatus::PrivilegeDenied)
    }

    fn with_default(default: AccessStatus) -> Self {
        Self {
            default,
            granted_features: HashSet::new(),
            denied_features: HashSet::new(),
            capabilities: HashMap::new(),
        }
    }

    pub fn grant_feature(mut self, feature: impl Into<String>) -> Self {
        let feature = feature.into();
        self.denied_features.remove(&feature);
        self.granted_features.insert(feature);
        self
    }

    pub fn deny_feature(mut self, feature: impl Into<String>) -> Self {
        let feature = feature.into();
        self.granted_features.remove(&feature);
        self.denied_features.insert(feature);
        self
    }

    pub fn capability(mut self, capability: impl Into<String>, status: AccessStatus) -> Self {
        self.capabilities.insert(capability.into(), status);
        self
    }
}

impl Default for StaticAccessPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl AccessControl for StaticAccessPolicy {
    fn check(&self, _widget: WidgetId, request: &FunctionRequest) -> AccessStatus {
        let refused = request
            .device_capabilities
            .iter()
            .filter_map(|cap| self.capabilities.get(cap))
            .find(|status| **status != AccessStatus::Granted);
        if let Some(status) = refused {
            return *status;
        }

        if self.denied_features.contains(&request.feature) {
            AccessStatus::PrivilegeDenied
        } else if self.granted_features.contains(&request.feature) {
            AccessStatus::Granted
        } else {
            self.default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ: &str = "http://tizen.org/privilege/filesystem.read";
    const WRITE: &str = "http://tizen.org/privilege/filesystem.write";

    #[test]
    fn test_allow_all_grants_unlisted_features() {
        let policy = StaticAccessPolicy::allow_all();
        let request = FunctionRequest::new("resolve", READ);
        assert_eq!(policy.check(1, &request), AccessStatus::Granted);
        assert!(check_access(&policy, 1, &request).is_ok());
    }

    #[test]
    fn test_deny_all_with_grant_list() {
        let policy = StaticAccessPolicy::deny_all().grant_feature(READ);

        assert!(check_access(&policy, 1, &FunctionRequest::new("resolve", READ)).is_ok());
        assert_eq!(
            check_access(&policy, 1, &FunctionRequest::new("write", WRITE)),
            Err(AccessError::PrivilegeDenied {
                function: "write".to_string()
            })
        );
    }

    #[test]
    fn test_capability_status_overrides_feature_grant() {
        let policy = StaticAccessPolicy::allow_all()
            .grant_feature(READ)
            .capability("externalStorage", AccessStatus::PrivacyDenied)
            .capability("internalStorage", AccessStatus::Granted);

        let internal = FunctionRequest::new("resolve", READ).with_capability("internalStorage");
        assert_eq!(policy.check(2, &internal), AccessStatus::Granted);

        let external = FunctionRequest::new("resolve", READ).with_capability("externalStorage");
        assert_eq!(
            check_access(&policy, 2, &external),
            Err(AccessError::PrivacyDenied {
                function: "resolve".to_string()
            })
        );
    }

    #[test]
    fn test_internal_error_is_surfaced() {
        let policy = StaticAccessPolicy::allow_all().capability("broken", AccessStatus::InternalError);
        let request = FunctionRequest::new("open", READ).with_capability("broken");
        let err = check_access(&policy, 3, &request).unwrap_err();
        assert_eq!(err.to_string(), "Access check for 'open' failed");
    }

    #[test]
    fn test_request_deserializes_without_capabilities() {
        let request: FunctionRequest =
            serde_json::from_str(r#"{"function_name": "resolve", "feature": "filesystem"}"#).unwrap();
        assert!(request.device_capabilities.is_empty());
    }
}
