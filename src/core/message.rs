use serde::{Deserialize, Serialize};

/// Role of a transcript entry.
///
/// Only `User` and `Assistant` are ever transmitted to a backend; the
/// app-authored roles render in the transcript but are filtered out of any
/// backend-bound view via [`Role::to_api_role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    AppInfo,
    AppWarning,
    AppError,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::AppInfo => "app/info",
            Role::AppWarning => "app/warning",
            Role::AppError => "app/error",
        }
    }

    /// Wire-level role name, or `None` for roles that never leave the app.
    pub fn to_api_role(self) -> Option<&'static str> {
        match self {
            Role::User => Some("user"),
            Role::Assistant => Some("assistant"),
            _ => None,
        }
    }

    pub fn from_api_role(role: &str) -> Result<Self, String> {
        Self::try_from(role)
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }

    pub fn is_app(self) -> bool {
        matches!(self, Role::AppInfo | Role::AppWarning | Role::AppError)
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "app/info" => Ok(Role::AppInfo),
            "app/warning" => Ok(Role::AppWarning),
            "app/error" => Ok(Role::AppError),
            _ => Err(format!("invalid transcript role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn app_info(content: impl Into<String>) -> Self {
        Self::new(Role::AppInfo, content)
    }

    pub fn app_warning(content: impl Into<String>) -> Self {
        Self::new(Role::AppWarning, content)
    }

    pub fn app_error(content: impl Into<String>) -> Self {
        Self::new(Role::AppError, content)
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn is_app(&self) -> bool {
        self.role.is_app()
    }
}
