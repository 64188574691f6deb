use serde::{Deserialize, Deserializer, Serialize};

/// The signed-in account as the backend reports it.
///
/// Role information arrives in several shapes depending on the endpoint and
/// backend version; all of them are kept and interpreted by
/// [`crate::auth::Role::from_user`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, alias = "full_name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, alias = "avatar", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,

    #[serde(default, alias = "verified", alias = "is_email_verified")]
    pub is_verified: bool,
}

impl User {
    /// Display name, falling back to the username and then the email.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(self.username.as_str()).filter(|s| !s.is_empty()))
            .unwrap_or(&self.email)
    }
}

/// A role given either as a bare name or as an object carrying one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleField {
    Name(String),
    Named { name: String },
}

impl RoleField {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Named { name } => name,
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        S(String),
        N(i64),
    }
    Ok(match Id::deserialize(d)? {
        Id::S(s) => s,
        Id::N(n) => n.to_string(),
    })
}

/// `/auth/me` answers either with the user or with `{"user": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MeResponse {
    Wrapped { user: User },
    Bare(User),
}

impl MeResponse {
    pub(crate) fn into_user(self) -> User {
        match self {
            Self::Wrapped { user } | Self::Bare(user) => user,
        }
    }
}

/// Sign-in/sign-up responses. Cookie-session backends send only the user;
/// token backends add `access_token`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default, alias = "token")]
    pub access_token: Option<String>,
}

/// Fields the account page can change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}
