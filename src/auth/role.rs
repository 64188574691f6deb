//! One place that decides what a user payload is allowed to do.

use super::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Guest,
    User,
    Admin,
}

const ADMIN_NAMES: &[&str] = &["admin", "administrator", "superuser", "superadmin", "owner"];
const ADMIN_PERMISSIONS: &[&str] = &["admin", "admin:*", "*"];

impl Role {
    /// Normalizes a payload. Shapes are checked in this order:
    ///
    /// 1. boolean flags `is_admin`, `is_superuser`, `admin`
    /// 2. `role` as a string or as `{ "name": ... }`
    /// 3. `roles` array of names or objects
    /// 4. `permissions` array (`admin`, `admin:*`, `*`)
    ///
    /// A user matching none of them is a plain `User`.
    pub fn from_user(user: Option<&User>) -> Self {
        let Some(user) = user else {
            return Self::Guest;
        };

        let flagged = [user.is_admin, user.is_superuser, user.admin]
            .into_iter()
            .any(|flag| flag == Some(true));
        if flagged {
            return Self::Admin;
        }

        if role_names(user).any(is_admin_name) {
            return Self::Admin;
        }

        if user
            .permissions
            .iter()
            .any(|p| ADMIN_PERMISSIONS.iter().any(|a| p.eq_ignore_ascii_case(a)))
        {
            return Self::Admin;
        }

        Self::User
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

fn role_names(user: &User) -> impl Iterator<Item = &str> {
    user.role
        .iter()
        .chain(user.roles.iter())
        .map(super::user::RoleField::name)
}

fn is_admin_name(name: &str) -> bool {
    ADMIN_NAMES.iter().any(|a| name.eq_ignore_ascii_case(a))
}

/// `true` when the user holds `role`.
///
/// The normalized levels (`guest`, `user`, `admin`) compare by rank, so an
/// admin also "has" `user`. Other names match the payload's role names and
/// permissions literally, ignoring case.
pub fn has_role(user: Option<&User>, role: &str) -> bool {
    let normalized = Role::from_user(user);
    let wanted = role.trim();

    for level in [Role::Guest, Role::User, Role::Admin] {
        if wanted.eq_ignore_ascii_case(level.as_str()) {
            return normalized >= level;
        }
    }

    let Some(user) = user else {
        return false;
    };
    role_names(user).any(|n| n.eq_ignore_ascii_case(wanted))
        || user.permissions.iter().any(|p| p.eq_ignore_ascii_case(wanted))
}
