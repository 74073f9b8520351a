use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::item::{Item, ParseEnumError, Status};

/// Role under which an action is performed. Recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Moderator,
    /// Background jobs.
    Task,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Moderator => "MODERATOR",
            Self::Task => "TASK",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "MODERATOR" | "MOD" => Ok(Self::Moderator),
            "TASK" => Ok(Self::Task),
            _ => Err(ParseEnumError {
                expected: "role",
                got: s.to_string(),
            }),
        }
    }
}

/// Permission flags attached to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Permissions {
    pub close_own: bool,
    pub close_any: bool,
    pub edit_own: bool,
    pub edit_any: bool,
    pub delete: bool,
    pub delete_hard: bool,
    pub see_deleted: bool,
    pub see_hellbanned: bool,
    pub move_items: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            close_own: true,
            close_any: false,
            edit_own: true,
            edit_any: false,
            delete: false,
            delete_hard: false,
            see_deleted: false,
            see_hellbanned: false,
            move_items: false,
        }
    }
}

impl Permissions {
    /// Every flag set.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            close_own: true,
            close_any: true,
            edit_own: true,
            edit_any: true,
            delete: true,
            delete_hard: true,
            see_deleted: true,
            see_hellbanned: true,
            move_items: true,
        }
    }
}

/// Who is performing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user: String,
    pub role: Role,
    pub ip: Option<String>,
    /// The actor's own content is shadow-banned.
    pub hellbanned: bool,
    pub permissions: Permissions,
}

impl Actor {
    #[must_use]
    pub fn new(user: impl Into<String>, role: Role, permissions: Permissions) -> Self {
        Self {
            user: user.into(),
            role,
            ip: None,
            hellbanned: false,
            permissions,
        }
    }

    /// Actor used by background jobs.
    #[must_use]
    pub fn system() -> Self {
        Self::new("system", Role::Task, Permissions::all())
    }

    #[must_use]
    pub fn owns(&self, item: &Item) -> bool {
        self.user == item.user
    }

    #[must_use]
    pub fn can_close(&self, item: &Item) -> bool {
        self.permissions.close_any || (self.permissions.close_own && self.owns(item))
    }

    #[must_use]
    pub fn can_edit(&self, item: &Item) -> bool {
        self.permissions.edit_any || (self.permissions.edit_own && self.owns(item))
    }

    /// Soft and hard deletion are gated separately.
    #[must_use]
    pub const fn can_delete(&self, hard: bool) -> bool {
        if hard {
            self.permissions.delete_hard
        } else {
            self.permissions.delete
        }
    }

    /// Visibility check applied by `show`, listings and search.
    #[must_use]
    pub fn can_see(&self, item: &Item) -> bool {
        let hb_visible = self.owns(item) || self.permissions.see_hellbanned;
        match item.st {
            Status::DeletedHard => self.permissions.delete_hard,
            Status::Deleted => {
                self.permissions.see_deleted
                    && (hb_visible || item.prev_st.is_none_or(|p| p.st != Status::Hb))
            }
            Status::Hb => hb_visible,
            Status::Open | Status::Closed => true,
        }
    }

    /// Status as this viewer should see it.
    #[must_use]
    pub fn visible_status(&self, item: &Item) -> Status {
        if item.st == Status::Hb && (self.owns(item) || self.permissions.see_hellbanned) {
            item.effective_status()
        } else {
            item.st
        }
    }
}
