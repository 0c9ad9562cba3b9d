use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Patient,
    Doctor,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Patient => write!(f, "patient"),
            UserRole::Doctor => write!(f, "doctor"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

/// The authenticated user on whose behalf a mutation is performed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn patient(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Patient)
    }

    pub fn doctor(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Doctor)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
