use serde::{Deserialize, Serialize};

// --- User Role Definition ---

/// UserRole enum for authorization in the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Student,
    Company,
}

// --- Permission Enum Definition ---

/// Coarse permissions checked before any conversation-level rule runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ViewConversations,
    SendMessages,
    CreateBroadcasts,
    ManageConversations,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Student => "student",
            UserRole::Company => "company",
        }
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        match self {
            UserRole::Admin => true, // Admin has all permissions
            UserRole::Student | UserRole::Company => match permission {
                Permission::ViewConversations | Permission::SendMessages => true,
                // Broadcasting and moderation stay with administrators
                Permission::CreateBroadcasts | Permission::ManageConversations => false,
            },
        }
    }
}
