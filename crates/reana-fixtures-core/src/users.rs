//! Sample users.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The predefined users the database fixtures create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleUser {
    /// Administrator, also the default user.
    User0,
    /// First regular user.
    User1,
    /// Second regular user.
    User2,
}

impl SampleUser {
    /// Fixed user ID.
    pub fn id(&self) -> Uuid {
        match self {
            Self::User0 => Uuid::nil(),
            Self::User1 => Uuid::from_u128(0x1111_1111_1111_1111_1111_1111_1111_1111),
            Self::User2 => Uuid::from_u128(0x2222_2222_2222_2222_2222_2222_2222_2222),
        }
    }

    /// Fixture name of this user.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User0 => "user0",
            Self::User1 => "user1",
            Self::User2 => "user2",
        }
    }

    /// The full record stored for this user.
    pub fn record(&self) -> UserRecord {
        let name = self.as_str();
        UserRecord {
            id: self.id(),
            email: format!("{}@reana.io", name),
            access_token: Some(format!("{}token", name)),
        }
    }
}

/// A user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub access_token: Option<String>,
}

/// The default user is `user0`.
pub fn default_user() -> UserRecord {
    SampleUser::User0.record()
}

/// A user that only exists in memory, with a random ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoDbUser {
    pub id: Uuid,
}

/// Create a user that is never written to the database.
pub fn no_db_user() -> NoDbUser {
    NoDbUser { id: Uuid::new_v4() }
}
