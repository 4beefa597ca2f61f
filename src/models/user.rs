use serde::{Deserialize, Serialize};

use super::null_as_default;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub push_token: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub language: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: bool,
}

impl UserProfile {
    pub fn has_endpoint(&self) -> bool {
        !self.push_token.trim().is_empty()
    }
}

/// Result of a successful directory lookup.
///
/// A profile without a push token is a valid answer, not an error: there is
/// simply nowhere to deliver, and retrying will not create a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryLookup {
    Deliverable(UserProfile),
    NoDeliverableEndpoint,
}

impl From<UserProfile> for DirectoryLookup {
    fn from(profile: UserProfile) -> Self {
        if profile.has_endpoint() {
            DirectoryLookup::Deliverable(profile)
        } else {
            DirectoryLookup::NoDeliverableEndpoint
        }
    }
}
