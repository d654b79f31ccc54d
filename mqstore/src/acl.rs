//! Topic access decisions
//!
//! One rule gates bus publish, bus subscribe and the HTTP data API: the topic must be
//! well formed, its tenant id must name exactly one tenant, and the user must appear
//! exactly once in that tenant's allowed users.

use crate::error::{AuthError, DenyReason};
use crate::registry::{Registry, Snapshot};
use crate::topic::TopicPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(DenyReason),
}

impl Access {
    #[inline]
    pub fn is_allow(&self) -> bool {
        matches!(self, Access::Allow)
    }

    #[inline]
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Access::Allow => None,
            Access::Deny(r) => Some(*r),
        }
    }

    /// `Err(AuthError::NotAuthorized)` carrying the deny reason
    #[inline]
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny(r) => Err(AuthError::NotAuthorized(r)),
        }
    }
}

impl Snapshot {
    pub fn check(&self, username: &str, topic: &str) -> Access {
        let tenant_id = match TopicPath::tenant_of(topic) {
            Some(id) => id,
            None => return Access::Deny(DenyReason::InvalidTopic),
        };

        let mut tenants = self.tenants().iter().filter(|t| t.id == tenant_id);
        let tenant = match (tenants.next(), tenants.next()) {
            (Some(t), None) => t,
            _ => return Access::Deny(DenyReason::UnknownTenant),
        };

        if tenant.allowed_users.iter().filter(|u| *u == username).take(2).count() != 1 {
            return Access::Deny(DenyReason::UserNotAllowed);
        }
        Access::Allow
    }

    #[inline]
    pub fn user_topic_permission(&self, username: &str, topic: &str) -> bool {
        self.check(username, topic).is_allow()
    }
}

impl Registry {
    #[inline]
    pub fn check(&self, username: &str, topic: &str) -> Access {
        self.load().check(username, topic)
    }

    #[inline]
    pub fn user_topic_permission(&self, username: &str, topic: &str) -> bool {
        self.check(username, topic).is_allow()
    }
}
