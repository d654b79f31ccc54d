use std::fmt;

use serde::Serialize;

/// Why a topic-scoped action was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Topic does not match the segment grammar
    InvalidTopic,
    /// Tenant id in the topic matches zero or more than one tenant
    UnknownTenant,
    /// User is absent from the tenant's allowed users, or listed more than once
    UserNotAllowed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenyReason::InvalidTopic => "invalid topic",
            DenyReason::UnknownTenant => "unknown tenant",
            DenyReason::UserNotAllowed => "user not allowed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("invalid topic `{0}`")]
    Topic(String),
    #[error("count `{0}` is not a positive integer")]
    Count(String),
    #[error("unknown direction `{0}`")]
    Direction(String),
    #[error("unknown unit `{0}`")]
    Unit(String),
    #[error("invalid date `{0}`")]
    Date(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("bad username or password")]
    BadCredentials,
    #[error("no token provided")]
    MissingToken,
    #[error("invalid token, {0}")]
    InvalidToken(String),
    #[error("token expired")]
    TokenExpired,
    #[error("not authorized, {0}")]
    NotAuthorized(DenyReason),
}

#[derive(Debug, thiserror::Error)]
pub enum MqstoreError {
    #[error("format error, {0}")]
    Format(#[from] FormatError),
    #[error("auth error, {0}")]
    Auth(#[from] AuthError),
    #[error("store error, {0}")]
    Store(String),
    #[error("config reload error, {0}")]
    ConfigReload(String),
    #[error("bus error, {0}")]
    Bus(String),
}

impl MqstoreError {
    #[inline]
    pub fn store<E: fmt::Display>(e: E) -> Self {
        MqstoreError::Store(e.to_string())
    }

    #[inline]
    pub fn config_reload<E: fmt::Display>(e: E) -> Self {
        MqstoreError::ConfigReload(e.to_string())
    }
}

impl From<rusqlite::Error> for MqstoreError {
    #[inline]
    fn from(e: rusqlite::Error) -> Self {
        MqstoreError::store(e)
    }
}

impl From<r2d2::Error> for MqstoreError {
    #[inline]
    fn from(e: r2d2::Error) -> Self {
        MqstoreError::store(e)
    }
}
