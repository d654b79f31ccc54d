//! Authorization hooks the bus invokes for connect, subscribe and publish
//!
//! Every decision is a synchronous read of the current registry snapshot. Denials
//! are logged with actor, topic and reason.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::acl::Access;
use crate::registry::Registry;

#[derive(Debug, Clone, Default)]
pub struct ConnectInfo {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

impl ConnectInfo {
    #[inline]
    pub fn new(client_id: impl Into<String>, username: Option<&str>, password: Option<&[u8]>) -> Self {
        Self {
            client_id: client_id.into(),
            username: username.map(String::from),
            password: password.map(Bytes::copy_from_slice),
        }
    }

    #[inline]
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Allow,
    BadUsernameOrPassword,
}

#[derive(Debug)]
pub enum Parameter<'a> {
    ClientAuthenticate(&'a ConnectInfo),
    ClientSubscribeCheckAcl(&'a ConnectInfo, &'a str),
    MessagePublishCheckAcl(&'a ConnectInfo, &'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    AuthResult(AuthResult),
    Access(Access),
}

///(proceed, result)
pub type ReturnType = (bool, Option<HookResult>);

#[async_trait]
pub trait Handler: Sync + Send {
    async fn hook(&self, param: &Parameter, acc: Option<HookResult>) -> ReturnType;
}

pub struct AuthHandler {
    registry: Arc<Registry>,
}

impl AuthHandler {
    #[inline]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn client_authenticate(&self, connect_info: &ConnectInfo) -> AuthResult {
        let password = connect_info.password.as_deref().map(String::from_utf8_lossy).unwrap_or_default();
        match connect_info.username.as_deref() {
            Some(username) if self.registry.authenticate(username, &password) => AuthResult::Allow,
            _ => {
                log::warn!(
                    "{} authenticate denied, username: {:?}, reason: bad username or password",
                    connect_info.client_id,
                    connect_info.username
                );
                AuthResult::BadUsernameOrPassword
            }
        }
    }

    #[inline]
    pub fn client_subscribe_check_acl(&self, connect_info: &ConnectInfo, topic_filter: &str) -> Access {
        self.check("subscribe", connect_info, topic_filter)
    }

    #[inline]
    pub fn message_publish_check_acl(&self, connect_info: &ConnectInfo, topic: &str) -> Access {
        self.check("publish", connect_info, topic)
    }

    fn check(&self, action: &str, connect_info: &ConnectInfo, topic: &str) -> Access {
        let access = self.registry.check(connect_info.username(), topic);
        if let Access::Deny(reason) = access {
            log::warn!(
                "{} {} denied, username: {}, topic: {}, reason: {}",
                connect_info.client_id,
                action,
                connect_info.username(),
                topic,
                reason
            );
        }
        access
    }
}

#[async_trait]
impl Handler for AuthHandler {
    async fn hook(&self, param: &Parameter, acc: Option<HookResult>) -> ReturnType {
        match param {
            Parameter::ClientAuthenticate(connect_info) => {
                if matches!(acc, Some(HookResult::AuthResult(AuthResult::BadUsernameOrPassword))) {
                    return (false, acc);
                }
                let res = self.client_authenticate(connect_info);
                (res == AuthResult::Allow, Some(HookResult::AuthResult(res)))
            }
            Parameter::ClientSubscribeCheckAcl(connect_info, topic_filter) => {
                let access = self.client_subscribe_check_acl(connect_info, topic_filter);
                (access.is_allow(), Some(HookResult::Access(access)))
            }
            Parameter::MessagePublishCheckAcl(connect_info, topic) => {
                let access = self.message_publish_check_acl(connect_info, topic);
                (access.is_allow(), Some(HookResult::Access(access)))
            }
        }
    }
}
