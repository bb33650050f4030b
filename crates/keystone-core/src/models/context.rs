//! Request-scoped identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::Session;

/// Who is making the current request.
///
/// Built from a validated session and passed explicitly down the call
/// chain by the request handler. There is no process-wide "current user".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub session_id: Uuid,
    pub subject_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

impl From<Session> for RequestContext {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            subject_id: session.subject_id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            device_id: session.device_id,
        }
    }
}
