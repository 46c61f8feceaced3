//! Logical message shapes exchanged between contexts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::WireError;

/// Correlation token of one request. Random so that messages from several
/// independent contexts never collide on one receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        RequestId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical map instance multiplexed over shared worker contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// What an envelope asks the receiver to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Withdraw an earlier request with the same id.
    Cancel,
    /// Completion of an earlier request with the same id.
    Response,
    /// Invoke a named method, flat (`loadTile`) or composite (`vector.loadTile`).
    Call(String),
}

const CANCEL: &str = "<cancel>";
const RESPONSE: &str = "<response>";

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            CANCEL => MessageType::Cancel,
            RESPONSE => MessageType::Response,
            _ => MessageType::Call(value),
        }
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Cancel => CANCEL.to_string(),
            MessageType::Response => RESPONSE.to_string(),
            MessageType::Call(method) => method,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Cancel => f.write_str(CANCEL),
            MessageType::Response => f.write_str(RESPONSE),
            MessageType::Call(method) => f.write_str(method),
        }
    }
}

/// A request, response or cancellation notice.
///
/// Payloads are serialized values; nothing crossing a context aliases
/// memory on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub id: RequestId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub has_callback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<SessionId>,
    #[serde(default)]
    pub must_queue: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Envelope {
    pub fn request(
        id: RequestId,
        method: &str,
        data: Value,
        has_callback: bool,
        target_session_id: Option<SessionId>,
        source_session_id: Option<SessionId>,
        must_queue: bool,
    ) -> Self {
        Self {
            id,
            message_type: MessageType::Call(method.to_string()),
            has_callback,
            target_session_id,
            source_session_id,
            must_queue,
            data,
            error: None,
        }
    }

    pub fn response(
        id: RequestId,
        target_session_id: Option<SessionId>,
        source_session_id: Option<SessionId>,
        result: std::result::Result<Value, WireError>,
    ) -> Self {
        let (data, error) = match result {
            Ok(data) => (data, None),
            Err(err) => (Value::Null, Some(err)),
        };
        Self {
            id,
            message_type: MessageType::Response,
            has_callback: false,
            target_session_id,
            source_session_id,
            must_queue: false,
            data,
            error,
        }
    }

    pub fn cancel(
        id: RequestId,
        target_session_id: Option<SessionId>,
        source_session_id: Option<SessionId>,
    ) -> Self {
        Self {
            id,
            message_type: MessageType::Cancel,
            has_callback: false,
            target_session_id,
            source_session_id,
            must_queue: false,
            data: Value::Null,
            error: None,
        }
    }
}
