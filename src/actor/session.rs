use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::actor::{Actor, Cancelable, PendingRequest, ResponseCallback, SendError, SessionId};
use crate::Result;

/// A worker actor bound to one session: everything it sends is addressed to
/// that session's front actor only.
#[derive(Clone, Debug)]
pub struct SessionActor {
    actor: Actor,
    session: SessionId,
}

impl SessionActor {
    pub fn new(actor: Actor, session: SessionId) -> Self {
        Self { actor, session }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn send<T: Serialize + ?Sized>(
        &self,
        method: &str,
        data: &T,
        callback: Option<ResponseCallback>,
    ) -> std::result::Result<Cancelable, SendError> {
        self.actor.send(method, data, callback, Some(self.session))
    }

    pub fn send_with<T: Serialize + ?Sized>(
        &self,
        method: &str,
        data: &T,
        callback: Option<ResponseCallback>,
        must_queue: bool,
    ) -> std::result::Result<Cancelable, SendError> {
        self.actor
            .send_with(method, data, callback, Some(self.session), must_queue)
    }

    pub fn request<T, R>(&self, method: &str, data: &T) -> Result<(PendingRequest<R>, Cancelable)>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.actor.request(method, data, Some(self.session))
    }
}
