use futures::channel::oneshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::actor::{Actor, Cancelable, ResponseCallback, SessionId};
use crate::{Error, Result};

/// Response to an [`Actor::request`], decoded into `R` once it arrives.
///
/// Resolves to [`Error::Disconnected`] when the request is canceled or its
/// actor goes away before answering.
pub struct PendingRequest<R> {
    rx: oneshot::Receiver<Result<Value>>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> Future for PendingRequest<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(
                result.and_then(|value| serde_json::from_value(value).map_err(Error::from)),
            ),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Disconnected(
                "request dropped before a response arrived".to_string(),
            ))),
        }
    }
}

/// A callback that completes a [`PendingRequest`].
fn pending<R>() -> (ResponseCallback, PendingRequest<R>) {
    let (tx, rx) = oneshot::channel();
    let callback: ResponseCallback = Box::new(move |result| {
        if tx.send(result).is_err() {
            log::debug!("response for a request nobody awaits");
        }
    });
    (
        callback,
        PendingRequest {
            rx,
            _marker: PhantomData,
        },
    )
}

impl Actor {
    /// Future-returning variant of [`Actor::send`].
    pub fn request<T, R>(
        &self,
        method: &str,
        data: &T,
        target_session: Option<SessionId>,
    ) -> Result<(PendingRequest<R>, Cancelable)>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (callback, pending) = pending();
        let cancel = self.send(method, data, Some(callback), target_session)?;
        Ok((pending, cancel))
    }
}
