//! Live snapshot streams.
//!
//! A subscription is a background task that re-reads the store whenever a
//! relevant [`ChatEvent`] is published and pushes the full snapshot into a
//! bounded channel. Dropping the handle or calling
//! [`Subscription::unsubscribe`] aborts the task, so no deliveries happen
//! afterwards. If a re-read still fails after the read retries, the stream
//! ends and [`Subscription::failure`] holds the error.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use soko_types::events::ChatEvent;

use crate::error::{ChatError, ChatResult};

/// What a refresh produced.
pub(crate) enum Refresh<T> {
    Emit(T),
    /// Emit a final snapshot, then end the stream.
    Finish(T),
}

enum Delivery<T> {
    Snapshot(T),
    Failed(ChatError),
}

/// Handle to a live snapshot stream. Also usable as a [`Stream`].
pub struct Subscription<T> {
    rx: mpsc::Receiver<Delivery<T>>,
    task: JoinHandle<()>,
    failure: Option<ChatError>,
}

impl<T> Subscription<T> {
    /// Next snapshot, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<T> {
        let delivery = self.rx.recv().await;
        self.accept(delivery)
    }

    /// The error that ended the stream, if it did not end normally.
    pub fn failure(&self) -> Option<&ChatError> {
        self.failure.as_ref()
    }

    pub fn take_failure(&mut self) -> Option<ChatError> {
        self.failure.take()
    }

    fn accept(&mut self, delivery: Option<Delivery<T>>) -> Option<T> {
        match delivery? {
            Delivery::Snapshot(snapshot) => Some(snapshot),
            Delivery::Failed(e) => {
                self.failure = Some(e);
                None
            }
        }
    }

    /// Stops deliveries. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(delivery) => Poll::Ready(this.accept(delivery)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Starts a watch task. `initial` is delivered first; after that `refresh` runs
/// once per burst of events accepted by `relevant`, receiving the newest one.
/// A lagged receiver refreshes with `None` since events were lost.
pub(crate) fn spawn_watch<T, P, F, Fut>(
    label: String,
    initial: T,
    buffer: usize,
    mut events: broadcast::Receiver<ChatEvent>,
    relevant: P,
    mut refresh: F,
) -> Subscription<T>
where
    T: Send + 'static,
    P: Fn(&ChatEvent) -> bool + Send + 'static,
    F: FnMut(Option<ChatEvent>) -> Fut + Send + 'static,
    Fut: Future<Output = ChatResult<Refresh<T>>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    let task = tokio::spawn(async move {
        if tx.send(Delivery::Snapshot(initial)).await.is_err() {
            return;
        }

        loop {
            let trigger = tokio::select! {
                _ = tx.closed() => break,
                received = events.recv() => match received {
                    Ok(event) if relevant(&event) => Some(event),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        warn!("{}: event receiver lagged by {} events", label, n);
                        None
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            // Collapse a burst into one re-read; a lag or deletion sticks.
            let mut trigger = trigger;
            loop {
                match events.try_recv() {
                    Ok(event) if relevant(&event) => {
                        if !matches!(trigger, Some(ChatEvent::ChatDeleted { .. })) {
                            trigger = trigger.map(|_| event);
                        }
                    }
                    Ok(_) => {}
                    Err(TryRecvError::Lagged(_)) => {
                        if !matches!(trigger, Some(ChatEvent::ChatDeleted { .. })) {
                            trigger = None;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Closed) => break,
                }
            }

            match refresh(trigger).await {
                Ok(Refresh::Emit(snapshot)) => {
                    if tx.send(Delivery::Snapshot(snapshot)).await.is_err() {
                        break;
                    }
                }
                Ok(Refresh::Finish(snapshot)) => {
                    let _ = tx.send(Delivery::Snapshot(snapshot)).await;
                    debug!("{}: stream finished", label);
                    break;
                }
                Err(e) => {
                    warn!("{}: refresh failed, ending stream: {}", label, e);
                    let _ = tx.send(Delivery::Failed(e)).await;
                    break;
                }
            }
        }
    });

    Subscription {
        rx,
        task,
        failure: None,
    }
}
