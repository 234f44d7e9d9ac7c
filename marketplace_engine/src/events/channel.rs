//! Fire-and-forget lifecycle notifications.
//!
//! Components subscribe to order lifecycle events and react to them (typically by sending emails or push
//! notifications). Handlers never see engine state, only the event itself, and they cannot influence the outcome of the
//! operation that raised it. Handlers can be async.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinSet},
};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // The handler shuts down once every producer has been dropped
        drop(self.sender);
        let mut jobs = JoinSet::new();
        loop {
            tokio::select! {
                event = self.listener.recv() => match event {
                    Some(event) => {
                        trace!("📬️ Handling event");
                        let handler = Arc::clone(&self.handler);
                        jobs.spawn(async move { (handler)(event).await });
                    },
                    None => break,
                },
                Some(finished) = jobs.join_next(), if !jobs.is_empty() => log_job_result(finished),
            }
        }
        if !jobs.is_empty() {
            debug!("📬️ Waiting for {} notification jobs to complete", jobs.len());
        }
        while let Some(finished) = jobs.join_next().await {
            log_job_result(finished);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_job_result(result: Result<(), JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => error!("📬️ Notification job did not finish: {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Queue an event. When the buffer is full this waits for space; a closed channel is logged and ignored.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}
