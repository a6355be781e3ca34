//! Wiring of listener, dispatcher and processor
//!
//! ```text
//! EventListener --(payload)--> DispatchingHandler --submit--> BoundedDispatcher
//!                                                                  |
//!                                             worker: Processor::process -> MentionStore
//! ```

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::dispatcher::{BoundedDispatcher, DispatcherConfig, DispatcherState};
use crate::error::ListenerError;
use crate::listener::{EventListener, MessageHandler};
use crate::processor::{DispatchingHandler, Processor};
use crate::shutdown::Shutdown;

pub struct MentionPipeline {
    listener: Arc<dyn EventListener>,
    handler: Arc<dyn MessageHandler>,
    dispatcher: Arc<BoundedDispatcher>,
    shutdown: Shutdown,
}

impl MentionPipeline {
    /// Start the worker pool. Messages flow only after [`start`](Self::start).
    pub fn new(
        listener: Arc<dyn EventListener>,
        processor: Processor,
        dispatcher_config: DispatcherConfig,
        shutdown: Shutdown,
    ) -> Self {
        let dispatcher = BoundedDispatcher::start(dispatcher_config, shutdown.clone());
        let handler: Arc<dyn MessageHandler> =
            Arc::new(DispatchingHandler::new(processor, Arc::clone(&dispatcher)));

        Self {
            listener,
            handler,
            dispatcher,
            shutdown,
        }
    }

    /// Spawn the delivery loop. It returns once shutdown is signalled, or with
    /// an error if the subscription itself fails.
    pub fn start(&self) -> JoinHandle<Result<(), ListenerError>> {
        let listener = Arc::clone(&self.listener);
        let handler = Arc::clone(&self.handler);
        let shutdown = self.shutdown.clone();

        info!("Starting mention pipeline");
        tokio::spawn(async move {
            let result = listener.listen(handler, shutdown).await;
            match &result {
                Ok(()) => info!("Story delivery loop exited"),
                Err(e) => error!(error = %e, "Story delivery loop failed"),
            }
            result
        })
    }

    pub fn dispatcher(&self) -> &Arc<BoundedDispatcher> {
        &self.dispatcher
    }

    pub fn state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    /// Resolve once every accepted task has finished after shutdown.
    pub async fn stopped(&self) {
        self.dispatcher.stopped().await;
    }
}
