use {
    std::future::Future,
    tokio::{sync::watch, task::JoinHandle},
};

/// Owns the running consumer loops, one per durable, and the signal that
/// stops them. Built at startup, consumed by [`ConsumerRegistry::shutdown`].
pub struct ConsumerRegistry {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Receiver to hand to a loop before spawning it.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn spawn<F>(&mut self, durable: impl Into<String>, consumer: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let durable = durable.into();
        tracing::info!(durable = %durable, "registering consumer");
        self.tasks.push((durable, tokio::spawn(consumer)));
    }

    pub fn durables(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(durable, _)| durable.as_str())
    }

    /// Signal every loop and wait for all of them to return.
    pub async fn shutdown(self) {
        if self.shutdown.send(true).is_err() {
            tracing::debug!("no consumer loop left to signal");
        }
        for (durable, task) in self.tasks {
            match task.await {
                Ok(()) => tracing::info!(durable = %durable, "consumer stopped"),
                Err(e) => tracing::error!(durable = %durable, error = %e, "consumer task failed"),
            }
        }
    }
}
