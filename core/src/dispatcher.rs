use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::worker::CrawlerContext;

/// A cooperative handle to a running `Dispatcher`, cheap to clone and safe
/// to hand to another task so it can ask the crawl to wind down early.
#[derive(Clone)]
pub struct DispatcherHandle {
    terminated: Arc<AtomicBool>,
}

impl DispatcherHandle {
    /// Requests that the dispatcher stop spawning new domains and abort
    /// whatever is still in flight the next time it wakes up. Doesn't block
    /// on the in-flight workers actually finishing.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Relaxed);
    }
}

/// Owns the whole crawl: one [`CrawlerContext`] shared by every per-domain
/// worker, and the event queue workers use to announce a newly discovered
/// domain so the dispatcher can spawn a task for it.
///
/// `start` spawns one task per seed, then polls the event queue every ten
/// seconds, reaping finished tasks and spawning one for every new domain it
/// sees, until nothing is left running or `terminate` has been called.
pub struct Dispatcher {
    ctx: Arc<CrawlerContext>,
    event_rx: mpsc::UnboundedReceiver<String>,
    terminated: Arc<AtomicBool>,
}

const POLL_INTERVAL: Duration = Duration::from_secs(10);

impl Dispatcher {
    pub fn new(ctx_builder: impl FnOnce(mpsc::UnboundedSender<String>) -> CrawlerContext) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(ctx_builder(tx));
        Dispatcher {
            ctx,
            event_rx: rx,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn context(&self) -> &Arc<CrawlerContext> {
        &self.ctx
    }

    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            terminated: self.terminated.clone(),
        }
    }

    fn spawn_domain(&self, domain: String) -> JoinHandle<()> {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            ctx.crawl_domain(&domain).await;
        })
    }

    /// Runs every seed domain to completion, picking up any domain a worker
    /// discovers along the way (a canonical redirect target, a link found
    /// during a crawl, anything `load_queue` reported over the event queue
    /// the first time it saw that origin).
    pub async fn start(&mut self, seeds: impl IntoIterator<Item = String>) {
        let mut tasks: Vec<JoinHandle<()>> = seeds
            .into_iter()
            .map(|domain| self.spawn_domain(domain))
            .collect();

        loop {
            if self.terminated.load(Ordering::Relaxed) {
                break;
            }
            while let Ok(domain) = self.event_rx.try_recv() {
                info!(url = domain, routine = "dispatcher", "new domain discovered");
                tasks.push(self.spawn_domain(domain));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            tasks.retain(|t| !t.is_finished());
            if tasks.is_empty() {
                break;
            }
        }

        for task in tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchClient;
    use crate::policy::OpenPolicy;
    use crate::sinks::FileStoreSink;

    #[tokio::test]
    async fn terminate_stops_the_poll_loop_without_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(|tx| {
            CrawlerContext::new(
                FetchClient::new("dysdera-test", Duration::from_secs(5)).unwrap(),
                Arc::new(OpenPolicy),
                Arc::new(FileStoreSink::new(dir.path())),
                1,
                Duration::from_secs(5),
                tx,
            )
        });
        let handle = dispatcher.handle();
        handle.terminate();
        // with no seeds and an already-terminated flag, start returns on its
        // very first loop iteration instead of waiting out a poll interval.
        dispatcher.start(Vec::<String>::new()).await;
    }
}
