//! Worker pool
//!
//! Runs N independent worker loops over one shared context. Workers do not
//! talk to each other; every coordination point (queue pop, dedup,
//! politeness) lives in the store.

use crate::crawler::worker::{CrawlContext, Worker};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// A fixed-size pool of crawl workers
pub struct WorkerPool {
    ctx: Arc<CrawlContext>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool of `size` workers (at least one)
    pub fn new(ctx: Arc<CrawlContext>, size: usize) -> Self {
        Self {
            ctx,
            size: size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs every worker until `shutdown` turns true
    ///
    /// Returns the total number of tasks handled across workers.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> u64 {
        tracing::info!("Starting {} workers", self.size);

        let mut workers = JoinSet::new();
        for id in 0..self.size {
            let worker = Worker::new(id, Arc::clone(&self.ctx));
            let shutdown = shutdown.clone();
            workers.spawn(async move { worker.run(shutdown).await });
        }

        let mut total = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(handled) => total += handled,
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }

        tracing::info!("All workers stopped; {} tasks handled", total);
        total
    }

    /// Runs until Ctrl-C, letting in-flight tasks finish
    pub async fn run_until_ctrl_c(&self) -> u64 {
        let (tx, rx) = watch::channel(false);

        let signal = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown requested, finishing in-flight tasks");
                    let _ = tx.send(true);
                }
                Err(e) => {
                    tracing::error!("Unable to listen for Ctrl-C: {}", e);
                    // Keep the sender alive so workers keep running.
                    std::future::pending::<()>().await;
                    drop(tx);
                }
            }
        });

        let total = self.run(rx).await;
        signal.abort();
        total
    }
}
