//! Orchestrates the ramp-up / hold / ramp-down load profile across a pool
//! of virtual-user tasks (spec.md §4.6, grounded in
//! `original_source/services/voice-gateway/tests/load/runner.py`'s
//! `LoadTestRunner`).

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audio_pool::AudioPool;
use crate::collector::ResultsCollector;
use crate::config::LoadTestConfig;
use crate::worker::{run_worker, WorkerConfig};

pub struct LoadTestRunner {
    config: LoadTestConfig,
    audio_pool: Arc<AudioPool>,
    collector: Arc<ResultsCollector>,
}

impl LoadTestRunner {
    pub fn new(config: LoadTestConfig, audio_pool: Arc<AudioPool>) -> Self {
        Self { config, audio_pool, collector: Arc::new(ResultsCollector::new()) }
    }

    pub fn collector(&self) -> Arc<ResultsCollector> {
        self.collector.clone()
    }

    /// Runs the full ramp-up/hold/ramp-down profile to completion (or until
    /// `external_stop` fires, e.g. on SIGINT) and waits for every worker to
    /// exit before returning.
    pub async fn run(&self, mut external_stop: watch::Receiver<bool>) {
        tracing::info!(
            target = %self.config.target_url,
            max_users = self.config.max_users,
            duration_seconds = self.config.total_duration().as_secs_f64(),
            "starting load test"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        let ramp_up = self.config.ramp_up;
        let max_users = self.config.max_users;

        if ramp_up.is_zero() {
            for i in 0..max_users {
                workers.push(self.spawn_worker(i, stop_rx.clone()));
            }
        } else {
            let interval = ramp_up / max_users.max(1);
            for i in 0..max_users {
                if *external_stop.borrow() {
                    break;
                }
                workers.push(self.spawn_worker(i, stop_rx.clone()));
                if i < max_users - 1 {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = external_stop.changed() => break,
                    }
                }
            }
        }
        tracing::info!(active_workers = workers.len(), "ramp up complete");

        if !self.config.hold.is_zero() {
            tracing::info!(seconds = self.config.hold.as_secs(), "holding");
            tokio::select! {
                _ = tokio::time::sleep(self.config.hold) => {}
                _ = external_stop.changed() => {}
            }
        }

        if !*external_stop.borrow() {
            self.ramp_down(&stop_tx, workers.len()).await;
        }

        let _ = stop_tx.send(true);
        for handle in workers {
            let _ = handle.await;
        }

        tracing::info!("load test completed");
    }

    fn spawn_worker(&self, worker_id: u32, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let worker_config = WorkerConfig::from_load_config(worker_id, &self.config);
        let audio_pool = self.audio_pool.clone();
        let collector = self.collector.clone();
        let max_requests = self.config.requests_per_user;
        tokio::spawn(run_worker(worker_config, audio_pool, collector, max_requests, stop))
    }

    /// Holds the shared stop signal open for `ramp_down` before the final
    /// stop so total wall-clock duration matches `total_duration()`; all
    /// workers share one `watch` channel so this waits out the window
    /// rather than releasing workers one at a time.
    async fn ramp_down(&self, _stop_tx: &watch::Sender<bool>, worker_count: usize) {
        if worker_count == 0 || self.config.ramp_down.is_zero() {
            return;
        }
        tracing::info!(seconds = self.config.ramp_down.as_secs(), "ramping down");
        tokio::time::sleep(self.config.ramp_down).await;
    }
}
