use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::time::{Duration, Instant, sleep};
use tracing::{info, warn};

use workq_core::observability::{self, GroupStats};
use workq_core::{
    Action, ActionError, ConfigError, Entry, Submission, WorkQueue, WorkQueueConfig, WorkQueueError,
};

const MAX_RETRIES: u32 = 5;

#[derive(Debug)]
struct Delivery {
    id: u32,
    retries: AtomicU32,
}

impl Delivery {
    fn new(id: u32) -> Self {
        Self {
            id,
            retries: AtomicU32::new(0),
        }
    }

    /// Retry predicate: give up after `MAX_RETRIES`.
    fn bump_retries(&self) -> bool {
        let retries = self.retries.fetch_add(1, Ordering::Relaxed) + 1;
        if retries > MAX_RETRIES {
            warn!(id = self.id, "retry budget exhausted");
            return false;
        }
        true
    }
}

/// Fails at random, like a flaky downstream.
struct FlakySend {
    failure_rate: f64,
    latency: Duration,
}

fn roll(rate: f64) -> bool {
    rand::thread_rng().gen_bool(rate)
}

#[async_trait]
impl Action<Delivery> for FlakySend {
    async fn run(&self, task: Arc<Delivery>) -> Result<(), ActionError> {
        let fail = roll(self.failure_rate);
        sleep(self.latency).await;
        if fail {
            return Err(ActionError::new(format!("delivery {} rejected", task.id)));
        }
        info!(id = task.id, "delivered");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    succeeded: usize,
    failed: usize,
    groups: Vec<GroupStats>,
}

/// Scripted work queue demo.
#[derive(Debug, Parser)]
#[command(name = "workq-cli", about, long_about = None)]
struct Cli {
    /// JSON config file; falls back to `WORKQ_*` env vars.
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to let the demo run.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
}

impl Cli {
    fn queue_config(&self) -> Result<WorkQueueConfig, ConfigError> {
        match &self.config {
            Some(path) => WorkQueueConfig::from_json_file(path),
            None => WorkQueueConfig::from_env(),
        }
    }
}

#[tokio::main]
async fn main() {
    observability::init();

    let cli = Cli::parse();

    // (A) Queue を用意
    let built = cli.queue_config().map_err(WorkQueueError::from).and_then(|config| {
        let queue = WorkQueue::<Delivery>::builder().config(config).build()?;
        Ok(queue)
    });
    let queue = match built {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("workq-cli: {e}");
            std::process::exit(2);
        }
    };

    let succeeded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let on_complete = {
        let (succeeded, failed) = (succeeded.clone(), failed.clone());
        move |task: &Delivery, ok: bool| {
            let counter = if ok { &succeeded } else { &failed };
            counter.fetch_add(1, Ordering::Relaxed);
            info!(id = task.id, ok, "completed");
        }
    };

    // (B) "reports" は 2 秒経つまで gate で止める
    let opens_at = Instant::now() + Duration::from_secs(2);
    queue.set_group_start_gate("reports", move || Instant::now() >= opens_at);

    queue.start();

    // (C) タスク投入
    let send: Arc<dyn Action<Delivery>> = Arc::new(FlakySend {
        failure_rate: 0.3,
        latency: Duration::from_millis(20),
    });
    let submitter = queue.submitter();
    for id in 1..=20 {
        let submissions = [
            Submission::ordered("ledger", Delivery::new(id)),
            Submission::randomized("mailer", Delivery::new(id + 100)),
            Submission::randomized("reports", Delivery::new(id + 200)),
        ];
        for submission in submissions {
            let submission = submission
                .action(send.clone())
                .retry(Delivery::bump_retries)
                .on_complete(on_complete.clone());
            if let Err(e) = submitter.submit(submission).await {
                warn!(error = %e, "submit failed");
            }
        }
    }

    // An unknown discipline tag is logged and dropped.
    if let Err(e) = submitter
        .submit_tagged("lifo", "ledger", Entry::new(Delivery::new(999)))
        .await
    {
        warn!(error = %e, "tagged submit failed");
    }

    // (D) 指定秒数待つ（Ctrl-C で早期終了）
    tokio::select! {
        _ = sleep(Duration::from_secs(cli.seconds)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    // (E) 後片付け: ledger を消してから停止
    queue.remove_group("ledger");
    queue.shutdown().await;

    let summary = Summary {
        succeeded: succeeded.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        groups: queue.snapshot(),
    };
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("workq-cli: cannot render summary: {e}"),
    }
}
