//! Scrape page titles with a small pool of (mock) browser sessions.
//!
//! Run with:
//! ```sh
//! RUST_LOG=info cargo run --example page_titles
//! ```
//!
//! Each browser takes a moment to "launch", pages take a random time to load,
//! and roughly one page in ten never renders its title, so the output shows
//! successes and failures side by side.

use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use prometheus_lease_pool::config::SchedulerConfig;
use prometheus_lease_pool::core::{AppResult, Lease, TaskReport, TaskScheduler};
use prometheus_lease_pool::util::init_tracing;
use rand::Rng;
use tracing::info;

/// A stand-in for a remote-controlled browser.
struct Browser {
    session: usize,
    current_url: Option<String>,
}

impl Browser {
    fn launch(session: usize) -> AppResult<Self> {
        info!(session, "launching browser");
        thread::sleep(Duration::from_millis(50));
        Ok(Self {
            session,
            current_url: None,
        })
    }

    fn open(&mut self, url: &str) -> AppResult<()> {
        let load_ms = rand::rng().random_range(20..120);
        thread::sleep(Duration::from_millis(load_ms));
        if rand::rng().random_ratio(1, 10) {
            bail!("title element never became visible");
        }
        self.current_url = Some(url.to_string());
        Ok(())
    }

    fn title(&self) -> Option<String> {
        let url = self.current_url.as_deref()?;
        let query = url.rsplit_once("search_query=").map_or(url, |(_, q)| q);
        Some(format!("{} - YouTube", query.replace('+', " ")))
    }
}

/// Task body: load `url` and read the document title.
fn get_title(mut browser: Lease<Browser>, url: String) -> (Lease<Browser>, AppResult<String>) {
    info!(session = browser.session, %url, "running get_title");
    let title = browser
        .open(&url)
        .and_then(|()| browser.title().context("page has no title"))
        .with_context(|| format!("loading {url}"));
    (browser, title)
}

fn print_reports(reports: &[TaskReport<String>]) {
    for report in reports {
        match &report.outcome {
            Ok(title) => println!("  [{}] {title}", report.task_id),
            Err(failure) => println!("  [{}] FAILED: {failure}", report.task_id),
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let scheduler: TaskScheduler<Browser, String> =
        TaskScheduler::new(SchedulerConfig::new(), &Browser::launch)
            .context("failed to start browser pool")?;

    let first = [
        "https://youtube.com/results?search_query=tonight+show",
        "https://youtube.com/results?search_query=hello+world",
    ];
    for url in first {
        scheduler.submit(get_title, url.to_string())?;
    }

    let summary = scheduler.wait_all();
    println!("First batch ({} tasks finished):", summary.completed.len());
    print_reports(&scheduler.drain_results());

    let base = "https://youtube.com/results?search_query=rwby+episode+";
    for episode in 0..23 {
        scheduler.submit(get_title, format!("{base}{episode}"))?;
    }

    let summary = scheduler.wait_all();
    println!();
    println!("Second batch ({} tasks finished):", summary.completed.len());
    print_reports(&scheduler.drain_results());

    let stats = scheduler.stats();
    println!();
    println!(
        "Done: {} succeeded, {} failed on {} browsers",
        stats.completed_tasks, stats.failed_tasks, stats.worker_count
    );

    scheduler.shutdown();
    Ok(())
}
