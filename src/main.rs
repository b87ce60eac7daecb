use std::{env, sync::atomic::Ordering};

use anyhow::Context as _;
use fedsim::{trainer::Metric, Config, Runner};
use log::info;
use tokio::{signal, task};

const DEFAULT_CONFIG: &str = "config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let cfg = Config::from_json_file(&path).with_context(|| format!("loading {path}"))?;
    info!("loaded config from {path}");

    let runner = Runner::default();
    let stop = runner.stop_handle();
    let mut run = task::spawn_blocking(move || runner.run(&cfg));

    let reports = tokio::select! {
        ret = &mut run => ret??,
        _ = signal::ctrl_c() => {
            info!("received SIGINT, stopping after the current client");
            stop.store(true, Ordering::Relaxed);
            run.await??
        }
    };

    for report in &reports {
        let metric = match report.test.metric {
            Metric::Accuracy(acc) => format!("accuracy {acc:.4}"),
            Metric::Mse(mse) => format!("mse {mse:.4}"),
        };
        info!(
            "client {}: test loss {:.4}, {metric}",
            report.client_id, report.test.avg_loss
        );
    }

    info!("{} clients finished", reports.len());
    Ok(())
}
