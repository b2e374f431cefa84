use std::{env, path::Path};

use anyhow::Context;
use log::info;

use rlhf_strategy::{
    NaiveStrategy, Strategy, StrategyConfig,
    dist::{ProcessGroup, TcpProcessGroup},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => StrategyConfig::from_json_file(Path::new(&path))
            .with_context(|| format!("failed to load config from {path}"))?,
        None => StrategyConfig::default(),
    };

    let process_group = TcpProcessGroup::new(config.init_timeout());
    let force = config.force_distributed;
    let mut strategy = NaiveStrategy::new(process_group, config);

    let joined = strategy
        .try_init_dist(force)
        .await
        .context("failed to join the process group")?;

    if !joined {
        info!(strategy = strategy.name(); "running as a single process");
        return Ok(());
    }

    let pg = strategy.process_group_mut();
    pg.barrier().await.context("startup barrier failed")?;

    info!(
        strategy = strategy.name(),
        rank = strategy.process_group().rank().unwrap_or_default(),
        is_rank0 = strategy.is_rank0();
        "every rank is up"
    );

    strategy.process_group_mut().destroy();
    Ok(())
}
