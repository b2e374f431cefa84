use std::{collections::HashMap, time::Duration};

use tokio::{io::AsyncWriteExt, net::TcpStream};

use rlhf_strategy::{
    NaiveStrategy, Strategy, StrategyConfig,
    dist::{
        Backend, DistErr, LOCAL_RANK, MASTER_ADDR, MASTER_PORT, ProcessGroup, RANK,
        TcpProcessGroup, WORLD_SIZE,
    },
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn endpoint(port: u16) -> String {
    format!("tcp://[127.0.0.1]:{port}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_ranks_rendezvous_and_pass_barriers() -> Result<(), DistErr> {
    let port = free_port();
    let world = 3;

    let ranks = (0..world).map(|rank| {
        tokio::spawn(async move {
            let mut pg = TcpProcessGroup::new(TIMEOUT);
            pg.init_process_group(Backend::Gloo, &endpoint(port), world, rank)
                .await?;
            pg.barrier().await?;
            pg.barrier().await?;
            Ok::<_, DistErr>(pg)
        })
    });

    for (rank, handle) in ranks.collect::<Vec<_>>().into_iter().enumerate() {
        let pg = handle.await.unwrap()?;
        assert_eq!(pg.rank(), Some(rank));
        assert_eq!(pg.world_size(), Some(world));
        assert_eq!(pg.backend(), Some(Backend::Gloo));
    }

    Ok(())
}

#[tokio::test]
async fn single_rank_world_needs_no_peers() -> Result<(), DistErr> {
    let mut pg = TcpProcessGroup::new(TIMEOUT);
    pg.init_process_group(Backend::Nccl, &endpoint(free_port()), 1, 0)
        .await?;

    assert!(pg.is_initialized());
    pg.barrier().await?;

    assert!(matches!(
        pg.init_process_group(Backend::Nccl, &endpoint(free_port()), 1, 0)
            .await,
        Err(DistErr::AlreadyInitialized)
    ));

    pg.destroy();
    assert!(!pg.is_initialized());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn world_size_disagreement_is_rejected() {
    let port = free_port();

    let master = tokio::spawn(async move {
        let mut pg = TcpProcessGroup::new(TIMEOUT);
        pg.init_process_group(Backend::Gloo, &endpoint(port), 2, 0)
            .await
    });

    let mut peer = TcpProcessGroup::new(TIMEOUT);
    let peer_res = peer
        .init_process_group(Backend::Gloo, &endpoint(port), 3, 1)
        .await;

    assert!(matches!(peer_res, Err(DistErr::Protocol(_))));
    assert!(matches!(
        master.await.unwrap(),
        Err(DistErr::Protocol(_))
    ));
}

async fn connect(port: u16) -> TcpStream {
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => return stream,
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stray_connections_do_not_break_rendezvous() -> Result<(), DistErr> {
    let port = free_port();

    let master = tokio::spawn(async move {
        let mut pg = TcpProcessGroup::new(TIMEOUT);
        pg.init_process_group(Backend::Gloo, &endpoint(port), 2, 0)
            .await?;
        Ok::<_, DistErr>(pg)
    });

    // Closed before saying anything.
    drop(connect(port).await);

    // Speaks something other than the rendezvous protocol.
    let mut noisy = connect(port).await;
    noisy.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    drop(noisy);

    let mut peer = TcpProcessGroup::new(TIMEOUT);
    peer.init_process_group(Backend::Gloo, &endpoint(port), 2, 1)
        .await?;
    let mut master = master.await.unwrap()?;

    assert_eq!(master.rank(), Some(0));
    assert_eq!(peer.rank(), Some(1));

    let (a, b) = tokio::join!(master.barrier(), peer.barrier());
    a?;
    b?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn naive_strategies_join_through_launcher_variables() {
    let port = free_port();

    let handles: Vec<_> = (0..2)
        .map(|rank| {
            tokio::spawn(async move {
                let vars = HashMap::from([
                    (RANK, rank.to_string()),
                    (LOCAL_RANK, rank.to_string()),
                    (WORLD_SIZE, "2".to_string()),
                    (MASTER_ADDR, "127.0.0.1".to_string()),
                    (MASTER_PORT, port.to_string()),
                ]);

                let config = StrategyConfig {
                    backend: Backend::Gloo,
                    ..Default::default()
                };
                let mut strategy = NaiveStrategy::new(TcpProcessGroup::new(TIMEOUT), config);
                let joined = strategy
                    .try_init_dist_with(true, |k| vars.get(k).cloned())
                    .await
                    .unwrap();

                strategy.process_group_mut().barrier().await.unwrap();
                (joined, strategy)
            })
        })
        .collect();

    for (rank, handle) in handles.into_iter().enumerate() {
        let (joined, strategy) = handle.await.unwrap();

        assert!(joined);
        assert_eq!(strategy.is_rank0(), rank == 0);
        assert_eq!(strategy.process_group().device(), Some(rank));
    }
}
