use std::time::Duration;

use futures::future::try_join_all;
use log::{debug, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{self, Instant},
};

use super::{
    Backend, DistErr, ProcessGroup,
    frame::{Frame, recv_frame, send_frame},
};

/// Matches the default collective timeout of common launchers.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const RETRY_INTERVAL: Duration = Duration::from_millis(100);
/// How long an accepted connection has to identify itself.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Process group bootstrapped over a TCP rendezvous.
///
/// Rank 0 listens on the endpoint and every other rank connects to it, forming a
/// star. The star is kept alive after init and carries `barrier` rounds.
#[derive(Debug)]
pub struct TcpProcessGroup {
    timeout: Duration,
    group: Option<Group>,
    device: Option<usize>,
}

#[derive(Debug)]
struct Group {
    backend: Backend,
    rank: usize,
    world_size: usize,
    // rank 0: one stream per peer, ordered by rank; otherwise: the master stream.
    links: Vec<TcpStream>,
    round: u64,
}

impl Default for TcpProcessGroup {
    fn default() -> Self {
        Self::new(DEFAULT_INIT_TIMEOUT)
    }
}

impl TcpProcessGroup {
    /// Creates a new, uninitialized `TcpProcessGroup`.
    ///
    /// # Arguments
    /// * `timeout` - How long the whole rendezvous may take.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            group: None,
            device: None,
        }
    }

    /// The accelerator index selected through `set_device`.
    pub fn device(&self) -> Option<usize> {
        self.device
    }

    pub fn backend(&self) -> Option<Backend> {
        self.group.as_ref().map(|g| g.backend)
    }

    /// Blocks until every rank in the group has reached this barrier.
    ///
    /// # Errors
    /// * `DistErr::NotInitialized` before a successful init.
    /// * `DistErr::Protocol` if ranks disagree on the barrier round.
    /// * `DistErr::Io` if a link fails.
    pub async fn barrier(&mut self) -> Result<(), DistErr> {
        let group = self.group.as_mut().ok_or(DistErr::NotInitialized)?;
        group.round += 1;
        let round = group.round;

        if group.rank == 0 {
            try_join_all(group.links.iter_mut().map(|link| async move {
                match recv_frame(link).await? {
                    Frame::Barrier { round: r } if r == round => Ok::<(), DistErr>(()),
                    other => Err(unexpected("barrier", &other)),
                }
            }))
            .await?;

            try_join_all(
                group
                    .links
                    .iter_mut()
                    .map(|link| async move { send_frame(link, &Frame::Release { round }).await }),
            )
            .await?;
        } else {
            let link = &mut group.links[0];
            send_frame(link, &Frame::Barrier { round }).await?;

            match recv_frame(link).await? {
                Frame::Release { round: r } if r == round => {}
                other => return Err(unexpected("release", &other)),
            }
        }

        debug!(rank = group.rank, round = round; "barrier passed");
        Ok(())
    }

    async fn rendezvous(
        &self,
        host: &str,
        port: u16,
        world_size: usize,
        rank: usize,
    ) -> Result<Vec<TcpStream>, DistErr> {
        if rank == 0 {
            host_rendezvous(host, port, world_size).await
        } else {
            join_rendezvous(host, port, world_size, rank).await
        }
    }
}

impl ProcessGroup for TcpProcessGroup {
    async fn init_process_group(
        &mut self,
        backend: Backend,
        init_method: &str,
        world_size: usize,
        rank: usize,
    ) -> Result<(), DistErr> {
        if self.group.is_some() {
            return Err(DistErr::AlreadyInitialized);
        }

        if world_size == 0 || rank >= world_size {
            return Err(DistErr::InvalidRank { rank, world_size });
        }

        let (host, port) = parse_init_method(init_method)?;
        debug!(rank = rank, world_size = world_size, port = port; "joining rendezvous at {host}");

        let links = time::timeout(
            self.timeout,
            self.rendezvous(&host, port, world_size, rank),
        )
        .await
        .map_err(|_| DistErr::Timeout {
            addr: format!("{host}:{port}"),
        })??;

        info!(rank = rank, world_size = world_size; "process group initialized with {backend} backend");

        self.group = Some(Group {
            backend,
            rank,
            world_size,
            links,
            round: 0,
        });

        Ok(())
    }

    fn set_device(&mut self, local_rank: usize) -> Result<(), DistErr> {
        debug!(local_rank = local_rank; "selecting device");
        self.device = Some(local_rank);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.group.is_some()
    }

    fn rank(&self) -> Option<usize> {
        self.group.as_ref().map(|g| g.rank)
    }

    fn world_size(&self) -> Option<usize> {
        self.group.as_ref().map(|g| g.world_size)
    }

    /// Closes every link.
    fn destroy(&mut self) {
        if let Some(group) = self.group.take() {
            info!(rank = group.rank; "process group destroyed");
        }
        self.device = None;
    }
}

/// Splits `tcp://[host]:port` (brackets optional) into host and port.
pub fn parse_init_method(init_method: &str) -> Result<(String, u16), DistErr> {
    let invalid = || DistErr::InvalidInitMethod(init_method.to_string());

    let addr = init_method.strip_prefix("tcp://").ok_or_else(invalid)?;
    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;

    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']').ok_or_else(invalid)?,
        None => host,
    };

    if host.is_empty() {
        return Err(invalid());
    }

    let port = port.parse().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

async fn host_rendezvous(
    host: &str,
    port: u16,
    world_size: usize,
) -> Result<Vec<TcpStream>, DistErr> {
    let listener = TcpListener::bind((host, port)).await?;
    let mut slots: Vec<Option<TcpStream>> = (1..world_size).map(|_| None).collect();
    let mut joined = 0;

    while joined < slots.len() {
        let (mut stream, addr) = listener.accept().await?;

        // Until it says hello a connection is anonymous; dropping it leaves the
        // rendezvous intact.
        let hello = time::timeout(HELLO_TIMEOUT, recv_frame(&mut stream)).await;
        let (peer_rank, peer_world) = match hello {
            Ok(Ok(Frame::Hello { rank, world_size })) => (rank, world_size),
            Ok(Ok(other)) => {
                warn!("dropping connection from {addr}: {}", unexpected("hello", &other));
                continue;
            }
            Ok(Err(e)) => {
                warn!("dropping connection from {addr}: {e}");
                continue;
            }
            Err(_) => {
                warn!("dropping connection from {addr}: no hello within {HELLO_TIMEOUT:?}");
                continue;
            }
        };

        let reason = if peer_world != world_size {
            Some(format!(
                "rank {peer_rank} expects world size {peer_world}, master has {world_size}"
            ))
        } else if peer_rank == 0 || peer_rank >= world_size {
            Some(format!("rank {peer_rank} is out of range for world size {world_size}"))
        } else if slots[peer_rank - 1].is_some() {
            Some(format!("rank {peer_rank} joined twice"))
        } else {
            None
        };

        if let Some(reason) = reason {
            warn!("rejecting peer at {addr}: {reason}");
            send_frame(&mut stream, &Frame::Reject { reason: reason.clone() }).await?;
            return Err(DistErr::Protocol(reason));
        }

        debug!(rank = peer_rank; "peer joined from {addr}");
        slots[peer_rank - 1] = Some(stream);
        joined += 1;
    }

    let mut links: Vec<TcpStream> = slots.into_iter().flatten().collect();
    try_join_all(
        links
            .iter_mut()
            .map(|link| async move { send_frame(link, &Frame::Welcome { world_size }).await }),
    )
    .await?;

    Ok(links)
}

async fn join_rendezvous(
    host: &str,
    port: u16,
    world_size: usize,
    rank: usize,
) -> Result<Vec<TcpStream>, DistErr> {
    let started = Instant::now();

    let mut stream = loop {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => break stream,
            Err(e) => {
                debug!(
                    rank = rank,
                    waited_ms = started.elapsed().as_millis() as u64;
                    "master not reachable yet: {e}"
                );
                time::sleep(RETRY_INTERVAL).await;
            }
        }
    };

    send_frame(&mut stream, &Frame::Hello { rank, world_size }).await?;

    match recv_frame(&mut stream).await? {
        Frame::Welcome { world_size: w } if w == world_size => Ok(vec![stream]),
        Frame::Reject { reason } => Err(DistErr::Protocol(reason)),
        other => Err(unexpected("welcome", &other)),
    }
}

fn unexpected(expected: &str, got: &Frame) -> DistErr {
    DistErr::Protocol(format!("expected {expected}, got {}", got.kind()))
}
