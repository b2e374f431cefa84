//! Length-prefixed JSON frames exchanged during rendezvous.
//!
//! Every frame is an 8-byte big-endian body length followed by the JSON body.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::DistErr;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Upper bound on a frame body; rendezvous frames are tiny.
const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Sent by every non-master rank right after connecting.
    Hello { rank: usize, world_size: usize },
    /// Sent by the master once every rank has checked in.
    Welcome { world_size: usize },
    /// Sent by the master instead of `Welcome` when a peer is refused.
    Reject { reason: String },
    /// A rank reached barrier `round`.
    Barrier { round: u64 },
    /// Every rank reached barrier `round`.
    Release { round: u64 },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Welcome { .. } => "welcome",
            Frame::Reject { .. } => "reject",
            Frame::Barrier { .. } => "barrier",
            Frame::Release { .. } => "release",
        }
    }
}

/// Writes `frame` to `tx` and flushes.
pub async fn send_frame<W>(tx: &mut W, frame: &Frame) -> Result<(), DistErr>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(frame)?;
    let header = (body.len() as LenType).to_be_bytes();

    tx.write_all(&header).await?;
    tx.write_all(&body).await?;
    tx.flush().await?;
    Ok(())
}

/// Waits for the next frame on `rx`.
///
/// # Errors
/// * `DistErr::Io` if the stream fails or closes mid-frame.
/// * `DistErr::Protocol` if the announced length exceeds the frame limit.
/// * `DistErr::Frame` if the body isn't a valid frame.
pub async fn recv_frame<R>(rx: &mut R) -> Result<Frame, DistErr>
where
    R: AsyncRead + Unpin,
{
    let mut size_buf = [0; LEN_TYPE_SIZE];
    rx.read_exact(&mut size_buf).await?;
    let len = LenType::from_be_bytes(size_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(DistErr::Protocol(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }

    let mut body = vec![0; len];
    rx.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}
