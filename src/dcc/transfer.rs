//! The DCC receive loop.
//!
//! Bytes are buffered and written to disk one packet at a time. After every
//! packet, and once more when the transfer completes, the receiver sends a
//! 4-byte big-endian count of the bytes written during this attempt.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

use super::DccError;

const READ_CHUNK: usize = 64 * 1024;

/// Parameters for one download attempt.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Announced size of the whole file.
    pub total: u64,
    /// Bytes already on disk before this attempt.
    pub offset: u64,
    pub packet_size: usize,
    pub progress_step: f64,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub fraction: f64,
    pub received: u64,
    pub total: u64,
}

/// Download the rest of the file from `stream` into `sink`.
///
/// Returns the number of bytes written in this attempt. Progress is reported
/// at the start fraction, whenever it has grown by `progress_step`, and at
/// 1.0 when done.
pub async fn receive<S, W>(
    stream: &mut S,
    sink: &mut W,
    plan: &Plan,
    mut on_progress: impl FnMut(Progress),
) -> Result<u64, DccError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let remaining = plan
        .total
        .checked_sub(plan.offset)
        .ok_or(DccError::Overflow {
            received: plan.offset,
            expected: plan.total,
        })?;
    let packet_size = plan.packet_size.max(1);

    let mut buffer: Vec<u8> = Vec::with_capacity(packet_size.min(READ_CHUNK) * 2);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut received: u64 = 0;
    let mut written: u64 = 0;
    let mut acked: Option<u64> = None;

    let start = fraction(plan.offset, plan.total);
    let mut reported = start;
    on_progress(Progress {
        fraction: start,
        received: plan.offset,
        total: plan.total,
    });

    while received < remaining {
        let n = match time::timeout(plan.read_timeout, stream.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_) => return Err(DccError::Interrupted(plan.read_timeout)),
        };
        if n == 0 {
            return Err(DccError::Closed {
                received: plan.offset + received,
                expected: plan.total,
            });
        }
        received += n as u64;
        if received > remaining {
            return Err(DccError::Overflow {
                received: plan.offset + received,
                expected: plan.total,
            });
        }
        buffer.extend_from_slice(&chunk[..n]);

        while buffer.len() >= packet_size {
            sink.write_all(&buffer[..packet_size]).await?;
            buffer.drain(..packet_size);
            written += packet_size as u64;
            acknowledge(stream, written).await?;
            acked = Some(written);
        }

        let current = fraction(plan.offset + received, plan.total);
        if received < remaining && current - reported >= plan.progress_step {
            reported = current;
            on_progress(Progress {
                fraction: current,
                received: plan.offset + received,
                total: plan.total,
            });
        }
    }

    sink.write_all(&buffer).await?;
    sink.flush().await?;
    written += buffer.len() as u64;
    if acked != Some(written) {
        acknowledge(stream, written).await?;
    }

    on_progress(Progress {
        fraction: 1.0,
        received: plan.total,
        total: plan.total,
    });
    Ok(written)
}

/// Acknowledgments are 32 bits wide and wrap for files past 4 GiB.
async fn acknowledge<S: AsyncWrite + Unpin>(stream: &mut S, written: u64) -> Result<(), DccError> {
    stream.write_all(&(written as u32).to_be_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn fraction(received: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (received as f64 / total as f64).min(1.0)
}
