//! Bounded output capture: a reader task drains stdout/stderr into a
//! broadcast channel, capped at a byte budget with a truncation flag
//! instead of an unbounded buffer — readers must keep draining so a child
//! can never block on a full pipe and defeat the deadline.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

pub const OUTPUT_CAP: usize = 1024 * 1024;

pub struct CapturedOutput {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

/// Spawns a task that continuously drains `reader` into a capped buffer.
/// The task keeps reading past the cap (discarding the tail) so the pipe
/// never backs up, then returns the captured prefix plus a truncation flag.
pub fn spawn_capture<R>(mut reader: R, cap: usize) -> JoinHandle<CapturedOutput>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut bytes = Vec::with_capacity(cap.min(64 * 1024));
        let mut truncated = false;
        let mut chunk = [0u8; 8192];

        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if bytes.len() < cap {
                        let take = (cap - bytes.len()).min(n);
                        bytes.extend_from_slice(&chunk[..take]);
                        if take < n {
                            truncated = true;
                        }
                    } else {
                        truncated = true;
                    }
                }
                Err(_) => break,
            }
        }

        CapturedOutput { bytes, truncated }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn under_cap_is_not_truncated() {
        let data = b"hello world".to_vec();
        let handle = spawn_capture(Cursor::new(data.clone()), OUTPUT_CAP);
        let captured = handle.await.unwrap();
        assert_eq!(captured.bytes, data);
        assert!(!captured.truncated);
    }

    #[tokio::test]
    async fn over_cap_discards_tail_and_sets_flag() {
        let data = vec![b'x'; 100];
        let handle = spawn_capture(Cursor::new(data), 10);
        let captured = handle.await.unwrap();
        assert_eq!(captured.bytes.len(), 10);
        assert!(captured.truncated);
    }
}
