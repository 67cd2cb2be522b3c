use std::io;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME};

/// The receiving end handle of the communication.
pub struct FeedReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FeedReceiver<R> {
    /// Creates a new `FeedReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Waits to receive a new message from the inner receiver and decodes
    /// it as `T`.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on
    /// transport failure, on a frame longer than [`MAX_FRAME`] or on a
    /// payload that is not valid JSON for `T`.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> io::Result<T> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = LenType::from_be_bytes(size_buf) as usize;

        if len > MAX_FRAME {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Received a frame of {len} bytes, the limit is {MAX_FRAME}"),
            ));
        }

        self.buf.resize(len, 0);
        self.rx.read_exact(&mut self.buf).await?;

        serde_json::from_slice(&self.buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
