//! The implementation of the sending end of the application layer protocol.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType};

/// The sending end handle of the communication.
pub struct FeedSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FeedSender<W> {
    /// Creates a new `FeedSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` through the inner sender as one length prefixed frame.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> io::Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        buf.resize(LEN_TYPE_SIZE, 0);

        serde_json::to_writer(&mut *buf, msg)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let len = buf.len() - LEN_TYPE_SIZE;
        let header = (len as LenType).to_be_bytes();
        buf[..header.len()].copy_from_slice(&header);

        tx.write_all(buf).await?;
        tx.flush().await
    }
}
