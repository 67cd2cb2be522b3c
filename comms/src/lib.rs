pub mod msg;
mod receiver;
mod sender;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use receiver::FeedReceiver;
pub use sender::FeedSender;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Upper bound on a single frame payload. Anything larger is treated as a
/// corrupt stream rather than an allocation request.
pub const MAX_FRAME: usize = 1 << 20;

/// Creates both `FeedReceiver` and `FeedSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a feed receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (FeedReceiver<R>, FeedSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FeedReceiver::new(rx), FeedSender::new(tx))
}
