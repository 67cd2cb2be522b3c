//! The panel side of the live feed protocol.

use std::{io, net::SocketAddr};

use comms::{
    FeedReceiver,
    msg::{FeedMsg, Subscribe},
};
use log::{debug, warn};
use tokio::{io::AsyncRead, net::TcpStream, sync::mpsc};

use crate::session::MonitorEvent;

/// Connects the live feed for one job and pumps messages until the channel
/// dies. A clean server close and a transport error end the same way, with
/// one final [`MonitorEvent::FeedClosed`].
///
/// Reconnection is not this task's business. The monitor arms a new task
/// when the next status report still says the job is running.
pub(crate) async fn run(addr: SocketAddr, job_id: String, events: mpsc::UnboundedSender<MonitorEvent>) {
    match connect(addr, &job_id).await {
        Ok(rx) => pump(rx, &events).await,
        Err(e) => debug!(job_id = job_id.as_str(); "live feed connect to {addr} failed: {e}"),
    }

    let _ = events.send(MonitorEvent::FeedClosed);
}

async fn connect(
    addr: SocketAddr,
    job_id: &str,
) -> io::Result<FeedReceiver<tokio::net::tcp::OwnedReadHalf>> {
    let stream = TcpStream::connect(addr).await?;
    let (rx, tx) = stream.into_split();
    let (rx, mut tx) = comms::channel(rx, tx);

    // The one and only frame the panel ever sends on this channel.
    tx.send(&Subscribe {
        job_id: job_id.to_owned(),
    })
    .await?;

    Ok(rx)
}

/// Decodes feed frames into monitor events until EOF or a broken frame.
pub(crate) async fn pump<R>(mut rx: FeedReceiver<R>, events: &mpsc::UnboundedSender<MonitorEvent>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let msg = match rx.recv::<FeedMsg>().await {
            Ok(msg) => msg,
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    warn!("live feed dropped: {e}");
                }
                return;
            }
        };

        let event = match msg {
            FeedMsg::Log { message } => MonitorEvent::FeedLine(message),
            FeedMsg::Progress { data } => MonitorEvent::FeedProgress(data),
            FeedMsg::Connected => MonitorEvent::FeedConnected,
            FeedMsg::Heartbeat => MonitorEvent::FeedHeartbeat,
        };
        if events.send(event).is_err() {
            return;
        }
    }
}
