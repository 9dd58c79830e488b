use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::Result;

/// Upper bound for one frame. History replays are paged to stay well below it.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub type RpcNetwork = Framed<TcpStream, LengthDelimitedCodec>;

pub fn stream_to_rpc_network(stream: TcpStream) -> RpcNetwork {
    let _ = stream.set_nodelay(true);

    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();

    Framed::new(stream, codec)
}

pub async fn send_frame<T: Serialize>(network: &mut RpcNetwork, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    network.send(Bytes::from(bytes)).await?;
    Ok(())
}

/// Reads the next frame. `None` means the remote closed the stream cleanly.
pub async fn receive_frame<T: DeserializeOwned>(network: &mut RpcNetwork) -> Result<Option<T>> {
    match network.next().await {
        None => Ok(None),
        Some(frame) => Ok(Some(bincode::deserialize(&frame?)?)),
    }
}
