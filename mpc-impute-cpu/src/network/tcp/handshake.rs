//! Link rendezvous. The dialing side announces the link name and its own
//! identity; the listening side answers `2ok` only for a link it expects.

use crate::execution::player::Identity;
use eyre::{bail, eyre, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HANDSHAKE_OK: &[u8] = b"2ok";
const MAX_FIELD_LEN: u32 = 1024;

async fn write_field<T: AsyncWrite + Unpin>(stream: &mut T, field: &str) -> Result<()> {
    stream.write_u32(field.len() as u32).await?;
    stream.write_all(field.as_bytes()).await?;
    Ok(())
}

async fn read_field<T: AsyncRead + Unpin>(stream: &mut T) -> Result<String> {
    let len = stream.read_u32().await?;
    if len > MAX_FIELD_LEN {
        bail!("handshake field of {len} bytes exceeds {MAX_FIELD_LEN}");
    }
    let mut bytes = vec![0u8; len as usize];
    stream.read_exact(&mut bytes).await?;
    String::from_utf8(bytes).map_err(|e| eyre!("handshake field is not UTF-8: {e:?}"))
}

pub async fn outbound<T: AsyncWrite + Unpin>(
    stream: &mut T,
    link_name: &str,
    own_id: &Identity,
) -> Result<()> {
    write_field(stream, link_name)
        .await
        .map_err(|e| eyre!("Failed to write link name during handshake: {e:?}"))?;
    write_field(stream, &own_id.0)
        .await
        .map_err(|e| eyre!("Failed to write own id during handshake: {e:?}"))?;
    stream.flush().await?;
    Ok(())
}

pub async fn inbound<T: AsyncRead + Unpin>(stream: &mut T) -> Result<(String, Identity)> {
    let link_name = read_field(stream)
        .await
        .map_err(|e| eyre!("Failed to read link name: {e:?}"))?;
    let peer_id = read_field(stream)
        .await
        .map_err(|e| eyre!("Failed to read peer id: {e:?}"))?;
    Ok((link_name, Identity(peer_id)))
}

pub async fn outbound_ok<T: AsyncRead + Unpin>(stream: &mut T) -> Result<()> {
    let mut rsp = [0; 3];
    stream.read_exact(&mut rsp).await?;
    if rsp != HANDSHAKE_OK {
        Err(eyre!("handshake not accepted: rsp={:?}", rsp))
    } else {
        Ok(())
    }
}

pub async fn inbound_ok<T: AsyncWrite + Unpin>(stream: &mut T) -> Result<()> {
    stream.write_all(HANDSHAKE_OK).await?;
    stream.flush().await?;
    Ok(())
}
