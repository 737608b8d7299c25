//! Framed reads and writes over Tokio streams.
//!
//! A clean end of stream between frames is reported as
//! [`ClientError::ConnectionClosed`]; running out of bytes inside a frame is
//! an I/O error.

use std::io;

use bytes::BytesMut;
use hoststream_proto::{
    DataStream, DataStreamHeader,
    dss::{DSS_HEADER_LEN, DssSegment},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ClientError, Result};

/// Fill `buf`, distinguishing EOF before the first byte.
async fn read_prefix<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(ClientError::closed("peer closed the stream"));
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended inside a header").into());
        }
        filled += n;
    }
    Ok(())
}

/// Read one complete data stream.
pub async fn read_data_stream<R: AsyncRead + Unpin>(reader: &mut R, max_len: usize) -> Result<DataStream> {
    let mut header = [0u8; DataStreamHeader::SIZE];
    read_prefix(reader, &mut header).await?;
    let Some(length) = DataStream::peek_length(&header, max_len)? else {
        return Err(ClientError::closed("short header"));
    };

    let mut frame = BytesMut::zeroed(length);
    frame[..DataStreamHeader::SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[DataStreamHeader::SIZE..]).await?;
    let ds = DataStream::decode(frame.freeze(), max_len)?;
    tracing::trace!(server = %ds.server(), id = ds.request_id(), correlation = ds.correlation_id(), "read");
    Ok(ds)
}

/// Write one data stream and flush.
pub async fn write_data_stream<W: AsyncWrite + Unpin>(writer: &mut W, ds: &DataStream) -> Result<()> {
    writer.write_all(&ds.encode()).await?;
    writer.flush().await?;
    tracing::trace!(server = %ds.server(), id = ds.request_id(), correlation = ds.correlation_id(), "wrote");
    Ok(())
}

/// Read one DSS segment.
pub async fn read_dss<R: AsyncRead + Unpin>(reader: &mut R) -> Result<DssSegment> {
    let mut header = [0u8; DSS_HEADER_LEN];
    read_prefix(reader, &mut header).await?;
    let Some(length) = DssSegment::peek_length(&header)? else {
        return Err(ClientError::closed("short DSS header"));
    };

    let mut segment = vec![0u8; length];
    segment[..DSS_HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut segment[DSS_HEADER_LEN..]).await?;
    let (segment, _) = DssSegment::decode_prefix(&segment)?;
    Ok(segment)
}

/// Write one DSS segment and flush.
pub async fn write_dss<W: AsyncWrite + Unpin>(writer: &mut W, segment: &DssSegment) -> Result<()> {
    writer.write_all(&segment.encode()?).await?;
    writer.flush().await?;
    Ok(())
}
