//! Server-side framing.

use std::io;

use hoststream_proto::{
    DataStream, DataStreamHeader, ProtocolError,
    dss::{DSS_HEADER_LEN, DssSegment},
    header::DEFAULT_MAX_LENGTH,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

fn invalid(err: ProtocolError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Fill `buf`; `false` if the peer closed before the first byte.
async fn read_or_eof<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        filled += n;
    }
    Ok(true)
}

pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<DataStream>> {
    let mut header = [0u8; DataStreamHeader::SIZE];
    if !read_or_eof(reader, &mut header).await? {
        return Ok(None);
    }
    let length = DataStream::peek_length(&header, DEFAULT_MAX_LENGTH)
        .map_err(invalid)?
        .ok_or(io::ErrorKind::UnexpectedEof)?;
    let mut frame = vec![0u8; length];
    frame[..DataStreamHeader::SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[DataStreamHeader::SIZE..]).await?;
    DataStream::decode(frame.into(), DEFAULT_MAX_LENGTH).map(Some).map_err(invalid)
}

pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, ds: &DataStream) -> io::Result<()> {
    writer.write_all(&ds.encode()).await?;
    writer.flush().await
}

pub(crate) async fn read_segment<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<DssSegment>> {
    let mut header = [0u8; DSS_HEADER_LEN];
    if !read_or_eof(reader, &mut header).await? {
        return Ok(None);
    }
    let length = DssSegment::peek_length(&header).map_err(invalid)?.ok_or(io::ErrorKind::UnexpectedEof)?;
    let mut segment = vec![0u8; length];
    segment[..DSS_HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut segment[DSS_HEADER_LEN..]).await?;
    let (segment, _) = DssSegment::decode_prefix(&segment).map_err(invalid)?;
    Ok(Some(segment))
}

pub(crate) async fn write_segment<W: AsyncWrite + Unpin>(writer: &mut W, segment: &DssSegment) -> io::Result<()> {
    writer.write_all(&segment.encode().map_err(invalid)?).await?;
    writer.flush().await
}
