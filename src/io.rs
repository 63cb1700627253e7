//! Packet-level I/O: 16MB chunking, vectored writes, and the optional zlib
//! compression wrapper negotiated via `CLIENT_COMPRESS`.
//!
//! Grounded on the teacher's `tokio::conn::{read_payload, write_all_vectored_async,
//! write_handshake_payload}` — the chunking and vectored-write strategy is kept,
//! generalized to run on split read/write halves so the compression layer can wrap
//! just the write side without touching the reader.

use std::io::IoSlice;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::instrument;

use crate::compression::Compressor;
use crate::error::{Error, Result};

const MAX_PACKET_LEN: usize = 0xFF_FFFF;

fn packet_header(sequence_id: u8, payload_length: usize) -> [u8; 4] {
    let len = (payload_length as u32).to_le_bytes();
    [len[0], len[1], len[2], sequence_id]
}

/// Read a complete MySQL payload, concatenating packets across the 16MB chunk
/// boundary. Returns the sequence id of the *last* chunk read.
#[instrument(skip_all)]
pub async fn read_payload<R: AsyncBufRead + Unpin>(reader: &mut R, buffer: &mut Vec<u8>) -> Result<u8> {
    buffer.clear();

    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let mut length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut sequence_id = header[3];

    loop {
        let start = buffer.len();
        buffer.resize(start + length, 0);
        reader.read_exact(&mut buffer[start..]).await?;

        if length != MAX_PACKET_LEN {
            return Ok(sequence_id);
        }

        reader.read_exact(&mut header).await?;
        length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        sequence_id = header[3];
    }
}

/// Write `payload` as one or more MySQL packets, splitting on the 16MB boundary
/// and appending the empty trailer packet when the payload is an exact multiple
/// of it. `sequence_id` is the id of the first chunk and auto-increments.
#[instrument(skip_all)]
pub async fn write_payload<W: AsyncWrite + Unpin>(
    writer: &mut W,
    mut sequence_id: u8,
    payload: &[u8],
) -> Result<u8> {
    let mut headers: Vec<[u8; 4]> = Vec::new();
    let mut slices: Vec<IoSlice<'_>> = Vec::new();

    let mut remaining = payload;
    loop {
        let chunk_len = remaining.len().min(MAX_PACKET_LEN);
        headers.push(packet_header(sequence_id, chunk_len));
        sequence_id = sequence_id.wrapping_add(1);
        remaining = &remaining[chunk_len..];
        if chunk_len < MAX_PACKET_LEN {
            break;
        }
        // exactly MAX_PACKET_LEN: loop again, emitting an empty trailer packet
        // once `remaining` runs dry.
    }

    remaining = payload;
    for header in &headers {
        let chunk_len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        // SAFETY: `headers`/`remaining` outlive the vectored write below; the
        // slices never escape this function.
        slices.push(unsafe { std::mem::transmute::<IoSlice<'_>, IoSlice<'_>>(IoSlice::new(header)) });
        if chunk_len > 0 {
            let (chunk, rest) = remaining.split_at(chunk_len);
            remaining = rest;
            slices.push(unsafe { std::mem::transmute::<IoSlice<'_>, IoSlice<'_>>(IoSlice::new(chunk)) });
        }
    }

    write_all_vectored(writer, &mut slices).await?;
    writer.flush().await?;
    Ok(sequence_id)
}

async fn write_all_vectored<W: AsyncWrite + Unpin>(writer: &mut W, bufs: &mut [IoSlice<'_>]) -> Result<()> {
    let mut idx = 0;
    while idx < bufs.len() {
        let n = writer.write_vectored(&bufs[idx..]).await?;
        if n == 0 {
            return Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            )));
        }
        let mut remaining = n;
        while remaining > 0 {
            let buf_len = bufs[idx].len();
            if remaining >= buf_len {
                remaining -= buf_len;
                idx += 1;
            } else {
                bufs[idx].advance(remaining);
                remaining = 0;
            }
        }
    }
    Ok(())
}

/// Read a payload, transparently undoing zlib compression framing when `compressor`
/// is `Some`. `uncompressed_length == 0` means the payload was stored uncompressed.
pub async fn read_payload_compressed<R: AsyncRead + AsyncBufRead + Unpin>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    compressor: Option<&mut Compressor>,
) -> Result<u8> {
    match compressor {
        None => read_payload(reader, buffer).await,
        Some(compressor) => compressor.read_frame(reader, buffer).await,
    }
}

/// Write a payload, transparently applying zlib compression framing when
/// `compressor` is `Some`.
pub async fn write_payload_compressed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    sequence_id: u8,
    payload: &[u8],
    compressor: Option<&mut Compressor>,
) -> Result<u8> {
    match compressor {
        None => write_payload(writer, sequence_id, payload).await,
        Some(compressor) => compressor.write_frame(writer, sequence_id, payload).await,
    }
}
