//! Optional zlib compression layer negotiated via `CLIENT_COMPRESS`.
//!
//! Wraps the uncompressed packet stream in a second framing layer with its
//! own, independently-incrementing sequence numbers:
//!
//! ```text
//! 3   compressed payload length
//! 1   compression sequence id
//! 3   uncompressed payload length (0 means "stored uncompressed")
//! n   payload (zlib-compressed, or raw when uncompressed length is 0)
//! ```
//!
//! Grounded on the teacher's packet-framing style in `tokio/conn.rs`
//! (`read_payload`/`write_payload`); the zlib codec itself is `flate2`,
//! the crate already declared for the `compression` feature.

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Below this size, compressing a packet costs more than it saves, so the
/// frame is sent with `uncompressed_length = 0` instead.
const MIN_COMPRESS_LENGTH: usize = 50;

#[derive(Debug)]
pub struct Compressor {
    sequence_id: u8,
}

impl Compressor {
    pub fn new() -> Self {
        Self { sequence_id: 0 }
    }

    /// Reads one compressed frame and returns the *standard* MySQL packet's
    /// payload, header stripped, along with that inner packet's sequence id.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
        out: &mut Vec<u8>,
    ) -> Result<u8> {
        let mut header = [0u8; 7];
        reader.read_exact(&mut header).await?;
        let compressed_len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let uncompressed_len = u32::from_le_bytes([header[4], header[5], header[6], 0]) as usize;

        let mut compressed = vec![0u8; compressed_len];
        reader.read_exact(&mut compressed).await?;

        let mut inner = Vec::new();
        if uncompressed_len == 0 {
            inner = compressed;
        } else {
            let mut decoder = ZlibDecoder::new(&compressed[..]);
            decoder.read_to_end(&mut inner).map_err(Error::IoError)?;
        }

        if inner.len() < 4 {
            return Err(Error::InvalidPacket);
        }
        let payload_len = u32::from_le_bytes([inner[0], inner[1], inner[2], 0]) as usize;
        let inner_sequence_id = inner[3];
        if inner.len() != 4 + payload_len {
            return Err(Error::InvalidPacket);
        }

        out.clear();
        out.extend_from_slice(&inner[4..]);
        Ok(inner_sequence_id)
    }

    /// Wraps `payload` in a standard MySQL packet header using
    /// `inner_sequence_id`, then compresses that whole standard packet into
    /// one compressed frame (or stores it uncompressed below the size floor).
    pub async fn write_frame<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        inner_sequence_id: u8,
        payload: &[u8],
    ) -> Result<u8> {
        let mut inner_packet = Vec::with_capacity(4 + payload.len());
        let len = (payload.len() as u32).to_le_bytes();
        inner_packet.extend_from_slice(&[len[0], len[1], len[2], inner_sequence_id]);
        inner_packet.extend_from_slice(payload);

        let mut frame = Vec::with_capacity(7 + inner_packet.len());
        if inner_packet.len() < MIN_COMPRESS_LENGTH {
            write_header(&mut frame, inner_packet.len(), self.sequence_id, 0);
            frame.extend_from_slice(&inner_packet);
        } else {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&inner_packet).map_err(Error::IoError)?;
            let compressed = encoder.finish().map_err(Error::IoError)?;
            write_header(&mut frame, compressed.len(), self.sequence_id, inner_packet.len());
            frame.extend_from_slice(&compressed);
        }

        writer.write_all(&frame).await?;
        writer.flush().await?;
        let seq = self.sequence_id;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        Ok(seq)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

fn write_header(out: &mut Vec<u8>, compressed_len: usize, sequence_id: u8, uncompressed_len: usize) {
    let c = (compressed_len as u32).to_le_bytes();
    let u = (uncompressed_len as u32).to_le_bytes();
    out.extend_from_slice(&[c[0], c[1], c[2], sequence_id, u[0], u[1], u[2]]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_small_uncompressed_frame() {
        let mut buf = Vec::new();
        let mut writer = Compressor::new();
        writer.write_frame(&mut buf, 0, b"hi").await.unwrap();

        let mut reader = Compressor::new();
        let mut out = Vec::new();
        reader.read_frame(&mut buf.as_slice(), &mut out).await.unwrap();
        assert_eq!(out, b"hi");
    }

    #[tokio::test]
    async fn round_trips_large_compressed_frame() {
        let payload = vec![b'x'; 4096];
        let mut buf = Vec::new();
        let mut writer = Compressor::new();
        writer.write_frame(&mut buf, 0, &payload).await.unwrap();
        assert!(buf.len() < payload.len());

        let mut reader = Compressor::new();
        let mut out = Vec::new();
        reader.read_frame(&mut buf.as_slice(), &mut out).await.unwrap();
        assert_eq!(out, payload);
    }
}
