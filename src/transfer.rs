//! Sentinel-terminated byte streams.
//!
//! A file travels on the same connection as chat lines: raw bytes followed by
//! [`SENTINEL`]. The receiver stops at the first full occurrence of the
//! sentinel, so a payload that itself contains `--file_sent` is cut short
//! there. That is a known limitation of the wire format, kept for
//! compatibility with existing peers.
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AppErr, AppResult};

pub const SENTINEL: &[u8] = b"--file_sent";

/// Read/scan window.
pub const CHUNK: usize = 2048;

/// Copies `src` to `dst` in [`CHUNK`]-sized reads, then writes the sentinel.
/// Returns the number of payload bytes.
pub async fn send_stream<R, W>(src: &mut R, dst: &mut W) -> AppResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 { break; }
        dst.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    dst.write_all(SENTINEL).await?;
    dst.flush().await?;
    Ok(total)
}

/// Copies bytes from `src` into `dst` until the sentinel has been read.
///
/// Only bytes up to and including the sentinel are consumed from `src`;
/// whatever follows stays buffered for the next line read. A trailing
/// partial match is held back until the next window settles it.
pub async fn receive_stream<R, W>(src: &mut R, dst: &mut W) -> AppResult<u64>
where
    R: AsyncBufRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut window = BytesMut::with_capacity(CHUNK + SENTINEL.len());
    let mut total = 0u64;
    loop {
        let buf = src.fill_buf().await?;
        if buf.is_empty() {
            return Err(AppErr::Closed);
        }
        let held = window.len();
        let take = buf.len().min(CHUNK);
        window.extend_from_slice(&buf[..take]);

        if let Some(pos) = find(&window, SENTINEL) {
            dst.write_all(&window[..pos]).await?;
            total += pos as u64;
            // the sentinel always ends inside the fresh bytes: `held` < SENTINEL.len()
            src.consume(pos + SENTINEL.len() - held);
            dst.flush().await?;
            return Ok(total);
        }

        src.consume(take);
        let keep = partial_suffix(&window, SENTINEL);
        let ready = window.len() - keep;
        dst.write_all(&window[..ready]).await?;
        total += ready as u64;
        window.advance(ready);
    }
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest proper suffix of `hay` that is a prefix of `needle`.
fn partial_suffix(hay: &[u8], needle: &[u8]) -> usize {
    let max = (needle.len() - 1).min(hay.len());
    (1..=max).rev().find(|&k| hay[hay.len() - k..] == needle[..k]).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn roundtrip_through(cap: usize, payload: &[u8], trailer: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut wire = Vec::new();
        send_stream(&mut &payload[..], &mut wire).await.unwrap();
        wire.extend_from_slice(trailer);

        let mut rd = BufReader::with_capacity(cap, &wire[..]);
        let mut out = Vec::new();
        let n = receive_stream(&mut rd, &mut out).await.unwrap();
        assert_eq!(n as usize, out.len());

        let mut rest = Vec::new();
        rd.read_to_end(&mut rest).await.unwrap();
        (out, rest)
    }

    #[tokio::test]
    async fn sentinel_split_across_small_reads() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        for cap in [1, 3, 7, 11, 64, 4096] {
            let (out, rest) = roundtrip_through(cap, &payload, b"").await;
            assert_eq!(out, payload, "capacity {cap}");
            assert!(rest.is_empty());
        }
    }

    #[tokio::test]
    async fn sentinel_prefix_inside_content_is_kept() {
        let payload = b"abc--file_sen--file_se-x--file_";
        let (out, _) = roundtrip_through(5, payload, b"").await;
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn bytes_after_sentinel_stay_readable() {
        let (out, rest) = roundtrip_through(16, b"data", b"hello\n").await;
        assert_eq!(out, b"data");
        assert_eq!(rest, b"hello\n");

        let mut rd = BufReader::new(&b"xy--file_sentnext line\n"[..]);
        let mut sink = Vec::<u8>::new();
        receive_stream(&mut rd, &mut sink).await.unwrap();
        let mut line = String::new();
        rd.read_line(&mut line).await.unwrap();
        assert_eq!(line, "next line\n");
    }

    #[tokio::test]
    async fn empty_payload() {
        let (out, _) = roundtrip_through(4, b"", b"").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn eof_before_sentinel_is_closed() {
        let mut rd = BufReader::new(&b"partial--file_se"[..]);
        let err = receive_stream(&mut rd, &mut Vec::<u8>::new()).await.unwrap_err();
        assert!(matches!(err, AppErr::Closed));
    }

    #[test]
    fn partial_suffix_lengths() {
        assert_eq!(partial_suffix(b"xx--file", SENTINEL), 6);
        assert_eq!(partial_suffix(b"xx-", SENTINEL), 1);
        assert_eq!(partial_suffix(b"xyz", SENTINEL), 0);
        assert_eq!(partial_suffix(b"", SENTINEL), 0);
    }
}
