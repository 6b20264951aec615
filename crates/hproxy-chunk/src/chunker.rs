use std::io::{BufReader, Read};

use tokio::io::{AsyncRead, AsyncReadExt, BufReader as AsyncBufReader};

use crate::error::ChunkResult;
use crate::rollsum::RollSum;

/// Chunk boundaries never appear before this many accumulated bytes.
pub const MIN_CHUNK_SIZE: usize = 32_768;
/// Minimum number of low-order one-bits the rolling sum must show at a
/// candidate boundary for it to be accepted.
pub const MIN_BITS: u32 = 18;

/// Splits `reader` into content-defined chunks, calling `sink` once per
/// chunk with exactly that chunk's bytes.
///
/// Mirrors `split.go`'s `SplitFun`: the final call to `sink` happens on
/// EOF and may carry an empty slice if EOF was reached with no
/// accumulated bytes (i.e. the input was empty).
pub fn split<R: Read>(reader: R, mut sink: impl FnMut(&[u8]) -> std::io::Result<()>) -> ChunkResult<()> {
    let mut reader = BufReader::new(reader);
    let mut rs = RollSum::new();
    let mut chunk: Vec<u8> = Vec::new();

    loop {
        chunk.clear();
        let mut eof = false;
        loop {
            if chunk.len() >= MIN_CHUNK_SIZE && rs.on_split() && rs.bits() >= MIN_BITS {
                break;
            }
            let mut byte = [0u8; 1];
            match reader.read(&mut byte)? {
                0 => {
                    eof = true;
                    break;
                }
                _ => {
                    rs.roll(byte[0]);
                    chunk.push(byte[0]);
                }
            }
        }
        sink(&chunk)?;
        if eof {
            return Ok(());
        }
    }
}

/// Async sibling of [`split`] for sources that only expose `AsyncRead`
/// (e.g. a live HTTP response body). Reads one byte at a time, same as
/// the synchronous path over a `BufReader`.
pub async fn split_async<R, S, Fut>(reader: R, mut sink: S) -> ChunkResult<()>
where
    R: AsyncRead + Unpin,
    S: FnMut(Vec<u8>) -> Fut,
    Fut: std::future::Future<Output = std::io::Result<()>>,
{
    let mut reader = AsyncBufReader::new(reader);
    let mut rs = RollSum::new();
    let mut chunk: Vec<u8> = Vec::new();

    loop {
        chunk.clear();
        let mut eof = false;
        loop {
            if chunk.len() >= MIN_CHUNK_SIZE && rs.on_split() && rs.bits() >= MIN_BITS {
                break;
            }
            let mut byte = [0u8; 1];
            match reader.read(&mut byte).await? {
                0 => {
                    eof = true;
                    break;
                }
                _ => {
                    rs.roll(byte[0]);
                    chunk.push(byte[0]);
                }
            }
        }
        sink(std::mem::take(&mut chunk)).await?;
        if eof {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_one_empty_chunk() {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        split(&b""[..], |c| {
            chunks.push(c.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(chunks, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn small_input_below_min_chunk_size_is_one_chunk() {
        let data = vec![7u8; 1024];
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        split(&data[..], |c| {
            chunks.push(c.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], data);
    }

    #[test]
    fn chunks_concatenate_to_original_input() {
        let mut data = Vec::new();
        for i in 0..500_000u32 {
            data.push((i % 251) as u8);
        }
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        split(&data[..], |c| {
            chunks.push(c.to_vec());
            Ok(())
        })
        .unwrap();

        assert!(chunks.len() > 1, "large varied input should split into multiple chunks");
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.len() >= MIN_CHUNK_SIZE);
        }
        let reassembled: Vec<u8> = chunks.concat();
        assert_eq!(reassembled, data);
    }

    #[test]
    fn identical_content_produces_identical_boundaries() {
        let data = {
            let mut v = Vec::new();
            for i in 0..200_000u32 {
                v.push((i.wrapping_mul(2654435761) % 256) as u8);
            }
            v
        };

        let run = |d: &[u8]| {
            let mut lens = Vec::new();
            split(d, |c| {
                lens.push(c.len());
                Ok(())
            })
            .unwrap();
            lens
        };

        assert_eq!(run(&data), run(&data));
    }

    #[tokio::test]
    async fn async_split_matches_sync_split_on_lengths() {
        let mut data = Vec::new();
        for i in 0..300_000u32 {
            data.push((i % 199) as u8);
        }

        let mut sync_lens = Vec::new();
        split(&data[..], |c| {
            sync_lens.push(c.len());
            Ok(())
        })
        .unwrap();

        let async_lens = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let lens_clone = async_lens.clone();
        split_async(std::io::Cursor::new(data.clone()), move |c: Vec<u8>| {
            let lens_clone = lens_clone.clone();
            async move {
                lens_clone.lock().await.push(c.len());
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(sync_lens, *async_lens.lock().await);
    }
}
