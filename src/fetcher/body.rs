//! Size-capped body reading

use futures::{Stream, StreamExt};

/// Outcome of a capped read that did not complete
#[derive(Debug)]
pub enum CappedReadError<E> {
    /// More than `limit` bytes arrived; `retained` is how many were kept (`limit + 1`)
    LimitExceeded {
        /// Bytes retained before aborting
        retained: u64,
    },
    /// The underlying stream failed
    Stream(E),
}

/// Collect a chunked body, keeping at most `limit + 1` bytes
///
/// Works regardless of any declared `Content-Length`: the stream is polled
/// only until one byte past the ceiling has been seen, at which point the
/// read aborts and everything retained so far is dropped. Memory use is
/// bounded by `limit + 1` plus a single in-flight chunk.
pub async fn read_capped<S, B, E>(
    stream: S,
    limit: u64,
) -> std::result::Result<Vec<u8>, CappedReadError<E>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
{
    let hard_cap = limit.saturating_add(1);
    let mut body: Vec<u8> = Vec::new();
    let mut stream = std::pin::pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CappedReadError::Stream)?;
        let chunk = chunk.as_ref();

        let room = hard_cap - body.len() as u64;
        let take = (chunk.len() as u64).min(room) as usize;
        body.extend_from_slice(&chunk[..take]);

        if body.len() as u64 > limit {
            return Err(CappedReadError::LimitExceeded {
                retained: body.len() as u64,
            });
        }
    }

    Ok(body)
}
