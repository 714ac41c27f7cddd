//! Reassembly of chunked retrieval streams into one contiguous buffer.

use futures::{Stream, StreamExt};

/// Drain `stream` and concatenate its chunks in arrival order.
///
/// The output length is the sum of the chunk lengths, computed once the
/// stream is exhausted. The first error aborts reassembly; chunks already
/// received are dropped with it.
pub async fn reassemble<S, C, E>(stream: S) -> Result<Vec<u8>, E>
where
    S: Stream<Item = Result<C, E>>,
    C: AsRef<[u8]>,
{
    futures::pin_mut!(stream);

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk?);
    }

    let total_length = chunks.iter().map(|chunk| chunk.as_ref().len()).sum();
    let mut buffer = Vec::with_capacity(total_length);
    for chunk in &chunks {
        buffer.extend_from_slice(chunk.as_ref());
    }
    Ok(buffer)
}
