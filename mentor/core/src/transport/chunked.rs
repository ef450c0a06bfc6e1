//! Chunked HTTP reply stream
//!
//! `POST /chatbot/message/stream` with the chat request as JSON; the body is
//! read chunk by chunk and split into frames by [`FrameDecoder`].

use futures::StreamExt;

use super::frame::FrameDecoder;
use super::{cancellable, ensure_success, ChatRequest, Delivery, Outcome};
use crate::backend::ChatError;
use crate::identity::Identity;

pub(super) async fn stream(
    client: &reqwest::Client,
    url: &str,
    identity: &Identity,
    message: &str,
    delivery: &mut Delivery<'_>,
) -> Outcome {
    let cancel = delivery.cancel_token();

    let request = client
        .post(url)
        .bearer_auth(&identity.token)
        .json(&ChatRequest::new(identity, message));
    let response = cancellable(&cancel, request.send()).await??;
    let response = ensure_success(response).await?;

    let mut body = Box::pin(response.bytes_stream());
    let mut decoder = FrameDecoder::new();

    while let Some(chunk) = cancellable(&cancel, body.next()).await? {
        let bytes = chunk.map_err(|e| ChatError::Stream(e.to_string()))?;
        for frame in decoder.push(&bytes) {
            if let Some(outcome) = delivery.apply_frame(&frame) {
                return outcome;
            }
        }
    }

    // The last frame may lack its trailing blank line
    if let Some(frame) = decoder.finish() {
        if let Some(outcome) = delivery.apply_frame(&frame) {
            return outcome;
        }
    }

    Err(ChatError::Incomplete)
}
