//! Server-sent event reply stream
//!
//! `GET /chatbot/message/stream?message=..&userId=..` consumed as an event
//! stream. Each event's `data` follows the same frame policy as the chunked
//! body. A broken channel is terminal; there is no automatic reconnect.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::ACCEPT;

use super::{cancellable, ensure_success, Delivery, Outcome};
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
        .get(url)
        .query(&[("message", message), ("userId", identity.user_id.as_str())])
        .header(ACCEPT, "text/event-stream")
        .bearer_auth(&identity.token);
    let response = cancellable(&cancel, request.send()).await??;
    let response = ensure_success(response).await?;

    let mut events = Box::pin(response.bytes_stream().eventsource());

    while let Some(event) = cancellable(&cancel, events.next()).await? {
        let event = event.map_err(|e| ChatError::Stream(e.to_string()))?;
        if let Some(outcome) = delivery.apply_data(&event.data) {
            return outcome;
        }
    }

    Err(ChatError::Incomplete)
}
