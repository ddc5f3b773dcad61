//! Server-Sent Events stream of broadcast messages.
//!
//! The connection owns its `Subscription`; when the client goes away the
//! stream is dropped and the subscriber unregisters with it.
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use tracing::{debug, info};

use super::state::AppState;

pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, serde_json::Error>>> {
    let subscription = state.engine.subscribers().subscribe();
    info!("{} connected to event stream", subscription.id());

    let stream = stream::unfold(
        (subscription, state.shutdown.clone()),
        |(mut subscription, mut shutdown)| async move {
            if *shutdown.borrow() {
                return None;
            }
            let next = tokio::select! {
                message = subscription.recv() => message,
                _ = shutdown.changed() => None,
            };
            match next {
                Some(message) => {
                    let event =
                        serde_json::to_string(&message).map(|json| Event::default().data(json));
                    Some((event, (subscription, shutdown)))
                }
                None => {
                    debug!("Closing event stream for {}", subscription.id());
                    None
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}
