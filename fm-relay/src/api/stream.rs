//! Listener endpoint: the live MP3 stream

use crate::api::server::AppContext;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::convert::Infallible;
use tracing::debug;

/// GET / and GET /stream
///
/// Registers a bus subscriber for the lifetime of the response body. The
/// client hears whatever is published from now on; when it disconnects the
/// body is dropped and so is the subscription.
pub async fn listen(State(ctx): State<AppContext>) -> Response {
    let subscription = ctx.engine.bus().subscribe();
    debug!("Streaming to listener {}", subscription.id());

    let body = Body::from_stream(subscription.map(Ok::<_, Infallible>));

    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}
