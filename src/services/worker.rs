use {
    super::consumer::{Disposition, PullHandler, PushHandler},
    crate::domain::broker::{PullSource, PushSource},
    std::time::Duration,
    tokio::sync::watch,
};

/// Pause after an empty fetch or a failed fetch.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(500);

/// Drive a push subscription until shutdown or until the broker closes it.
pub async fn run_push_consumer<S: PushSource>(
    durable: String,
    handler: PushHandler,
    mut source: S,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(durable = %durable, "push consumer started");

    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!(durable = %durable, "push consumer shutting down");
                return;
            }
            next = source.next() => next,
        };

        match next {
            None => {
                tracing::warn!(durable = %durable, "push subscription closed");
                return;
            }
            Some(Err(e)) => {
                tracing::error!(durable = %durable, error = %e, "push receive error");
            }
            Some(Ok(msg)) => match handler.handle(&msg).await {
                Disposition::Acked => tracing::debug!(durable = %durable, "activity log stored"),
                other => tracing::debug!(durable = %durable, disposition = ?other, "message settled"),
            },
        }
    }
}

/// Fetch, process and acknowledge one group at a time until shutdown.
pub async fn run_pull_consumer<S: PullSource>(
    durable: String,
    handler: PullHandler,
    mut source: S,
    fetch_size: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(durable = %durable, fetch_size, "pull consumer started");

    loop {
        let fetched = tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!(durable = %durable, "pull consumer shutting down");
                return;
            }
            fetched = source.fetch(fetch_size) => fetched,
        };

        let msgs = match fetched {
            Ok(msgs) if !msgs.is_empty() => msgs,
            Ok(_) => {
                if idle(&mut shutdown).await {
                    return;
                }
                continue;
            }
            Err(e) => {
                tracing::error!(durable = %durable, error = %e, "fetch failed");
                if idle(&mut shutdown).await {
                    return;
                }
                continue;
            }
        };

        match handler.process_cycle(&msgs).await {
            Ok(report) if report.ack_failed > 0 => tracing::warn!(
                durable = %durable,
                fetched = report.fetched,
                inserted = report.inserted,
                skipped = report.skipped,
                ack_failed = report.ack_failed,
                "fetch cycle processed, some acks failed and will be redelivered"
            ),
            Ok(report) => tracing::info!(
                durable = %durable,
                fetched = report.fetched,
                inserted = report.inserted,
                skipped = report.skipped,
                "fetch cycle processed"
            ),
            Err(e) => tracing::error!(
                durable = %durable,
                count = msgs.len(),
                error = %e,
                "messages process failed, left for redelivery"
            ),
        }
    }
}

/// Sleep for the idle backoff. Returns `true` if shutdown arrived meanwhile.
async fn idle(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(IDLE_BACKOFF) => false,
    }
}
