//! Sequential block upload: one `Content-Range` request per block, in order.

use pulley_events::TaskId;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::callbacks::CallbackDispatcher;
use crate::events::{TransportEvent, TransportOutcome};
use crate::session::{UnitPlan, forward_response, request_for};

/// Upload the unit's body in blocks of at most `block_size` bytes.
///
/// A non-2xx answer to any block ends the unit with that response. The final block's
/// response decides the outcome; an empty file is sent as a single empty request.
pub(crate) async fn upload(
    dispatcher: &CallbackDispatcher,
    client: &Client,
    plan: &UnitPlan,
    block_size: u64,
    token: &CancellationToken,
) -> TransportOutcome {
    let mut file = match File::open(&plan.request.body.path).await {
        Ok(file) => file,
        Err(err) => return TransportOutcome::from_error(&err),
    };
    let total = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(err) => return TransportOutcome::from_error(&err),
    };
    let block_size = block_size.max(1);
    let task_id = &plan.task_id;
    send_progress(dispatcher, task_id, 0, total);

    let mut offset = 0_u64;
    loop {
        if token.is_cancelled() {
            return TransportOutcome::Canceled;
        }

        let length = block_size.min(total - offset);
        let Ok(capacity) = usize::try_from(length) else {
            return TransportOutcome::Error {
                message: format!("block of {length} bytes exceeds addressable memory"),
                details: Vec::new(),
            };
        };
        let mut block = vec![0_u8; capacity];
        if let Err(err) = file.read_exact(&mut block).await {
            return TransportOutcome::from_error(&err);
        }

        let end = offset + length;
        let mut request = request_for(client, plan).header(CONTENT_LENGTH, length);
        if total > 0 {
            request = request.header(CONTENT_RANGE, format!("bytes {offset}-{}/{total}", end - 1));
        }
        let response = match request.body(block).send().await {
            Ok(response) => response,
            Err(err) => return TransportOutcome::from_error(&err),
        };

        let accepted = response.status().is_success();
        let last = end >= total;
        if !accepted || last {
            if accepted {
                send_progress(dispatcher, task_id, end, total);
            }
            return forward_response(dispatcher, task_id, response).await;
        }

        debug!(task_id = %task_id, offset = end, total, "block acknowledged");
        send_progress(dispatcher, task_id, end, total);
        offset = end;
    }
}

fn send_progress(dispatcher: &CallbackDispatcher, task_id: &TaskId, sent: u64, expected: u64) {
    dispatcher.send(TransportEvent::BytesSent {
        task_id: task_id.clone(),
        sent,
        expected,
    });
}
