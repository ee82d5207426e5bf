//! Reply generation: assistant threads with per-sender memory, or stateless
//! chat completions when no assistant is configured.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::clients::{OpenAiClient, Run, RunStatus};
use crate::error::{ConversationError, OpenAiError, StoreError};
use crate::store::ConversationHandle;
use crate::web::AppState;

/// Sent when the backend produced no usable answer.
pub const FALLBACK_REPLY: &str = "Sorry, I could not generate a reply.";

/// Produce the reply to `text` from `sender`.
///
/// Backend failures degrade to [`FALLBACK_REPLY`]. Only conversation store
/// failures are returned as errors.
pub async fn generate_reply(state: &AppState, sender: &str, text: &str) -> Result<String, StoreError> {
    let result = match state.config.assistant_id.as_deref() {
        Some(assistant_id) => thread_reply(state, assistant_id, sender, text).await,
        None => state
            .openai
            .chat_completion(text)
            .await
            .map_err(ConversationError::from),
    };

    match result {
        Ok(Some(reply)) if !reply.trim().is_empty() => Ok(reply),
        Ok(_) => {
            warn!(sender = %sender, "relay_reply_empty");
            Ok(FALLBACK_REPLY.to_string())
        }
        Err(ConversationError::Backend(e)) => {
            warn!(sender = %sender, error = %e, "relay_reply_failed");
            Ok(FALLBACK_REPLY.to_string())
        }
        Err(ConversationError::Store(e)) => Err(e),
    }
}

async fn thread_reply(
    state: &AppState,
    assistant_id: &str,
    sender: &str,
    text: &str,
) -> Result<Option<String>, ConversationError> {
    let handle = resolve_handle(state, sender).await?;

    let handle = match state.openai.add_user_message(handle.as_str(), text).await {
        Ok(()) => handle,
        Err(e) if e.is_not_found() => {
            // The backend dropped the thread; start over on a fresh one.
            warn!(sender = %sender, thread_id = %handle, "relay_thread_missing");
            let fresh = ConversationHandle::new(state.openai.create_thread().await?);
            state.conversations.update(sender, fresh.clone()).await?;
            state.openai.add_user_message(fresh.as_str(), text).await?;
            fresh
        }
        Err(e) => return Err(e.into()),
    };

    let run = state.openai.create_run(handle.as_str(), assistant_id).await?;
    let run = wait_for_run(
        &state.openai,
        handle.as_str(),
        run,
        state.config.run_poll_interval(),
        state.config.run_timeout(),
    )
    .await?;

    if run.status != RunStatus::Completed {
        return Err(OpenAiError::RunEnded {
            run_id: run.id,
            status: run.status.as_str().to_string(),
        }
        .into());
    }

    Ok(state
        .openai
        .latest_assistant_reply(handle.as_str(), &run.id)
        .await?)
}

/// Look up the sender's thread, creating one on first contact.
///
/// Two first messages racing each other may both create a thread; the store
/// keeps whichever was inserted first and the other thread is abandoned.
async fn resolve_handle(state: &AppState, sender: &str) -> Result<ConversationHandle, ConversationError> {
    if let Some(handle) = state.conversations.get(sender).await? {
        debug!(sender = %sender, thread_id = %handle, "relay_thread_reused");
        return Ok(handle);
    }

    let created = ConversationHandle::new(state.openai.create_thread().await?);
    let assigned = state
        .conversations
        .get_or_insert(sender, created.clone())
        .await?;

    if assigned == created {
        info!(sender = %sender, thread_id = %assigned, "relay_thread_assigned");
    } else {
        warn!(
            sender = %sender,
            thread_id = %assigned,
            abandoned_thread_id = %created,
            "relay_thread_race_lost"
        );
    }

    Ok(assigned)
}

/// Poll a run until it reaches a final status or `timeout` elapses.
///
/// Runs that time out or stop in `requires_action` are cancelled so the
/// thread accepts new messages.
pub async fn wait_for_run(
    openai: &OpenAiClient,
    thread_id: &str,
    mut run: Run,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Run, OpenAiError> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut polls: u32 = 0;

    loop {
        if run.status.is_final() {
            if run.status == RunStatus::RequiresAction {
                cancel_quietly(openai, thread_id, &run.id).await;
            }

            info!(
                thread_id = %thread_id,
                run_id = %run.id,
                status = run.status.as_str(),
                polls = polls,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "openai_run_finished"
            );
            return Ok(run);
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                thread_id = %thread_id,
                run_id = %run.id,
                status = run.status.as_str(),
                polls = polls,
                timeout_ms = timeout.as_millis() as u64,
                "openai_run_timeout"
            );
            cancel_quietly(openai, thread_id, &run.id).await;

            return Err(OpenAiError::RunTimeout {
                run_id: run.id,
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }

        sleep(poll_interval.min(deadline - now)).await;
        run = openai.retrieve_run(thread_id, &run.id).await?;
        polls += 1;
    }
}

async fn cancel_quietly(openai: &OpenAiClient, thread_id: &str, run_id: &str) {
    if let Err(e) = openai.cancel_run(thread_id, run_id).await {
        warn!(thread_id = %thread_id, run_id = %run_id, error = %e, "openai_run_cancel_failed");
    }
}
