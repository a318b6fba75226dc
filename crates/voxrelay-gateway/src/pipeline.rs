//! The turn pipeline — the hard part.
//!
//! Orchestrates one POST from silence gate through streaming passthrough to
//! close: abort-then-debounce before ever touching the LLM, a contextual
//! buffer phrase with a timed keep-alive loop spanning the whole upstream
//! lifetime, and a smart-hold so the filler has time to finish before real
//! content starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voxrelay_catalog::{match_category, pick_initial, pick_keep_alive};
use voxrelay_core::SessionId;
use voxrelay_session::ArmOutcome;
use voxrelay_upstream::chunk_json;

use crate::app::AppState;

/// One request's parsed essentials.
pub struct IncomingTurn {
    pub session: SessionId,
    pub user_text: String,
    pub body: Value,
}

impl IncomingTurn {
    pub fn parse(body: Value) -> Self {
        let session = SessionId::from_request_user(body.get("user").and_then(Value::as_str));

        let user_text = body
            .get("messages")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .rev()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();

        Self {
            session,
            user_text,
            body,
        }
    }
}

/// VAD pings and near-empty transcripts never reach the LLM.
pub fn is_silent(text: &str) -> bool {
    text.is_empty() || text == "..." || text == "\u{2026}" || text.chars().count() < 3
}

/// Fingerprint from the last three messages' `(role, content[:200])`
/// tuples, used as the dedup cache key.
pub fn fingerprint(body: &Value) -> String {
    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    messages
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|m| {
            let role = m.get("role").and_then(Value::as_str).unwrap_or("");
            let content = m.get("content").and_then(Value::as_str).unwrap_or("");
            let truncated: String = content.chars().take(200).collect();
            format!("{role}:{truncated}")
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn single_space_then_done(id: &str) -> Vec<Event> {
    vec![
        Event::default().data(chunk_json(id, " ")),
        Event::default().data("[DONE]"),
    ]
}

/// Run the full pipeline for one incoming POST, yielding SSE events as they
/// become ready. Exactly one `[DONE]` is always the last event.
pub fn run_turn(
    state: Arc<AppState>,
    body: Value,
) -> impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>> {
    let id = format!("chatcmpl-{}", Uuid::new_v4());

    async_stream::stream! {
        let turn = IncomingTurn::parse(body);
        let session = turn.session.clone();

        // Step 2: silence gate.
        if is_silent(&turn.user_text) {
            debug!(session = %session, "silence gate: dropping turn");
            for event in single_space_then_done(&id) {
                yield Ok(event);
            }
            return;
        }

        // Step 3: log the user side of the turn now, before the debounce
        // outcome is known — a superseded, cancelled, or failed turn still
        // leaves its question in the log with no recorded answer. The
        // assistant side is appended separately once a reply exists (dedup
        // hit or normal finish).
        state.conversations.record_user(&session, &turn.user_text);
        let fp = fingerprint(&turn.body);

        // Step 4: abort any in-flight upstream fetch for this session.
        state.coordinator.abort_in_flight(&session);

        // Step 5: debounce. Supersede any pending timer, then arm a fresh
        // one; only the survivor proceeds.
        state.coordinator.supersede_pending(&session);
        let wait = Duration::from_millis(state.config.tuning.debounce_ms);
        let outcome = state.coordinator.arm_pending(&session, wait).await;
        if outcome == ArmOutcome::Superseded {
            debug!(session = %session, "debounce: superseded by a newer turn");
            for event in single_space_then_done(&id) {
                yield Ok(event);
            }
            return;
        }

        // Step 7: dedup check.
        if let Some(cached) = state.dedup.lookup(&fp) {
            debug!(session = %session, "dedup cache hit");
            yield Ok(Event::default().data(chunk_json(&id, &cached)));
            yield Ok(Event::default().data("[DONE]"));
            state.conversations.record_assistant(&session, &cached);
            return;
        }

        // Step 6: prepare the upstream body (model rewrite, hint suffix,
        // vendor field strip, forced stream=true).
        let upstream_body = state.upstream.prepare_body(turn.body.clone());

        // Step 9: buffer phrase, selected from the raw user text.
        let category = match_category(&turn.user_text);
        let buffer_phrase = pick_initial(category);
        yield Ok(Event::default().data(chunk_json(&id, buffer_phrase)));
        let buffer_emitted_at = Instant::now();
        let last_chunk_at = Arc::new(std::sync::Mutex::new(Instant::now()));

        // Step 11: fetch upstream, registering a fresh in-flight handle.
        let handle = state.coordinator.begin_in_flight(&session, turn.user_text.clone());
        let mut rx = state.upstream.stream(upstream_body, handle.cancel.clone());

        // Step 10: keep-alive timer spans the entire upstream lifetime,
        // including the wait for the first byte.
        let keepalive_last_chunk_at = last_chunk_at.clone();
        let keepalive_cancel = handle.cancel.clone();
        let (keepalive_tx, mut keepalive_rx) = mpsc::channel::<Event>(4);
        let keepalive_id = id.clone();
        let keepalive_interval = Duration::from_millis(state.config.tuning.keepalive_interval_ms);
        let keepalive_stale = Duration::from_millis(state.config.tuning.keepalive_stale_ms);
        tokio::spawn(async move {
            let mut counter: usize = 0;
            loop {
                tokio::select! {
                    _ = keepalive_cancel.cancelled() => break,
                    _ = tokio::time::sleep(keepalive_interval) => {
                        let stale = keepalive_last_chunk_at
                            .lock()
                            .unwrap()
                            .elapsed()
                            > keepalive_stale;
                        if stale {
                            let phrase = pick_keep_alive(category, counter);
                            counter += 1;
                            *keepalive_last_chunk_at.lock().unwrap() = Instant::now();
                            if keepalive_tx
                                .send(Event::default().data(chunk_json(&keepalive_id, phrase)))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                }
            }
        });

        let mut llm_content = String::new();
        let mut cancelled = false;
        let mut failure: Option<voxrelay_core::VoxRelayError> = None;
        let mut first_delta = true;

        loop {
            tokio::select! {
                biased;
                keepalive = keepalive_rx.recv() => {
                    match keepalive {
                        Some(event) => yield Ok(event),
                        None => {}
                    }
                }
                next = rx.recv() => {
                    match next {
                        None => break,
                        Some(Err(e)) => {
                            if handle.cancel.is_cancelled() {
                                cancelled = true;
                            } else {
                                warn!(session = %session, error = %e, "upstream fetch failed");
                                failure = Some(e);
                            }
                            break;
                        }
                        Some(Ok(chunk)) => {
                            if let Some(content) = &chunk.content {
                                // Step 12 smart hold: only on the first delta.
                                if first_delta {
                                    first_delta = false;
                                    let min_hold = Duration::from_millis(state.config.tuning.min_buffer_speech_ms);
                                    let elapsed = buffer_emitted_at.elapsed();
                                    if elapsed < min_hold {
                                        tokio::time::sleep(min_hold - elapsed).await;
                                    }
                                }
                                llm_content.push_str(content);
                            }
                            *last_chunk_at.lock().unwrap() = Instant::now();
                            yield Ok(Event::default().data(chunk.raw_payload));
                        }
                    }
                }
            }
        }

        handle.cancel.cancel(); // stop the keep-alive task if the stream ended on its own

        if let Some(err) = failure {
            // Step 14: non-cancellation failure — a single apologetic chunk.
            let _ = err;
            yield Ok(Event::default().data(chunk_json(&id, "Sorry, I couldn't reach the model just now. ")));
        } else if cancelled {
            debug!(session = %session, "upstream fetch was cancelled");
        } else {
            // Step 13: normal finish.
            state.dedup.store(fp, llm_content.clone());
            state.conversations.record_assistant(&session, &llm_content);
            info!(session = %session, reply_len = llm_content.len(), "turn completed");
        }

        state.coordinator.clear_in_flight_if_matches(&session, &handle);
        yield Ok(Event::default().data("[DONE]"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_silent_matches_length_and_ellipsis_thresholds() {
        assert!(is_silent(""));
        assert!(is_silent("..."));
        assert!(is_silent("\u{2026}"));
        assert!(is_silent("hi"));
        assert!(!is_silent("hello"));
    }

    #[test]
    fn parse_extracts_session_and_last_user_message() {
        let body = json!({
            "user": "caller-1",
            "messages": [
                { "role": "system", "content": "be terse" },
                { "role": "user", "content": "what time is it" },
                { "role": "assistant", "content": "ten past three" },
                { "role": "user", "content": "  and the weather?  " },
            ],
        });
        let turn = IncomingTurn::parse(body);
        assert_eq!(turn.session.as_str(), "caller-1");
        assert_eq!(turn.user_text, "and the weather?");
    }

    #[test]
    fn fingerprint_uses_last_three_messages_truncated() {
        let long = "x".repeat(250);
        let body = json!({
            "messages": [
                { "role": "user", "content": "one" },
                { "role": "assistant", "content": "two" },
                { "role": "user", "content": long },
            ],
        });
        let fp = fingerprint(&body);
        assert!(fp.contains("user:one"));
        assert!(fp.contains("assistant:two"));
        assert!(!fp.contains(&"x".repeat(201)));
    }

    #[test]
    fn fingerprint_is_stable_for_identical_bodies() {
        let body = json!({
            "messages": [{ "role": "user", "content": "repeat this" }],
        });
        assert_eq!(fingerprint(&body), fingerprint(&body));
    }
}
