//! Realtime change feed over the backend's Phoenix-channel websocket.
//!
//! One socket is opened per subscription. The channel is joined with a
//! `postgres_changes` filter on the owning user, and every row change is
//! forwarded to the subscriber as a [`ChangeEvent`]. Partition filtering is
//! left to the deed table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deedbook_core::constants::DEEDS_TABLE;
use deedbook_core::deeds::{ChangeEvent, ChangeFeedTrait, ChangeSubscription, Deed};
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::auth::SessionAuth;
use crate::error::{CloudError, Result};
use crate::types::{PhoenixMessage, PostgresChangesPayload, ReplyPayload};

const DEFAULT_HEARTBEAT_SECS: u64 = 25;
const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 10;
const JOIN_REF: &str = "1";

/// Change feed backed by the hosted realtime service.
#[derive(Debug, Clone)]
pub struct RealtimeFeed {
    socket_url: String,
    auth: Arc<SessionAuth>,
    heartbeat: Duration,
    join_timeout: Duration,
}

impl RealtimeFeed {
    pub fn new(base_url: &str, auth: Arc<SessionAuth>) -> Self {
        Self {
            socket_url: socket_url(base_url, auth.anon_key()),
            auth,
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            join_timeout: Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    async fn open(&self, channel: &str, user_id: &str) -> Result<ChangeSubscription> {
        let (ws_stream, _) = connect_async(self.socket_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let topic = format!("realtime:{}", channel);
        let access_token = self
            .auth
            .access_token()
            .unwrap_or_else(|| self.auth.anon_key().to_string());
        send(&mut write, &join_message(&topic, user_id, &access_token)).await?;

        timeout(self.join_timeout, await_join_reply(&mut read, &topic))
            .await
            .map_err(|_| CloudError::subscription(format!("Timed out joining {}", topic)))??;
        info!("Joined realtime channel {}", topic);

        let (subscription, events_tx, close_rx) = ChangeSubscription::channel();
        tokio::spawn(run_channel(
            write,
            read,
            topic,
            events_tx,
            close_rx,
            self.heartbeat,
        ));
        Ok(subscription)
    }
}

#[async_trait]
impl ChangeFeedTrait for RealtimeFeed {
    async fn subscribe(
        &self,
        channel: &str,
        user_id: &str,
    ) -> deedbook_core::Result<ChangeSubscription> {
        Ok(self.open(channel, user_id).await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run_channel<W, R>(
    mut write: W,
    mut read: R,
    topic: String,
    events_tx: mpsc::UnboundedSender<ChangeEvent>,
    mut close_rx: oneshot::Receiver<()>,
    heartbeat: Duration,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                debug!("Leaving realtime channel {}", topic);
                let leave = control_message(&topic, "phx_leave", next_ref);
                if let Err(e) = send(&mut write, &leave).await {
                    debug!("Failed to leave {}: {}", topic, e);
                }
                let _ = write.close().await;
                break;
            }
            _ = ticker.tick() => {
                let beat = control_message("phoenix", "heartbeat", next_ref);
                next_ref += 1;
                if let Err(e) = send(&mut write, &beat).await {
                    warn!("Realtime heartbeat failed on {}: {}", topic, e);
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let message = match serde_json::from_str::<PhoenixMessage>(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Unreadable realtime frame on {}: {}", topic, e);
                            continue;
                        }
                    };
                    if message.topic == topic && message.event == "phx_close" {
                        info!("Realtime channel {} closed by server", topic);
                        break;
                    }
                    match parse_change_message(&message) {
                        Ok(Some(event)) => {
                            debug!("{} {} on {}", event.kind(), event.deed_id(), topic);
                            if events_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Dropping malformed change on {}: {}", topic, e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Realtime socket for {} closed", topic);
                    break;
                }
                Some(Err(e)) => {
                    warn!("Realtime socket error on {}: {}", topic, e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn await_join_reply<R>(read: &mut R, topic: &str) -> Result<()>
where
    R: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(incoming) = read.next().await {
        let Message::Text(text) = incoming? else {
            continue;
        };
        let message: PhoenixMessage = serde_json::from_str(&text)?;
        if message.topic != topic
            || message.event != "phx_reply"
            || message.reference.as_deref() != Some(JOIN_REF)
        {
            continue;
        }
        let reply: ReplyPayload = serde_json::from_value(message.payload)?;
        if reply.status == "ok" {
            return Ok(());
        }
        return Err(CloudError::subscription(format!(
            "Join of {} refused: {}",
            topic, reply.response
        )));
    }
    Err(CloudError::subscription(format!(
        "Socket closed before {} was joined",
        topic
    )))
}

async fn send<W>(write: &mut W, message: &PhoenixMessage) -> Result<()>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    write.send(Message::Text(text)).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Websocket endpoint for a project URL.
pub(crate) fn socket_url(base_url: &str, anon_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        ws_base,
        urlencoding::encode(anon_key)
    )
}

pub(crate) fn join_message(topic: &str, user_id: &str, access_token: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": DEEDS_TABLE,
                    "filter": format!("user_id=eq.{}", user_id),
                }],
            },
            "access_token": access_token,
        }),
        reference: Some(JOIN_REF.to_string()),
        join_ref: Some(JOIN_REF.to_string()),
    }
}

fn control_message(topic: &str, event: &str, reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: event.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// Translates a socket message into a row change. Messages that are not row
/// changes yield `Ok(None)`.
pub(crate) fn parse_change_message(message: &PhoenixMessage) -> Result<Option<ChangeEvent>> {
    if message.event != "postgres_changes" {
        return Ok(None);
    }
    let payload: PostgresChangesPayload = serde_json::from_value(message.payload.clone())?;
    let change = payload.data;

    let event = match change.kind.as_str() {
        "INSERT" => ChangeEvent::Insert(record(change.record)?),
        "UPDATE" => ChangeEvent::Update(record(change.record)?),
        "DELETE" => {
            let id = change
                .old_record
                .as_ref()
                .and_then(|old| old.get("id"))
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| CloudError::subscription("DELETE change without an id"))?;
            ChangeEvent::Delete { id: id.to_string() }
        }
        other => {
            debug!("Ignoring {} change", other);
            return Ok(None);
        }
    };
    Ok(Some(event))
}

fn record(value: Option<Value>) -> Result<Deed> {
    let value = value.ok_or_else(|| CloudError::subscription("Change without a record"))?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deedbook_core::deeds::DeedNature;

    fn message(text: &str) -> PhoenixMessage {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_socket_url_switches_scheme() {
        assert_eq!(
            socket_url("https://xyz.example.co/", "k+y"),
            "wss://xyz.example.co/realtime/v1/websocket?apikey=k%2By&vsn=1.0.0"
        );
        assert!(socket_url("http://localhost:54321", "k").starts_with("ws://localhost:54321/"));
    }

    #[test]
    fn test_join_message_filters_on_owner() {
        let join = join_message("realtime:deeds-default", "u1", "jwt");
        let text = serde_json::to_value(&join).unwrap();
        assert_eq!(text["event"], "phx_join");
        assert_eq!(text["ref"], "1");
        let change = &text["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "deeds");
        assert_eq!(change["filter"], "user_id=eq.u1");
        assert_eq!(text["payload"]["access_token"], "jwt");
    }

    #[test]
    fn test_parse_insert() {
        let msg = message(
            r#"{
            "topic": "realtime:deeds-default",
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "type": "INSERT",
                    "table": "deeds",
                    "schema": "public",
                    "record": {
                        "id": "d1", "user_id": "u1", "table_type": null,
                        "deed_type": "Sale", "executed_by": "A", "in_favour_of": "B",
                        "date": "2024-01-02", "document_number": "12",
                        "nature_of_doc": "Xerox", "custom_fields": {"extent": "2 acres"}
                    },
                    "old_record": null
                }
            }
        }"#,
        );
        let Some(ChangeEvent::Insert(deed)) = parse_change_message(&msg).unwrap() else {
            panic!("expected an insert");
        };
        assert_eq!(deed.id, "d1");
        assert_eq!(deed.nature_of_doc, DeedNature::Xerox);
        assert_eq!(deed.custom_fields.get("extent"), Some("2 acres"));
    }

    #[test]
    fn test_parse_delete_uses_old_record_id() {
        let msg = message(
            r#"{
            "topic": "realtime:deeds-default",
            "event": "postgres_changes",
            "payload": { "data": { "type": "DELETE", "record": null, "old_record": { "id": "d9" } } }
        }"#,
        );
        assert_eq!(
            parse_change_message(&msg).unwrap(),
            Some(ChangeEvent::Delete {
                id: "d9".to_string()
            })
        );

        let missing = message(
            r#"{
            "topic": "t",
            "event": "postgres_changes",
            "payload": { "data": { "type": "DELETE", "old_record": {} } }
        }"#,
        );
        assert!(parse_change_message(&missing).is_err());
    }

    #[test]
    fn test_non_change_messages_are_skipped() {
        let reply = message(
            r#"{"topic":"phoenix","event":"phx_reply","ref":"2","payload":{"status":"ok","response":{}}}"#,
        );
        assert_eq!(parse_change_message(&reply).unwrap(), None);
    }
}
