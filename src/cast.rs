//! Cast v2 transport: mDNS discovery plus a TLS control channel.
//!
//! Speaks just enough of the protocol to launch the default media receiver
//! and push image URLs at it: CONNECT/LAUNCH/LOAD with heartbeat replies.
//! Every socket carries bounded connect/read/write timeouts so a wedged
//! device cannot stall the availability or advance tasks.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde_json::Value;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use crate::link::{CastTransport, TransportError};

const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";
const DEFAULT_MEDIA_RECEIVER_APP_ID: &str = "CC1AD845";

const NAMESPACE_CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
const NAMESPACE_HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
const NAMESPACE_RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
const NAMESPACE_MEDIA: &str = "urn:x-cast:com.google.cast.media";

const SENDER_ID: &str = "sender-photocast";
const RECEIVER_ID: &str = "receiver-0";

const DISCOVERY_WINDOW: Duration = Duration::from_millis(1800);
const DISCOVERY_POLL: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
const READ_TIMEOUT: Duration = Duration::from_millis(250);
const WRITE_TIMEOUT: Duration = Duration::from_millis(1500);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
struct ResolvedDevice {
    host: String,
    address: String,
    port: u16,
}

/// Production [`CastTransport`] backed by mDNS and a blocking TLS session.
///
/// The blocking work runs on the tokio blocking pool; the last resolved
/// address is cached so a connect directly after a successful probe does not
/// need a second discovery round.
pub struct CastV2Transport {
    resolved: Mutex<Option<ResolvedDevice>>,
}

impl CastV2Transport {
    pub fn new() -> Self {
        Self {
            resolved: Mutex::new(None),
        }
    }

    fn store_resolved(&self, device: Option<ResolvedDevice>) {
        let mut slot = match self.resolved.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = device;
    }

    fn cached_resolved(&self) -> Option<ResolvedDevice> {
        let slot = match self.resolved.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.clone()
    }
}

impl Default for CastV2Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl CastTransport for CastV2Transport {
    type Session = CastSession;

    async fn discover(&self, device_name: &str) -> Result<bool, TransportError> {
        let name = device_name.to_string();
        let found = spawn_blocking(move || discover_device_once(&name))
            .await
            .map_err(|err| TransportError::Worker(err.to_string()))?;
        let reachable = found.is_some();
        self.store_resolved(found);
        Ok(reachable)
    }

    async fn connect(&self, device_name: &str) -> Result<CastSession, TransportError> {
        let target = match self.cached_resolved() {
            Some(target) => target,
            None => {
                let name = device_name.to_string();
                spawn_blocking(move || discover_device_once(&name))
                    .await
                    .map_err(|err| TransportError::Worker(err.to_string()))?
                    .ok_or_else(|| TransportError::NotFound(device_name.to_string()))?
            }
        };
        spawn_blocking(move || CastSession::establish(&target))
            .await
            .map_err(|err| TransportError::Worker(err.to_string()))?
            .map_err(TransportError::Handshake)
    }

    async fn load_media(
        &self,
        mut session: CastSession,
        url: &str,
        content_type: &str,
    ) -> Result<CastSession, TransportError> {
        let url = url.to_string();
        let content_type = content_type.to_string();
        spawn_blocking(move || match session.load(&url, &content_type) {
            Ok(()) => Ok(session),
            Err(err) => Err(TransportError::Load(err)),
        })
        .await
        .map_err(|err| TransportError::Worker(err.to_string()))?
    }

    async fn disconnect(&self, mut session: CastSession) {
        let _ = spawn_blocking(move || session.shutdown()).await;
    }
}

/// One mDNS browse round looking for the named device.
fn discover_device_once(device_name: &str) -> Option<ResolvedDevice> {
    let mdns = match ServiceDaemon::new() {
        Ok(mdns) => mdns,
        Err(err) => {
            warn!(error = %err, "failed to start mDNS discovery daemon");
            return None;
        }
    };
    let browser = match mdns.browse(CAST_SERVICE_TYPE) {
        Ok(receiver) => receiver,
        Err(err) => {
            warn!(error = %err, "failed to browse cast mDNS service");
            let _ = mdns.shutdown();
            return None;
        }
    };

    let deadline = Instant::now() + DISCOVERY_WINDOW;
    let mut found = None;
    while found.is_none() && Instant::now() < deadline {
        let timeout = deadline
            .saturating_duration_since(Instant::now())
            .min(DISCOVERY_POLL);
        let Ok(event) = browser.recv_timeout(timeout) else {
            continue;
        };
        if let ServiceEvent::ServiceResolved(service) = event {
            let name = service
                .get_property_val_str("fn")
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
                .unwrap_or_else(|| instance_name_from_fullname(service.get_fullname()));
            if !name.eq_ignore_ascii_case(device_name) {
                debug!(candidate = %name, "ignoring non-matching cast device");
                continue;
            }
            // Prefer IPv4: the photo server binds an IPv4 address.
            let mut v4_addresses: Vec<_> = service.get_addresses_v4().iter().copied().collect();
            v4_addresses.sort();
            if let Some(address) = v4_addresses.first().map(ToString::to_string) {
                found = Some(ResolvedDevice {
                    host: service.get_hostname().trim_end_matches('.').to_string(),
                    address,
                    port: service.get_port(),
                });
            }
        }
    }

    if let Err(err) = mdns.stop_browse(CAST_SERVICE_TYPE) {
        debug!(error = %err, "failed to stop mDNS browse cleanly");
    }
    let _ = mdns.shutdown();
    found
}

fn instance_name_from_fullname(fullname: &str) -> String {
    fullname
        .trim()
        .strip_suffix(CAST_SERVICE_TYPE)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fullname)
        .trim_matches('.')
        .to_string()
}

/// An established control channel with a launched default media receiver.
pub struct CastSession {
    stream: native_tls::TlsStream<TcpStream>,
    media_transport_id: String,
    app_session_id: Option<String>,
    next_request_id: i64,
}

impl CastSession {
    fn establish(device: &ResolvedDevice) -> Result<Self, String> {
        let address = format!("{}:{}", device.address, device.port);
        let tcp = TcpStream::connect_timeout(
            &address
                .parse()
                .map_err(|err| format!("invalid cast target address '{address}': {err}"))?,
            CONNECT_TIMEOUT,
        )
        .map_err(|err| format!("failed to connect to cast target {address}: {err}"))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|err| format!("failed to set cast read timeout: {err}"))?;
        tcp.set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(|err| format!("failed to set cast write timeout: {err}"))?;

        // Cast devices present self-signed certificates.
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| format!("failed to create cast tls connector: {err}"))?;
        let stream = connector
            .connect(&device.host, tcp)
            .map_err(|err| format!("failed cast tls handshake: {err}"))?;

        let mut session = Self {
            stream,
            media_transport_id: RECEIVER_ID.to_string(),
            app_session_id: None,
            next_request_id: 1,
        };

        session.send_json(
            NAMESPACE_CONNECTION,
            RECEIVER_ID,
            serde_json::json!({"type": "CONNECT", "origin": {}}),
        )?;
        let request_id = session.alloc_request_id();
        session.send_json(
            NAMESPACE_RECEIVER,
            RECEIVER_ID,
            serde_json::json!({
                "type": "LAUNCH",
                "appId": DEFAULT_MEDIA_RECEIVER_APP_ID,
                "requestId": request_id,
            }),
        )?;

        let (transport_id, app_session_id) = session.await_media_transport_id(LAUNCH_TIMEOUT)?;
        session.media_transport_id = transport_id;
        session.app_session_id = Some(app_session_id);
        let media_destination = session.media_transport_id.clone();
        session.send_json(
            NAMESPACE_CONNECTION,
            &media_destination,
            serde_json::json!({"type": "CONNECT", "origin": {}}),
        )?;

        Ok(session)
    }

    /// Ask the receiver to fetch and render `url`. Any queued previous load is
    /// simply replaced.
    fn load(&mut self, url: &str, content_type: &str) -> Result<(), String> {
        self.reply_to_pings()?;
        let request_id = self.alloc_request_id();
        let destination = self.media_transport_id.clone();
        self.send_json(
            NAMESPACE_MEDIA,
            &destination,
            serde_json::json!({
                "type": "LOAD",
                "requestId": request_id,
                "autoplay": true,
                "media": {
                    "contentId": url,
                    "streamType": "BUFFERED",
                    "contentType": content_type,
                    "metadata": {"metadataType": 0},
                },
            }),
        )
    }

    /// Best-effort teardown: stop the receiver app and close both virtual
    /// connections. Errors are logged and swallowed; the device times out
    /// stale sessions on its own.
    fn shutdown(&mut self) {
        if let Some(session_id) = self.app_session_id.take() {
            let request_id = self.alloc_request_id();
            if let Err(err) = self.send_json(
                NAMESPACE_RECEIVER,
                RECEIVER_ID,
                serde_json::json!({
                    "type": "STOP",
                    "requestId": request_id,
                    "sessionId": session_id,
                }),
            ) {
                debug!(error = %err, "receiver app STOP during disconnect failed");
            }
        }
        let media_destination = self.media_transport_id.clone();
        for destination in [media_destination.as_str(), RECEIVER_ID] {
            if let Err(err) = self.send_json(
                NAMESPACE_CONNECTION,
                destination,
                serde_json::json!({"type": "CLOSE"}),
            ) {
                debug!(error = %err, destination, "CLOSE during disconnect failed");
            }
        }
    }

    fn alloc_request_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn send_json(
        &mut self,
        namespace: &str,
        destination_id: &str,
        payload: Value,
    ) -> Result<(), String> {
        let frame = encode_frame(SENDER_ID, destination_id, namespace, &payload.to_string())?;
        self.stream
            .write_all(&frame)
            .map_err(|err| format!("failed to send cast frame: {err}"))
    }

    /// Read one frame if the device has sent anything; `None` on a quiet
    /// socket (read timeout).
    fn read_message(&mut self) -> Result<Option<(String, String)>, String> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
            Err(err) => return Err(format!("failed to read cast frame length: {err}")),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Ok(None);
        }
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .map_err(|err| format!("failed to read cast frame payload: {err}"))?;
        decode_frame(&payload).map(Some)
    }

    /// Answer any pending heartbeat PINGs so the device keeps the channel open.
    fn reply_to_pings(&mut self) -> Result<(), String> {
        while let Some((namespace, payload)) = self.read_message()? {
            if namespace != NAMESPACE_HEARTBEAT {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<Value>(&payload)
                && value.get("type").and_then(Value::as_str) == Some("PING")
            {
                self.send_json(
                    NAMESPACE_HEARTBEAT,
                    RECEIVER_ID,
                    serde_json::json!({"type": "PONG"}),
                )?;
            }
        }
        Ok(())
    }

    /// Wait for the RECEIVER_STATUS that names the launched app's transport.
    fn await_media_transport_id(&mut self, timeout: Duration) -> Result<(String, String), String> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let Some((namespace, payload)) = self.read_message()? else {
                continue;
            };
            if namespace == NAMESPACE_HEARTBEAT {
                if let Ok(value) = serde_json::from_str::<Value>(&payload)
                    && value.get("type").and_then(Value::as_str) == Some("PING")
                {
                    self.send_json(
                        NAMESPACE_HEARTBEAT,
                        RECEIVER_ID,
                        serde_json::json!({"type": "PONG"}),
                    )?;
                }
                continue;
            }
            if namespace != NAMESPACE_RECEIVER {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(&payload) else {
                continue;
            };
            let applications = value
                .get("status")
                .and_then(|status| status.get("applications"))
                .and_then(Value::as_array);
            let Some(applications) = applications else {
                continue;
            };
            for app in applications {
                if app.get("appId").and_then(Value::as_str) != Some(DEFAULT_MEDIA_RECEIVER_APP_ID)
                {
                    continue;
                }
                if let (Some(transport_id), Some(session_id)) = (
                    app.get("transportId").and_then(Value::as_str),
                    app.get("sessionId").and_then(Value::as_str),
                ) {
                    return Ok((transport_id.to_string(), session_id.to_string()));
                }
            }
        }
        Err("timed out waiting for media transport id".to_string())
    }
}

// CastMessage protobuf framing: a big-endian length prefix followed by the
// CASTV2_1_0 message fields (protocol version, source, destination,
// namespace, payload type, utf8 payload).

fn encode_frame(
    source_id: &str,
    destination_id: &str,
    namespace: &str,
    payload_utf8: &str,
) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();
    put_varint_field(&mut body, 1, 0); // protocol version CASTV2_1_0
    put_string_field(&mut body, 2, source_id);
    put_string_field(&mut body, 3, destination_id);
    put_string_field(&mut body, 4, namespace);
    put_varint_field(&mut body, 5, 0); // payload type STRING
    put_string_field(&mut body, 6, payload_utf8);

    let len: u32 = body
        .len()
        .try_into()
        .map_err(|_| "cast frame too large".to_string())?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Extract `(namespace, payload)` from a CastMessage body; other fields are
/// skipped.
fn decode_frame(bytes: &[u8]) -> Result<(String, String), String> {
    let mut cursor = 0usize;
    let mut namespace = String::new();
    let mut payload = String::new();

    while cursor < bytes.len() {
        let key =
            take_varint(bytes, &mut cursor).ok_or_else(|| "invalid cast frame key".to_string())?;
        let field_number = (key >> 3) as u32;
        match (key & 0x07) as u8 {
            0 => {
                take_varint(bytes, &mut cursor)
                    .ok_or_else(|| "invalid cast frame varint field".to_string())?;
            }
            2 => {
                let len = take_varint(bytes, &mut cursor)
                    .ok_or_else(|| "invalid cast frame length".to_string())?
                    as usize;
                if cursor + len > bytes.len() {
                    return Err("cast frame string out of bounds".to_string());
                }
                let value = std::str::from_utf8(&bytes[cursor..cursor + len])
                    .map_err(|_| "cast frame invalid utf8".to_string())?;
                match field_number {
                    4 => namespace = value.to_string(),
                    6 => payload = value.to_string(),
                    _ => {}
                }
                cursor += len;
            }
            _ => return Err("unsupported cast frame wire type".to_string()),
        }
    }

    Ok((namespace, payload))
}

fn put_varint_field(out: &mut Vec<u8>, field_number: u32, value: u64) {
    put_varint(out, u64::from(field_number) << 3);
    put_varint(out, value);
}

fn put_string_field(out: &mut Vec<u8>, field_number: u32, value: &str) {
    put_varint(out, (u64::from(field_number) << 3) | 2);
    put_varint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn take_varint(bytes: &[u8], cursor: &mut usize) -> Option<u64> {
    let mut shift = 0u32;
    let mut value = 0u64;
    while *cursor < bytes.len() && shift <= 63 {
        let byte = bytes[*cursor];
        *cursor += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_namespace_and_payload() {
        let frame = encode_frame(
            SENDER_ID,
            RECEIVER_ID,
            NAMESPACE_HEARTBEAT,
            r#"{"type":"PING"}"#,
        )
        .unwrap();
        // Strip the length prefix before decoding the body.
        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);
        let (namespace, payload) = decode_frame(&frame[4..]).unwrap();
        assert_eq!(namespace, NAMESPACE_HEARTBEAT);
        assert_eq!(payload, r#"{"type":"PING"}"#);
    }

    #[test]
    fn varint_round_trips_multi_byte_values() {
        for value in [0u64, 1, 127, 128, 300, 1 << 20, u64::MAX] {
            let mut buf = Vec::new();
            put_varint(&mut buf, value);
            let mut cursor = 0;
            assert_eq!(take_varint(&buf, &mut cursor), Some(value));
            assert_eq!(cursor, buf.len());
        }
    }

    #[test]
    fn instance_name_strips_service_suffix() {
        assert_eq!(
            instance_name_from_fullname("Living Room TV._googlecast._tcp.local."),
            "Living Room TV"
        );
        assert_eq!(instance_name_from_fullname("plain-name"), "plain-name");
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = encode_frame(SENDER_ID, RECEIVER_ID, NAMESPACE_MEDIA, "{}").unwrap();
        assert!(decode_frame(&frame[4..frame.len() - 1]).is_err());
    }
}
