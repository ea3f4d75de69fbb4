use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
const HEX: &[u8; 16] = b"0123456789abcdef";

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Tool call id for upstreams that do not assign one (Cloud Code function calls).
#[inline]
pub(crate) fn next_call_id() -> String {
    let id = CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut out = String::with_capacity(21);
    out.push_str("call_");
    push_u64_hex_16(&mut out, id);
    out
}

/// Fallback response id, used until the upstream reports its own.
pub(crate) fn next_chunk_id() -> String {
    let mut out = String::with_capacity(41);
    out.push_str("chatcmpl-");
    out.push_str(&uuid::Uuid::new_v4().simple().to_string());
    out
}

#[inline]
fn push_u64_hex_16(out: &mut String, mut value: u64) {
    let mut buf = [b'0'; 16];
    let mut idx = 16;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}

/// Split a `data:` URI into `(mime_type, base64_payload)`.
///
/// Only base64-encoded data URIs are recognized; anything else returns `None`.
pub(crate) fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    Some((mime, payload))
}

#[inline]
pub(crate) fn is_remote_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_call_id_shape() {
        let id = next_call_id();
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), 21);
        assert_ne!(id, next_call_id());
    }

    #[test]
    fn test_split_data_uri() {
        assert_eq!(
            split_data_uri("data:image/png;base64,iVBORw0KGgo="),
            Some(("image/png", "iVBORw0KGgo="))
        );
        assert_eq!(split_data_uri("data:text/plain,hello"), None);
        assert_eq!(split_data_uri("https://example.com/cat.png"), None);
    }

    #[test]
    fn test_chunk_id_prefix() {
        let id = next_chunk_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), 41);
    }
}
