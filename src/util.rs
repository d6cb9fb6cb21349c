use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static CALL_ID_SEED: LazyLock<u64> = LazyLock::new(|| fastrand::u64(..));
const HEX: &[u8; 16] = b"0123456789abcdef";

#[inline]
pub(crate) fn mix_u64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Fresh tool-call identifier, `call_` plus 16 hex digits.
///
/// Counter-driven and scrambled with a per-process seed, so ids never repeat
/// within a process and do not line up across restarts.
#[inline]
pub(crate) fn next_call_id() -> String {
    let id = CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut out = String::with_capacity(21);
    out.push_str("call_");
    push_u64_hex_16(&mut out, mix_u64(id ^ *CALL_ID_SEED));
    out
}

#[inline]
pub(crate) fn next_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn call_ids_are_prefixed_hex_and_unique() {
        let ids: HashSet<String> = (0..256).map(|_| next_call_id()).collect();
        assert_eq!(ids.len(), 256);
        for id in &ids {
            let hex = id.strip_prefix("call_").unwrap();
            assert_eq!(hex.len(), 16);
            assert!(hex.bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn completion_id_shape() {
        let id = next_completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 32);
        assert_ne!(id, next_completion_id());
    }

    #[test]
    fn push_u64_hex_16_pads() {
        let mut out = String::new();
        push_u64_hex_16(&mut out, 0x1234_abcd);
        assert_eq!(out, "000000001234abcd");
    }
}
