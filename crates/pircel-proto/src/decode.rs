//! Best-effort decoding of raw frames into text.
//!
//! Servers are supposed to speak UTF-8 but plenty of clients still push
//! legacy 8-bit charsets through them. We try UTF-8 first and fall back to
//! whatever `chardetng` thinks the bytes are.

use std::borrow::Cow;

use chardetng::EncodingDetector;

use crate::error::{ProtocolError, Result};

/// Decode a raw frame.
///
/// Valid UTF-8 is borrowed as-is. Anything else goes through charset
/// detection; if the detected encoding still reports malformed input the
/// frame is rejected with [`ProtocolError::Decode`].
pub fn decode(raw: &[u8]) -> Result<Cow<'_, str>> {
    match std::str::from_utf8(raw) {
        Ok(text) => Ok(Cow::Borrowed(text)),
        Err(_) => decode_fallback(raw).map(Cow::Owned),
    }
}

fn decode_fallback(raw: &[u8]) -> Result<String> {
    let mut detector = EncodingDetector::new();
    detector.feed(raw, true);
    let encoding = detector.guess(None, false);

    let (text, had_errors) = encoding.decode_without_bom_handling(raw);
    if had_errors {
        return Err(ProtocolError::Decode {
            raw: raw.to_vec(),
            len: raw.len(),
            encoding: encoding.name(),
        });
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(encoding = encoding.name(), "UTF-8 decode failed, used detected charset");

    Ok(text.into_owned())
}
