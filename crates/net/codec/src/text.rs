use asynchronous_codec::{Decoder, Encoder};
use bytes::{Buf, BytesMut};

use crate::{FrameError, MAX_MESSAGE_SIZE};

/// Raw UTF-8 text.
///
/// There is no message boundary on the wire: each decode yields all the text
/// buffered so far. A multi-byte character split across reads is held back
/// until its tail arrives. Invalid sequences become U+FFFD so a long-lived
/// reader survives a misbehaving peer.
#[derive(Debug, Clone)]
pub struct TextCodec {
    max_message_size: usize,
}

impl TextCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl Encoder for TextCodec {
    type Item<'a> = String;
    type Error = FrameError;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_message_size {
            return Err(FrameError::TooLarge {
                size: item.len(),
                max: self.max_message_size,
            });
        }
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}

impl Decoder for TextCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let complete = match std::str::from_utf8(src) {
            Ok(_) => src.len(),
            // Incomplete trailing character: wait for the rest of it.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => src.len(),
        };
        if complete == 0 {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&src[..complete]).into_owned();
        src.advance(complete);
        Ok(Some(text))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(src).into_owned();
        src.clear();
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_raw_on_the_wire() {
        let mut codec = TextCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("héllo 👋".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], "héllo 👋".as_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("héllo 👋"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_character_waits_for_tail() {
        let wave = "👋".as_bytes();
        let mut buf = BytesMut::from(&b"hi "[..]);
        buf.extend_from_slice(&wave[..2]);

        let mut codec = TextCodec::default();
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("hi "));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&wave[2..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("👋"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut raw = BytesMut::from(&[b'o', b'k', 0xFF, b'!'][..]);
        let text = TextCodec::default().decode(&mut raw).unwrap().unwrap();
        assert_eq!(text, "ok\u{FFFD}!");
    }

    #[test]
    fn test_eof_flushes_partial_character() {
        let mut raw = BytesMut::from(&"👋".as_bytes()[..3]);
        let mut codec = TextCodec::default();
        assert_eq!(codec.decode(&mut raw).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut raw).unwrap().as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let err = TextCodec::new(4)
            .encode("too long".to_string(), &mut BytesMut::new())
            .unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { size: 8, max: 4 }));
    }
}
