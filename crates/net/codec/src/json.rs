use std::marker::PhantomData;

use asynchronous_codec::{Decoder, Encoder};
use bytes::{Buf, BytesMut};
use serde::{Serialize, de::DeserializeOwned};

use crate::{FrameError, MAX_MESSAGE_SIZE};

/// Raw JSON values: encodes `Out`, decodes `In`.
///
/// A message ends where its JSON value ends. Bytes are buffered until one
/// complete value parses, so a value split across reads is still decoded
/// whole. The two directions are typed separately so one codec serves a
/// request/response exchange from either side.
pub struct JsonCodec<Out, In> {
    max_message_size: usize,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<Out, In> JsonCodec<Out, In> {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            _marker: PhantomData,
        }
    }
}

impl<Out, In> Default for JsonCodec<Out, In> {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl<Out, In> Clone for JsonCodec<Out, In> {
    fn clone(&self) -> Self {
        Self::new(self.max_message_size)
    }
}

impl<Out, In> std::fmt::Debug for JsonCodec<Out, In> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCodec")
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl<Out: Serialize, In> Encoder for JsonCodec<Out, In> {
    type Item<'a> = Out;
    type Error = FrameError;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;
        if json.len() > self.max_message_size {
            return Err(FrameError::TooLarge {
                size: json.len(),
                max: self.max_message_size,
            });
        }
        dst.extend_from_slice(&json);
        Ok(())
    }
}

impl<Out, In: DeserializeOwned> Decoder for JsonCodec<Out, In> {
    type Item = In;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (item, consumed) = {
            let mut values = serde_json::Deserializer::from_slice(src).into_iter::<In>();
            match values.next() {
                Some(Ok(item)) => (item, values.byte_offset()),
                Some(Err(e)) if e.is_eof() => {
                    if src.len() > self.max_message_size {
                        return Err(FrameError::TooLarge {
                            size: src.len(),
                            max: self.max_message_size,
                        });
                    }
                    return Ok(None);
                }
                Some(Err(e)) => return Err(e.into()),
                // Nothing but whitespace so far.
                None => return Ok(None),
            }
        };
        src.advance(consumed);
        Ok(Some(item))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        let left = src.iter().filter(|b| !b.is_ascii_whitespace()).count();
        src.clear();
        match left {
            0 => Ok(None),
            _ => Err(FrameError::Truncated(left)),
        }
    }
}
