// src/protocol/codec.rs

use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Length-delimited TCP framing with bincode payloads.
///
/// `In` is the message type read from the peer, `Out` the type written to
/// it, so each side of a session gets a typed codec:
/// the client uses `FrameCodec<MasterMessage, ClientMessage>` and the master
/// the mirror image.
pub struct FrameCodec<In, Out> {
    codec: LengthDelimitedCodec,
    _types: PhantomData<fn(Out) -> In>,
}

impl<In, Out> FrameCodec<In, Out> {
    pub fn new() -> Self {
        Self {
            codec: LengthDelimitedCodec::new(),
            _types: PhantomData,
        }
    }
}

impl<In, Out> Default for FrameCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out: Serialize> Encoder<Out> for FrameCodec<In, Out> {
    type Error = io::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = bincode::serialize(&item).map_err(io::Error::other)?;
        self.codec.encode(Bytes::from(bytes), dst)
    }
}

impl<In: DeserializeOwned, Out> Decoder for FrameCodec<In, Out> {
    type Item = In;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src)? {
            Some(frame) => {
                let item = bincode::deserialize(&frame).map_err(io::Error::other)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMessage, ExecuteRequest, MasterMessage};

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let mut client: FrameCodec<MasterMessage, ClientMessage> = FrameCodec::new();
        let mut master: FrameCodec<ClientMessage, MasterMessage> = FrameCodec::new();

        let mut wire = BytesMut::new();
        client
            .encode(ClientMessage::Execute(ExecuteRequest::new("G1")), &mut wire)
            .unwrap();

        let mut head = wire.split_to(3);
        assert!(master.decode(&mut head).unwrap().is_none());

        head.unsplit(wire);
        let decoded = master.decode(&mut head).unwrap();
        assert_eq!(decoded, Some(ClientMessage::Execute(ExecuteRequest::new("G1"))));
    }

    #[test]
    fn garbage_payload_is_an_io_error() {
        let mut master: FrameCodec<ClientMessage, MasterMessage> = FrameCodec::new();
        let mut raw = LengthDelimitedCodec::new();
        let mut wire = BytesMut::new();
        raw.encode(Bytes::from_static(&[0xff; 4]), &mut wire).unwrap();

        assert!(master.decode(&mut wire).is_err());
    }
}
