use async_trait::async_trait;
use prost::{bytes::BufMut, Message};

use super::{proto::Envelope, BytesBus, Error};
use crate::{
    engine::{HandlerError, Transport},
    messages::ProtocolMessage,
};

/// [Transport] that frames every message as a 2-byte big-endian length
/// followed by the protobuf [Envelope] and hands it to a [BytesBus].
#[derive(Debug)]
pub struct ProtoBufEncodingLayer<B: BytesBus> {
    pub bus: B,
}

/// Frame `msg`. The length prefix is a fixed `u16`, not a varint, so
/// `encode_length_delimited` cannot be used.
pub fn encode_message(msg: ProtocolMessage) -> Result<Vec<u8>, Error> {
    let envelope = Envelope::from(msg);
    let len = envelope.encoded_len();
    if len > u16::MAX as usize {
        return Err(Error::TooLarge(len));
    }
    let mut buf = Vec::with_capacity(2 + len);
    buf.put_slice(&(len as u16).to_be_bytes());
    envelope.encode(&mut buf)?;
    Ok(buf)
}

/// Parse a frame produced by [encode_message].
pub fn decode_message(frame: &[u8]) -> Result<ProtocolMessage, Error> {
    if frame.len() < 2 {
        return Err(Error::Truncated {
            expected: 2,
            got: frame.len(),
        });
    }
    let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let body = &frame[2..];
    if body.len() != len {
        return Err(Error::Truncated {
            expected: len,
            got: body.len(),
        });
    }
    Ok(Envelope::decode(body)?.try_into()?)
}

#[async_trait]
impl<B: BytesBus> Transport for ProtoBufEncodingLayer<B> {
    async fn deliver(&self, msg: ProtocolMessage) -> Result<(), HandlerError> {
        let to = msg.to_identity_key;
        let frame = encode_message(msg).map_err(|e| HandlerError::Transport(e.to_string()))?;
        self.bus
            .send_to_participant(&to, &frame)
            .map_err(|e| HandlerError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abiencode::types::{Address, Hash, Signature},
        messages::{
            CustomData, ProcessId, Protocol, ProtocolParams, TakeActionParams, UNASSIGNED_SEQ_NO,
        },
        sig::{ExtendedPrivateKey, IdentityKey},
        wire::ConversionError,
    };
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder(Mutex<Vec<(IdentityKey, Vec<u8>)>>);

    impl BytesBus for Recorder {
        fn send_to_participant(&self, to: &IdentityKey, frame: &[u8]) -> std::io::Result<()> {
            self.0.lock().unwrap().push((*to, frame.to_vec()));
            Ok(())
        }
    }

    fn message() -> ProtocolMessage {
        let alice = ExtendedPrivateKey::from_seed(b"alice").unwrap().public_key();
        let bob = ExtendedPrivateKey::from_seed(b"bob").unwrap().public_key();
        ProtocolMessage {
            protocol: Protocol::TakeAction,
            process_id: ProcessId([7; 16]),
            seq: 0,
            to_identity_key: bob,
            params: Some(ProtocolParams::TakeAction(TakeActionParams {
                multisig_address: Address([0x42; 20]),
                initiator_identifier: alice,
                responder_identifier: bob,
                identity_hash: Hash([0x99; 32]),
                action: vec![1; 32],
                state_timeout: Some(30.into()),
            })),
            custom_data: CustomData {
                signature: Some(Signature([0x1b; 65])),
                signature2: None,
            },
        }
    }

    #[tokio::test]
    async fn frames_reach_the_bus() {
        let layer = ProtoBufEncodingLayer {
            bus: Recorder::default(),
        };
        let msg = message();
        layer.deliver(msg.clone()).await.unwrap();

        let sent = layer.bus.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, msg.to_identity_key);
        let frame = &sent[0].1;
        assert_eq!(
            u16::from_be_bytes([frame[0], frame[1]]) as usize,
            frame.len() - 2
        );
        assert_eq!(decode_message(frame).unwrap(), msg);
    }

    #[test]
    fn one_way_reply_without_params() {
        let mut msg = message();
        msg.seq = UNASSIGNED_SEQ_NO;
        msg.params = None;
        msg.custom_data.signature2 = Some(Signature([0x1c; 65]));
        let decoded = decode_message(&encode_message(msg.clone()).unwrap()).unwrap();
        assert_eq!(decoded.seq, -1);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn rejects_broken_frames() {
        let frame = encode_message(message()).unwrap();
        assert!(matches!(
            decode_message(&frame[..frame.len() - 1]),
            Err(Error::Truncated { .. })
        ));
        assert!(matches!(decode_message(&[0]), Err(Error::Truncated { .. })));

        let mut envelope = Envelope::from(message());
        envelope.protocol = "withdraw".to_string();
        let mut frame = (envelope.encoded_len() as u16).to_be_bytes().to_vec();
        envelope.encode(&mut frame).unwrap();
        assert!(matches!(
            decode_message(&frame),
            Err(Error::Conversion(ConversionError::UnknownProtocol(_)))
        ));
    }
}
