use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::{MessageLength, ProtocolError};

const EXTENDED_LENGTH_MARKER: u16 = u16::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u16,
    pub payload: Bytes,
}

/// Reassembles inbound frames from arbitrarily split transport chunks.
///
/// Frame boundaries depend on the message catalog, which may grow between two
/// frames of the same chunk, so frames are taken one at a time.
#[derive(Debug, Default)]
pub struct MessageReader {
    buf: BytesMut,
}

impl MessageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn next_frame(
        &mut self,
        length_of: impl Fn(u16) -> Option<MessageLength>,
    ) -> Result<Option<Frame>, ProtocolError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }
        let id = u16::from_le_bytes([self.buf[0], self.buf[1]]);
        let length = length_of(id).ok_or(ProtocolError::UnknownMessage(id))?;

        let (header, payload_len) = match length {
            MessageLength::Fixed(n) => (2, n as usize),
            MessageLength::Variable => {
                if self.buf.len() < 4 {
                    return Ok(None);
                }
                let short = u16::from_le_bytes([self.buf[2], self.buf[3]]);
                if short == EXTENDED_LENGTH_MARKER {
                    if self.buf.len() < 8 {
                        return Ok(None);
                    }
                    let long =
                        u32::from_le_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);
                    (8, long as usize)
                } else {
                    (4, short as usize)
                }
            }
        };

        if self.buf.len() < header + payload_len {
            return Ok(None);
        }
        self.buf.advance(header);
        let payload = self.buf.split_to(payload_len).freeze();
        Ok(Some(Frame { id, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::PrimitiveKind;
    use crate::protocol::MessageDescriptor;

    fn lengths(id: u16) -> Option<MessageLength> {
        match id {
            40 => Some(MessageLength::Fixed(2)),
            41 => Some(MessageLength::Variable),
            _ => None,
        }
    }

    #[test]
    fn reassembles_split_frames() {
        let kicked = MessageDescriptor::with_args(40, "Client_onKicked", &[PrimitiveKind::Uint16]);
        let update = MessageDescriptor::stream(41, "Client_onUpdatePropertys");
        let mut wire = kicked.frame(&[9, 0]).unwrap().to_vec();
        wire.extend_from_slice(&update.frame(&[1, 2, 3, 4, 5]).unwrap());

        let mut reader = MessageReader::new();
        let mut frames = Vec::new();
        for byte in wire {
            reader.push(&[byte]);
            while let Some(frame) = reader.next_frame(lengths).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id, 40);
        assert_eq!(&frames[0].payload[..], &[9, 0]);
        assert_eq!(frames[1].id, 41);
        assert_eq!(&frames[1].payload[..], &[1, 2, 3, 4, 5]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn reads_extended_length() {
        let update = MessageDescriptor::stream(41, "Client_onUpdatePropertys");
        let payload = vec![3u8; 80_000];
        let mut reader = MessageReader::new();
        reader.push(&update.frame(&payload).unwrap());
        let frame = reader.next_frame(lengths).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 80_000);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let mut reader = MessageReader::new();
        reader.push(&[99, 0, 1, 2]);
        assert_eq!(
            reader.next_frame(lengths),
            Err(ProtocolError::UnknownMessage(99))
        );
    }
}
