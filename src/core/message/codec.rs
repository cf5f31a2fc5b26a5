/*!
Binary message framing.

Every message starts with the protocol version byte and the message-type
byte, followed by a sequence of tagged fields. A field is a one-byte tag,
a big-endian u32 length, and that many value bytes. Decoding is strict:
wrong version, wrong type, truncated fields, and trailing bytes are all
fatal wire-format errors.
*/

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::core::constants::VERSION;
use crate::core::error::{Error, Result};

/// Discriminator byte of each wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Client opening message of a round-trip handshake
    ClientHello = 0x01,
    /// Server response to a client hello
    ServerHello = 0x02,
    /// Client confirmation closing a confirmed handshake
    ClientConfirm = 0x03,
    /// One-message agreement toward a known public key
    KemRequest = 0x04,
}

impl MessageType {
    /// Decode a message-type byte
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(MessageType::ClientHello),
            0x02 => Ok(MessageType::ServerHello),
            0x03 => Ok(MessageType::ClientConfirm),
            0x04 => Ok(MessageType::KemRequest),
            other => Err(Error::WireFormat(format!(
                "unknown message type: {:#04x}",
                other
            ))),
        }
    }

    /// Wire byte of this message type
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::ClientHello => write!(f, "ClientHello"),
            MessageType::ServerHello => write!(f, "ServerHello"),
            MessageType::ClientConfirm => write!(f, "ClientConfirm"),
            MessageType::KemRequest => write!(f, "KemRequest"),
        }
    }
}

// Field tags shared by the handshake messages
pub(crate) const TAG_AGREEMENT_ID: u8 = 0x01;
pub(crate) const TAG_RESULT_ID: u8 = 0x02;
pub(crate) const TAG_CLIENT_ID: u8 = 0x03;
pub(crate) const TAG_SERVER_ID: u8 = 0x04;
pub(crate) const TAG_INIT_VECTOR: u8 = 0x05;
pub(crate) const TAG_EPHEMERAL_KEY: u8 = 0x06;
pub(crate) const TAG_ENCAPSULATED: u8 = 0x07;
pub(crate) const TAG_CONFIRMATION: u8 = 0x08;
pub(crate) const TAG_SIGNATURE: u8 = 0x09;

/// Serializer appending tagged fields after the two-byte envelope
pub(crate) struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub(crate) fn new(msg_type: MessageType) -> Self {
        Self {
            buf: vec![VERSION, msg_type.as_u8()],
        }
    }

    pub(crate) fn field(&mut self, tag: u8, value: &[u8]) {
        self.buf.push(tag);
        let mut len = [0u8; 4];
        BigEndian::write_u32(&mut len, value.len() as u32);
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(value);
    }

    pub(crate) fn u64_field(&mut self, tag: u8, value: u64) {
        let mut bytes = [0u8; 8];
        BigEndian::write_u64(&mut bytes, value);
        self.field(tag, &bytes);
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Strict deserializer over the tagged-field sequence.
///
/// Fields are consumed in declaration order; `finish` rejects anything
/// left over.
pub(crate) struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    /// Open a message, checking the version and message-type bytes
    pub(crate) fn new(expected: MessageType, bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::WireFormat("message shorter than envelope".into()));
        }
        if bytes[0] != VERSION {
            return Err(Error::WireFormat(format!(
                "unsupported protocol version: {:#04x}",
                bytes[0]
            )));
        }
        let actual = MessageType::from_u8(bytes[1])?;
        if actual != expected {
            return Err(Error::WireFormat(format!(
                "expected {} message, found {}",
                expected, actual
            )));
        }
        Ok(Self { bytes, pos: 2 })
    }

    /// Tag of the next field, if any bytes remain
    pub(crate) fn peek_tag(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume the next field, which must carry the given tag
    pub(crate) fn require(&mut self, tag: u8) -> Result<&'a [u8]> {
        match self.optional(tag)? {
            Some(value) => Ok(value),
            None => Err(Error::WireFormat(format!(
                "missing required field {:#04x}",
                tag
            ))),
        }
    }

    /// Consume the next field if it carries the given tag
    pub(crate) fn optional(&mut self, tag: u8) -> Result<Option<&'a [u8]>> {
        if self.peek_tag() != Some(tag) {
            return Ok(None);
        }
        let header_end = self.pos + 5;
        if self.bytes.len() < header_end {
            return Err(Error::WireFormat("truncated field header".into()));
        }
        let len = BigEndian::read_u32(&self.bytes[self.pos + 1..header_end]) as usize;
        let value_end = header_end
            .checked_add(len)
            .ok_or_else(|| Error::WireFormat("field length overflow".into()))?;
        if self.bytes.len() < value_end {
            return Err(Error::WireFormat("truncated field value".into()));
        }
        let value = &self.bytes[header_end..value_end];
        self.pos = value_end;
        Ok(Some(value))
    }

    pub(crate) fn require_u64(&mut self, tag: u8) -> Result<u64> {
        read_u64(self.require(tag)?)
    }

    pub(crate) fn optional_u64(&mut self, tag: u8) -> Result<Option<u64>> {
        self.optional(tag)?.map(read_u64).transpose()
    }

    /// Close the message, rejecting trailing bytes
    pub(crate) fn finish(self) -> Result<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(Error::WireFormat("trailing bytes after last field".into()))
        }
    }
}

fn read_u64(value: &[u8]) -> Result<u64> {
    if value.len() != 8 {
        return Err(Error::WireFormat(format!(
            "expected 8-byte integer field, found {} bytes",
            value.len()
        )));
    }
    Ok(BigEndian::read_u64(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip() {
        let mut writer = FieldWriter::new(MessageType::ClientHello);
        writer.field(TAG_AGREEMENT_ID, b"id-bytes");
        writer.u64_field(TAG_CLIENT_ID, 42);
        writer.field(TAG_INIT_VECTOR, &[0u8; 32]);
        let bytes = writer.finish();

        let mut reader = FieldReader::new(MessageType::ClientHello, &bytes).unwrap();
        assert_eq!(reader.require(TAG_AGREEMENT_ID).unwrap(), b"id-bytes");
        assert_eq!(reader.require_u64(TAG_CLIENT_ID).unwrap(), 42);
        assert_eq!(reader.require(TAG_INIT_VECTOR).unwrap(), &[0u8; 32]);
        reader.finish().unwrap();
    }

    #[test]
    fn test_optional_field_absent() {
        let mut writer = FieldWriter::new(MessageType::ServerHello);
        writer.field(TAG_INIT_VECTOR, &[1u8; 32]);
        let bytes = writer.finish();

        let mut reader = FieldReader::new(MessageType::ServerHello, &bytes).unwrap();
        assert_eq!(reader.optional_u64(TAG_CLIENT_ID).unwrap(), None);
        assert!(reader.require(TAG_INIT_VECTOR).is_ok());
        reader.finish().unwrap();
    }

    #[test]
    fn test_rejects_wrong_version() {
        let mut bytes = FieldWriter::new(MessageType::ClientHello).finish();
        bytes[0] = 0x7F;
        assert!(matches!(
            FieldReader::new(MessageType::ClientHello, &bytes),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_message_type() {
        let bytes = FieldWriter::new(MessageType::ServerHello).finish();
        assert!(matches!(
            FieldReader::new(MessageType::ClientHello, &bytes),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut writer = FieldWriter::new(MessageType::ClientConfirm);
        writer.field(TAG_CONFIRMATION, &[2u8; 32]);
        let mut bytes = writer.finish();
        bytes.push(0x00);

        let mut reader = FieldReader::new(MessageType::ClientConfirm, &bytes).unwrap();
        reader.require(TAG_CONFIRMATION).unwrap();
        assert!(matches!(reader.finish(), Err(Error::WireFormat(_))));
    }

    #[test]
    fn test_rejects_truncated_value() {
        let mut writer = FieldWriter::new(MessageType::ClientHello);
        writer.field(TAG_EPHEMERAL_KEY, &[3u8; 16]);
        let bytes = writer.finish();

        let mut reader =
            FieldReader::new(MessageType::ClientHello, &bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(
            reader.require(TAG_EPHEMERAL_KEY),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_message_type_codes() {
        for msg_type in [
            MessageType::ClientHello,
            MessageType::ServerHello,
            MessageType::ClientConfirm,
            MessageType::KemRequest,
        ] {
            assert_eq!(MessageType::from_u8(msg_type.as_u8()).unwrap(), msg_type);
        }
        assert!(MessageType::from_u8(0x7F).is_err());
    }
}
