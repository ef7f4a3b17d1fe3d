use crate::constants::{MAX_CHUNK_PAYLOAD, MAX_MEMORY_NAME, PROBE_REGION_NAME};

use super::error::FrameError;

/// Fixed wire layout, little-endian:
///
/// | offset | width | field       |
/// |--------|-------|-------------|
/// | 0      | 64    | region name, NUL-terminated ASCII |
/// | 64     | 4     | message type |
/// | 68     | 8     | update id   |
/// | 76     | 8     | byte offset within the region |
/// | 84     | 8     | valid payload byte count |
/// | 92     | 4     | coarse tick, advisory |
/// | 96     | 1024  | payload     |
pub const FRAME_BYTES: usize = MAX_MEMORY_NAME + 4 + 8 + 8 + 8 + 4 + MAX_CHUNK_PAYLOAD;

const TYPE_OFFSET: usize = MAX_MEMORY_NAME;
const UPDATE_ID_OFFSET: usize = TYPE_OFFSET + 4;
const OFFSET_OFFSET: usize = UPDATE_ID_OFFSET + 8;
const SIZE_OFFSET: usize = OFFSET_OFFSET + 8;
const TIMESTAMP_OFFSET: usize = SIZE_OFFSET + 8;
const DATA_OFFSET: usize = TIMESTAMP_OFFSET + 4;

/// Classifies a frame for the receiver's reassembly state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Complete update in a single frame
    Single,
    /// First frame of a multi-frame update
    Start,
    /// Middle frame of a multi-frame update
    Chunk,
    /// Final frame of a multi-frame update
    End,
}

impl MessageType {
    pub fn to_index(self) -> u32 {
        match self {
            MessageType::Single => 0,
            MessageType::Start => 1,
            MessageType::Chunk => 2,
            MessageType::End => 3,
        }
    }

    pub fn try_from_index(index: u32) -> Result<Self, FrameError> {
        match index {
            0 => Ok(MessageType::Single),
            1 => Ok(MessageType::Start),
            2 => Ok(MessageType::Chunk),
            3 => Ok(MessageType::End),
            _ => Err(FrameError::InvalidMessageTypeIndex { index }),
        }
    }
}

/// One datagram's worth of replication data: a byte range of a named
/// region, plus the grouping metadata the reassembler needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncFrame {
    pub region: String,
    pub message_type: MessageType,
    pub update_id: u64,
    pub offset: usize,
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

impl SyncFrame {
    /// Builds a frame, validating the name and payload against the fixed
    /// field widths.
    pub fn new(
        region: &str,
        message_type: MessageType,
        update_id: u64,
        offset: usize,
        timestamp: u32,
        payload: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if region.len() >= MAX_MEMORY_NAME {
            return Err(FrameError::NameTooLong {
                length: region.len(),
                max: MAX_MEMORY_NAME - 1,
            });
        }
        if !name_is_printable(region.as_bytes()) {
            return Err(FrameError::NameNotPrintable);
        }
        if payload.len() > MAX_CHUNK_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_CHUNK_PAYLOAD,
            });
        }
        Ok(Self {
            region: region.to_string(),
            message_type,
            update_id,
            offset,
            timestamp,
            payload,
        })
    }

    /// The zero-length connectivity probe sent when a peer is added.
    pub fn probe(timestamp: u32) -> Self {
        Self {
            region: PROBE_REGION_NAME.to_string(),
            message_type: MessageType::Single,
            update_id: 0,
            offset: 0,
            timestamp,
            payload: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_probe(&self) -> bool {
        self.region == PROBE_REGION_NAME
    }

    /// Serializes into the fixed wire layout. Fields are written
    /// explicitly; nothing depends on in-memory struct layout.
    pub fn to_bytes(&self) -> Box<[u8; FRAME_BYTES]> {
        let mut buf = Box::new([0u8; FRAME_BYTES]);
        let name = self.region.as_bytes();
        buf[..name.len()].copy_from_slice(name);
        // bytes name.len()..MAX_MEMORY_NAME stay zero: NUL terminator + padding
        buf[TYPE_OFFSET..TYPE_OFFSET + 4]
            .copy_from_slice(&self.message_type.to_index().to_le_bytes());
        buf[UPDATE_ID_OFFSET..UPDATE_ID_OFFSET + 8].copy_from_slice(&self.update_id.to_le_bytes());
        buf[OFFSET_OFFSET..OFFSET_OFFSET + 8]
            .copy_from_slice(&(self.offset as u64).to_le_bytes());
        buf[SIZE_OFFSET..SIZE_OFFSET + 8]
            .copy_from_slice(&(self.payload.len() as u64).to_le_bytes());
        buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[DATA_OFFSET..DATA_OFFSET + self.payload.len()].copy_from_slice(&self.payload);
        buf
    }

    /// Deserializes a received datagram. Short reads and malformed
    /// fields are rejected; the caller is expected to log and discard.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FRAME_BYTES {
            return Err(FrameError::TruncatedFrame {
                length: bytes.len(),
                expected: FRAME_BYTES,
            });
        }

        let name_field = &bytes[..MAX_MEMORY_NAME];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_MEMORY_NAME - 1);
        let name_bytes = &name_field[..name_len];
        if !name_is_printable(name_bytes) {
            return Err(FrameError::NameNotPrintable);
        }
        // printable ASCII is valid UTF-8
        let region = String::from_utf8_lossy(name_bytes).into_owned();

        let message_type = MessageType::try_from_index(read_u32(bytes, TYPE_OFFSET))?;
        let update_id = read_u64(bytes, UPDATE_ID_OFFSET);
        let offset = read_u64(bytes, OFFSET_OFFSET);
        let size = read_u64(bytes, SIZE_OFFSET);
        if size > MAX_CHUNK_PAYLOAD as u64 {
            return Err(FrameError::SizeFieldOutOfRange {
                size,
                max: MAX_CHUNK_PAYLOAD,
            });
        }
        let timestamp = read_u32(bytes, TIMESTAMP_OFFSET);
        let payload = bytes[DATA_OFFSET..DATA_OFFSET + size as usize].to_vec();

        Ok(Self {
            region,
            message_type,
            update_id,
            offset: offset as usize,
            timestamp,
            payload,
        })
    }
}

fn name_is_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| (0x20..0x7f).contains(&b))
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(field)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut field = [0u8; 8];
    field.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_survives_the_wire() {
        let frame = SyncFrame::new(
            "telemetry",
            MessageType::Chunk,
            0xDEAD_BEEF_0000_0042,
            96,
            7,
            vec![1, 2, 3, 4],
        )
        .expect("valid frame");
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), FRAME_BYTES);
        let decoded = SyncFrame::from_bytes(bytes.as_slice()).expect("decodes");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn truncated_datagram_is_rejected() {
        let frame = SyncFrame::new("R", MessageType::Single, 1, 0, 0, vec![0xAA]).expect("valid");
        let bytes = frame.to_bytes();
        let result = SyncFrame::from_bytes(&bytes[..FRAME_BYTES - 1]);
        assert_eq!(
            result,
            Err(FrameError::TruncatedFrame {
                length: FRAME_BYTES - 1,
                expected: FRAME_BYTES,
            })
        );
    }

    #[test]
    fn invalid_message_type_index_is_rejected() {
        let frame = SyncFrame::new("R", MessageType::Single, 1, 0, 0, vec![]).expect("valid");
        let mut bytes = frame.to_bytes();
        bytes[TYPE_OFFSET] = 9;
        assert_eq!(
            SyncFrame::from_bytes(bytes.as_slice()),
            Err(FrameError::InvalidMessageTypeIndex { index: 9 })
        );
    }

    #[test]
    fn oversized_size_field_is_rejected() {
        let frame = SyncFrame::new("R", MessageType::Single, 1, 0, 0, vec![]).expect("valid");
        let mut bytes = frame.to_bytes();
        bytes[SIZE_OFFSET..SIZE_OFFSET + 8]
            .copy_from_slice(&(MAX_CHUNK_PAYLOAD as u64 + 1).to_le_bytes());
        assert!(matches!(
            SyncFrame::from_bytes(bytes.as_slice()),
            Err(FrameError::SizeFieldOutOfRange { .. })
        ));
    }

    #[test]
    fn name_must_leave_room_for_the_nul() {
        let name = "x".repeat(MAX_MEMORY_NAME);
        let result = SyncFrame::new(&name, MessageType::Single, 1, 0, 0, vec![]);
        assert!(matches!(result, Err(FrameError::NameTooLong { .. })));

        let name = "x".repeat(MAX_MEMORY_NAME - 1);
        assert!(SyncFrame::new(&name, MessageType::Single, 1, 0, 0, vec![]).is_ok());
    }

    #[test]
    fn payload_larger_than_data_field_is_rejected() {
        let result = SyncFrame::new(
            "R",
            MessageType::Single,
            1,
            0,
            0,
            vec![0u8; MAX_CHUNK_PAYLOAD + 1],
        );
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn probe_frame_has_reserved_name_and_no_payload() {
        let probe = SyncFrame::probe(3);
        assert!(probe.is_probe());
        assert_eq!(probe.size(), 0);
        let decoded = SyncFrame::from_bytes(probe.to_bytes().as_slice()).expect("decodes");
        assert_eq!(decoded.region, "TEST");
    }
}
