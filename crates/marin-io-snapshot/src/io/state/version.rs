use std::collections::BTreeMap;

use thiserror::Error;

/// Magic prefix of every device snapshot blob.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"MRIO";

/// Version of the container format (header + TLV framing), independent of device versions.
pub const FORMAT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

const HEADER_LEN: usize = 16;
const FIELD_HEADER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub format_version: SnapshotVersion,
    pub device_id: [u8; 4],
    pub device_version: SnapshotVersion,
}

impl SnapshotHeader {
    /// Parses only the fixed-size header, without validating the device id.
    pub fn parse(bytes: &[u8]) -> SnapshotResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::UnexpectedEof);
        }
        if bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        let format_version = SnapshotVersion::new(le_u16(&bytes[4..6]), le_u16(&bytes[6..8]));
        if format_version.major != FORMAT_VERSION.major {
            return Err(SnapshotError::UnsupportedFormatVersion {
                major: format_version.major,
                minor: format_version.minor,
            });
        }
        let mut device_id = [0u8; 4];
        device_id.copy_from_slice(&bytes[8..12]);
        let device_version = SnapshotVersion::new(le_u16(&bytes[12..14]), le_u16(&bytes[14..16]));
        Ok(Self {
            format_version,
            device_id,
            device_version,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&self.format_version.major.to_le_bytes());
        out.extend_from_slice(&self.format_version.minor.to_le_bytes());
        out.extend_from_slice(&self.device_id);
        out.extend_from_slice(&self.device_version.major.to_le_bytes());
        out.extend_from_slice(&self.device_version.minor.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unexpected end of snapshot data")]
    UnexpectedEof,

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot format version {major}.{minor}")]
    UnsupportedFormatVersion { major: u16, minor: u16 },

    #[error(
        "snapshot device id mismatch: expected {}, found {}",
        fourcc(.expected),
        fourcc(.found)
    )]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported device major version {found} (supported: {supported})")]
    UnsupportedDeviceMajorVersion { found: u16, supported: u16 },

    #[error("duplicate snapshot field tag {0}")]
    DuplicateFieldTag(u16),

    #[error("invalid field encoding: {0}")]
    InvalidFieldEncoding(&'static str),

    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

fn fourcc(id: &[u8; 4]) -> String {
    id.iter()
        .map(|&b| {
            if b.is_ascii_graphic() {
                char::from(b).to_string()
            } else {
                format!("\\x{b:02x}")
            }
        })
        .collect()
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Builds one device snapshot blob.
///
/// Fields may be added in any order; `finish` always emits them sorted by tag.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    header: SnapshotHeader,
    fields: BTreeMap<u16, Vec<u8>>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], device_version: SnapshotVersion) -> Self {
        Self {
            header: SnapshotHeader {
                format_version: FORMAT_VERSION,
                device_id,
                device_version,
            },
            fields: BTreeMap::new(),
        }
    }

    pub fn field_bytes(&mut self, tag: u16, bytes: Vec<u8>) {
        let prev = self.fields.insert(tag, bytes);
        debug_assert!(prev.is_none(), "snapshot field tag {tag} written twice");
    }

    pub fn field_u16(&mut self, tag: u16, value: u16) {
        self.field_bytes(tag, value.to_le_bytes().to_vec());
    }

    pub fn finish(self) -> Vec<u8> {
        let body_len: usize = self
            .fields
            .values()
            .map(|v| FIELD_HEADER_LEN + v.len())
            .sum();
        let mut out = Vec::with_capacity(HEADER_LEN + body_len);
        self.header.encode(&mut out);
        for (tag, value) in self.fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(&value);
        }
        out
    }
}

/// Parsed view over one device snapshot blob.
#[derive(Debug, Clone)]
pub struct SnapshotReader<'a> {
    header: SnapshotHeader,
    fields: BTreeMap<u16, &'a [u8]>,
}

impl<'a> SnapshotReader<'a> {
    /// Parses `bytes` and checks that it was written for `device_id`.
    pub fn parse(bytes: &'a [u8], device_id: [u8; 4]) -> SnapshotResult<Self> {
        let header = SnapshotHeader::parse(bytes)?;
        if header.device_id != device_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: device_id,
                found: header.device_id,
            });
        }

        let mut fields = BTreeMap::new();
        let mut rest = &bytes[HEADER_LEN..];
        while !rest.is_empty() {
            if rest.len() < FIELD_HEADER_LEN {
                return Err(SnapshotError::UnexpectedEof);
            }
            let tag = le_u16(&rest[0..2]);
            let len = u32::from_le_bytes([rest[2], rest[3], rest[4], rest[5]]) as usize;
            rest = &rest[FIELD_HEADER_LEN..];
            if rest.len() < len {
                return Err(SnapshotError::UnexpectedEof);
            }
            let (value, tail) = rest.split_at(len);
            if fields.insert(tag, value).is_some() {
                return Err(SnapshotError::DuplicateFieldTag(tag));
            }
            rest = tail;
        }

        Ok(Self { header, fields })
    }

    pub fn header(&self) -> SnapshotHeader {
        self.header
    }

    pub fn ensure_device_major(&self, supported: u16) -> SnapshotResult<()> {
        let found = self.header.device_version.major;
        if found != supported {
            return Err(SnapshotError::UnsupportedDeviceMajorVersion { found, supported });
        }
        Ok(())
    }

    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields.get(&tag).copied()
    }

    /// Little-endian `u16` field; a value of any other width is an encoding error.
    pub fn u16(&self, tag: u16) -> SnapshotResult<Option<u16>> {
        match self.bytes(tag) {
            None => Ok(None),
            Some(&[lo, hi]) => Ok(Some(u16::from_le_bytes([lo, hi]))),
            Some(_) => Err(SnapshotError::InvalidFieldEncoding("u16 field length")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: [u8; 4] = *b"TEST";

    #[test]
    fn fields_are_emitted_in_tag_order() {
        let mut a = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0));
        a.field_u16(2, 0xBEEF);
        a.field_bytes(1, vec![7]);

        let mut b = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0));
        b.field_bytes(1, vec![7]);
        b.field_u16(2, 0xBEEF);

        let bytes = a.finish();
        assert_eq!(bytes, b.finish());
        assert_eq!(&bytes[0..4], b"MRIO");
        // First field after the header is tag 1.
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 2], &[1, 0]);
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let mut w = SnapshotWriter::new(ID, SnapshotVersion::new(1, 3));
        w.field_u16(1, 5);
        w.field_bytes(99, vec![1, 2, 3]);
        let bytes = w.finish();

        let r = SnapshotReader::parse(&bytes, ID).unwrap();
        r.ensure_device_major(1).unwrap();
        assert_eq!(r.u16(1).unwrap(), Some(5));
        assert_eq!(r.u16(2).unwrap(), None);
        assert_eq!(r.header().device_version, SnapshotVersion::new(1, 3));
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let mut bytes = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0)).finish();
        for _ in 0..2 {
            bytes.extend_from_slice(&4u16.to_le_bytes());
            bytes.extend_from_slice(&1u32.to_le_bytes());
            bytes.push(0);
        }
        assert_eq!(
            SnapshotReader::parse(&bytes, ID).unwrap_err(),
            SnapshotError::DuplicateFieldTag(4)
        );
    }

    #[test]
    fn header_errors() {
        let bytes = SnapshotWriter::new(ID, SnapshotVersion::new(2, 0)).finish();

        let err = SnapshotReader::parse(&bytes, *b"OTHR").unwrap_err();
        assert!(matches!(err, SnapshotError::DeviceIdMismatch { .. }));
        assert_eq!(
            err.to_string(),
            "snapshot device id mismatch: expected OTHR, found TEST"
        );

        let r = SnapshotReader::parse(&bytes, ID).unwrap();
        assert_eq!(
            r.ensure_device_major(1).unwrap_err(),
            SnapshotError::UnsupportedDeviceMajorVersion {
                found: 2,
                supported: 1
            }
        );

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert_eq!(
            SnapshotReader::parse(&bad, ID).unwrap_err(),
            SnapshotError::InvalidMagic
        );
        assert_eq!(
            SnapshotReader::parse(&bytes[..10], ID).unwrap_err(),
            SnapshotError::UnexpectedEof
        );
    }

    #[test]
    fn truncated_field_is_eof() {
        let mut w = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0));
        w.field_u16(1, 0x1234);
        let bytes = w.finish();
        assert_eq!(
            SnapshotReader::parse(&bytes[..bytes.len() - 1], ID).unwrap_err(),
            SnapshotError::UnexpectedEof
        );
    }

    #[test]
    fn wrong_width_field_is_invalid_encoding() {
        let mut w = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0));
        w.field_bytes(1, vec![1]);
        w.field_bytes(2, vec![1, 2, 3]);
        let bytes = w.finish();

        let r = SnapshotReader::parse(&bytes, ID).unwrap();
        for tag in [1, 2] {
            assert_eq!(
                r.u16(tag).unwrap_err(),
                SnapshotError::InvalidFieldEncoding("u16 field length")
            );
        }
        assert_eq!(r.bytes(2), Some(&[1, 2, 3][..]));
    }
}
