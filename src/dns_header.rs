use bytes::{Buf, BufMut};

use crate::error::{ProxyError, Result};

/// Size of the fixed DNS header in bytes.
pub const HEADER_LEN: usize = 12;

/// Byte offset of the 32-bit TTL inside an answer record's fixed part
/// (type, class, ttl, rdlength).
pub(crate) const TTL_OFFSET: usize = 4;

/// Length of an answer record's fixed part: type, class, ttl, rdlength.
pub(crate) const RECORD_FIXED_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

/// Which way a message travels, taken from the QR bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Query,
    Response,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DnsFlags {
    pub qr: bool,     // Query/Response (false = query, true = response)
    pub opcode: u8,   // Operation code (0 = standard query)
    pub aa: bool,     // Authoritative Answer
    pub tc: bool,     // Truncation
    pub rd: bool,     // Recursion Desired
    pub ra: bool,     // Recursion Available
    pub rcode: u8,    // Response code
}

impl DnsFlags {
    pub fn to_u16(&self) -> u16 {
        let mut flags: u16 = 0;

        if self.qr { flags |= 1 << 15; }
        flags |= (self.opcode as u16 & 0xF) << 11;
        if self.aa { flags |= 1 << 10; }
        if self.tc { flags |= 1 << 9; }
        if self.rd { flags |= 1 << 8; }
        if self.ra { flags |= 1 << 7; }
        flags |= self.rcode as u16 & 0xF;

        flags
    }

    pub fn from_u16(flags: u16) -> Self {
        DnsFlags {
            qr: (flags & (1 << 15)) != 0,
            opcode: ((flags >> 11) & 0xF) as u8,
            aa: (flags & (1 << 10)) != 0,
            tc: (flags & (1 << 9)) != 0,
            rd: (flags & (1 << 8)) != 0,
            ra: (flags & (1 << 7)) != 0,
            rcode: (flags & 0xF) as u8,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.qr {
            Direction::Response
        } else {
            Direction::Query
        }
    }
}

impl DnsHeader {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProxyError::malformed(format!(
                "buffer of {} bytes is shorter than the DNS header",
                bytes.len()
            )));
        }

        let mut buf = &bytes[..HEADER_LEN];
        Ok(DnsHeader {
            id: buf.get_u16(),
            flags: buf.get_u16(),
            question_count: buf.get_u16(),
            answer_count: buf.get_u16(),
            authority_count: buf.get_u16(),
            additional_count: buf.get_u16(),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        let mut buf = &mut bytes[..];

        buf.put_u16(self.id);
        buf.put_u16(self.flags);
        buf.put_u16(self.question_count);
        buf.put_u16(self.answer_count);
        buf.put_u16(self.authority_count);
        buf.put_u16(self.additional_count);

        bytes
    }

    pub fn direction(&self) -> Direction {
        DnsFlags::from_u16(self.flags).direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = DnsHeader {
            id: 0xBEEF,
            flags: 0x8180,
            question_count: 1,
            answer_count: 2,
            authority_count: 0,
            additional_count: 1,
        };

        let parsed = DnsHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_short_header_is_malformed() {
        let err = DnsHeader::from_bytes(&[0u8; 11]).unwrap_err();
        assert!(matches!(err, ProxyError::MalformedPacket(_)));
    }

    #[test]
    fn test_qr_bit_sets_direction() {
        let query = DnsFlags { rd: true, ..Default::default() };
        let response = DnsFlags { qr: true, rd: true, ra: true, ..Default::default() };

        assert_eq!(query.to_u16(), 0x0100);
        assert_eq!(response.to_u16(), 0x8180);
        assert_eq!(DnsFlags::from_u16(0x0100).direction(), Direction::Query);
        assert_eq!(DnsFlags::from_u16(0x8180).direction(), Direction::Response);
    }
}
