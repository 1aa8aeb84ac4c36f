use std::fmt;

use bytes::{Buf, BufMut};

use crate::dns_header::{RECORD_FIXED_LEN, TTL_OFFSET};
use crate::error::{ProxyError, Result};

const POINTER_MASK: u8 = 0xC0;
const MAX_LABEL_LEN: usize = 63;

/// DNS Question Section
/// Format: QNAME + QTYPE (2 bytes) + QCLASS (2 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,        // Domain name (e.g., "example.com")
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

/// DNS Answer/Resource Record Section
/// Format: NAME + TYPE (2 bytes) + CLASS (2 bytes) + TTL (4 bytes) + RDLENGTH (2 bytes) + RDATA
#[derive(Debug, Clone)]
pub struct DnsAnswer {
    pub name: String,
    pub rtype: RecordType,
    pub rclass: RecordClass,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

/// Where one answer record sits inside a message, without decoding its rdata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    /// Absolute offset of the 32-bit TTL field.
    pub ttl_offset: usize,
    /// Absolute offset of the first byte after this record.
    pub end: usize,
}

/// Record types this proxy understands (RFC 1035 §3.2.2).
///
/// Anything outside this table is rejected: without knowing the type we cannot
/// trust the record boundaries that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A = 1,
    NS = 2,
    MD = 3,
    MF = 4,
    CNAME = 5,
    SOA = 6,
    MB = 7,
    MG = 8,
    MR = 9,
    NULL = 10,
    WKS = 11,
    PTR = 12,
    HINFO = 13,
    MINFO = 14,
    MX = 15,
    TXT = 16,
}

impl RecordType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(RecordType::A),
            2 => Some(RecordType::NS),
            3 => Some(RecordType::MD),
            4 => Some(RecordType::MF),
            5 => Some(RecordType::CNAME),
            6 => Some(RecordType::SOA),
            7 => Some(RecordType::MB),
            8 => Some(RecordType::MG),
            9 => Some(RecordType::MR),
            10 => Some(RecordType::NULL),
            11 => Some(RecordType::WKS),
            12 => Some(RecordType::PTR),
            13 => Some(RecordType::HINFO),
            14 => Some(RecordType::MINFO),
            15 => Some(RecordType::MX),
            16 => Some(RecordType::TXT),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::NS => "NS",
            RecordType::MD => "MD",
            RecordType::MF => "MF",
            RecordType::CNAME => "CNAME",
            RecordType::SOA => "SOA",
            RecordType::MB => "MB",
            RecordType::MG => "MG",
            RecordType::MR => "MR",
            RecordType::NULL => "NULL",
            RecordType::WKS => "WKS",
            RecordType::PTR => "PTR",
            RecordType::HINFO => "HINFO",
            RecordType::MINFO => "MINFO",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
        }
    }

    fn decode(value: u16) -> Result<Self> {
        Self::from_u16(value)
            .ok_or_else(|| ProxyError::malformed(format!("unsupported record type {}", value)))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common DNS classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    IN = 1, // Internet
    CS = 2, // CSNET (obsolete)
    CH = 3, // CHAOS
    HS = 4, // Hesiod
}

impl RecordClass {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(RecordClass::IN),
            2 => Some(RecordClass::CS),
            3 => Some(RecordClass::CH),
            4 => Some(RecordClass::HS),
            _ => None,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordClass::IN => "IN",
            RecordClass::CS => "CS",
            RecordClass::CH => "CH",
            RecordClass::HS => "HS",
        }
    }

    fn decode(value: u16) -> Result<Self> {
        Self::from_u16(value)
            .ok_or_else(|| ProxyError::malformed(format!("unsupported record class {}", value)))
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DnsQuestion {
    /// Parse a DNS question from bytes starting at the given offset
    /// Returns the question and the new offset after parsing
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (name, new_offset) = parse_domain_name(bytes, offset)?;

        let mut fixed = bytes
            .get(new_offset..new_offset + 4)
            .ok_or_else(|| ProxyError::malformed("question type and class cut short"))?;

        let qtype = RecordType::decode(fixed.get_u16())?;
        let qclass = RecordClass::decode(fixed.get_u16())?;

        Ok((DnsQuestion { name, qtype, qclass }, new_offset + 4))
    }

    /// Convert the question to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = encode_domain_name(&self.name)?;
        bytes.put_u16(self.qtype.to_u16());
        bytes.put_u16(self.qclass.to_u16());
        Ok(bytes)
    }
}

impl DnsAnswer {
    /// Create an A record (IPv4 address) answer
    pub fn new_a_record(name: impl Into<String>, ttl: u32, ip: [u8; 4]) -> Self {
        DnsAnswer {
            name: name.into(),
            rtype: RecordType::A,
            rclass: RecordClass::IN,
            ttl,
            rdata: ip.to_vec(),
        }
    }

    /// Convert the answer to bytes, writing the owner name uncompressed
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let rdlength = u16::try_from(self.rdata.len())
            .map_err(|_| ProxyError::malformed("rdata longer than 65535 bytes"))?;

        let mut bytes = encode_domain_name(&self.name)?;
        bytes.put_u16(self.rtype.to_u16());
        bytes.put_u16(self.rclass.to_u16());
        bytes.put_u32(self.ttl);
        bytes.put_u16(rdlength);
        bytes.extend_from_slice(&self.rdata);
        Ok(bytes)
    }
}

impl RecordLayout {
    /// Locate the answer record starting at `offset`.
    pub fn read(bytes: &[u8], offset: usize) -> Result<Self> {
        let fixed_start = skip_record_name(bytes, offset)?;

        let mut fixed = bytes
            .get(fixed_start..fixed_start + RECORD_FIXED_LEN)
            .ok_or_else(|| ProxyError::malformed("answer record fields cut short"))?;

        let rtype = fixed.get_u16();
        let rclass = fixed.get_u16();
        let ttl = fixed.get_u32();
        let rdlength = fixed.get_u16() as usize;

        let end = fixed_start + RECORD_FIXED_LEN + rdlength;
        if end > bytes.len() {
            return Err(ProxyError::malformed(format!(
                "rdata of {} bytes runs past the end of the message",
                rdlength
            )));
        }

        Ok(RecordLayout {
            rtype,
            rclass,
            ttl,
            ttl_offset: fixed_start + TTL_OFFSET,
            end,
        })
    }

    pub fn record_type(&self) -> Result<RecordType> {
        RecordType::decode(self.rtype)
    }

    pub fn record_class(&self) -> Result<RecordClass> {
        RecordClass::decode(self.rclass)
    }
}

/// Parse an uncompressed domain name.
/// Returns the dotted name and the offset just past its terminating zero label.
pub fn parse_domain_name(bytes: &[u8], mut offset: usize) -> Result<(String, usize)> {
    let mut labels = Vec::new();

    loop {
        let length = *bytes
            .get(offset)
            .ok_or_else(|| ProxyError::malformed("name runs past the end of the message"))?;

        if length & POINTER_MASK != 0 {
            return Err(ProxyError::malformed(format!(
                "unsupported label prefix {:#04x} in name",
                length
            )));
        }

        offset += 1;
        if length == 0 {
            break;
        }

        let label = bytes
            .get(offset..offset + length as usize)
            .ok_or_else(|| ProxyError::malformed("label runs past the end of the message"))?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        offset += length as usize;
    }

    let domain_name = if labels.is_empty() {
        ".".to_string()
    } else {
        labels.join(".")
    };

    Ok((domain_name, offset))
}

/// Step over a record owner name without reading it.
///
/// The name ends at a zero label or at a compression pointer. Pointers are
/// never followed: the record's fixed fields start right after the 2 pointer
/// bytes regardless of where it points.
pub fn skip_record_name(bytes: &[u8], mut offset: usize) -> Result<usize> {
    loop {
        let length = *bytes
            .get(offset)
            .ok_or_else(|| ProxyError::malformed("record name runs past the end of the message"))?;

        match length & POINTER_MASK {
            0 if length == 0 => return Ok(offset + 1),
            0 => offset += 1 + length as usize,
            POINTER_MASK if offset + 2 <= bytes.len() => return Ok(offset + 2),
            POINTER_MASK => return Err(ProxyError::malformed("compression pointer cut short")),
            _ => {
                return Err(ProxyError::malformed(format!(
                    "unsupported label prefix {:#04x} in record name",
                    length
                )))
            }
        }
    }
}

/// Encode a domain name to DNS message format
/// Format: length-prefixed labels terminated with a null byte
/// Example: "example.com" -> [7]example[3]com[0]
pub fn encode_domain_name(name: &str) -> Result<Vec<u8>> {
    let mut encoded = Vec::with_capacity(name.len() + 2);

    for label in name.split('.').filter(|label| !label.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return Err(ProxyError::malformed(format!("label too long: {}", label)));
        }
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }

    encoded.push(0);
    Ok(encoded)
}
