use std::time::Instant;

use bytes::{Bytes, BytesMut};

use crate::dns_header::{Direction, DnsHeader, HEADER_LEN};
use crate::dns_question_and_answer::{DnsAnswer, DnsQuestion, RecordClass, RecordLayout, RecordType};
use crate::error::{ProxyError, Result};

/// Opaque cache key: the raw question section (name + qtype + qclass).
pub type CacheKey = Bytes;

/// A decoded DNS message that still owns its original wire bytes.
///
/// Only the fields the proxy needs are decoded; everything else is carried
/// along untouched in `raw` and written back out verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    raw: Bytes,
    pub header: DnsHeader,
    pub question: DnsQuestion,
    /// Type and class of the first answer record, for responses that have one.
    pub answer: Option<(RecordType, RecordClass)>,
    question_end: usize,
}

impl Message {
    /// Decode a single-question message.
    pub fn decode(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        let header = DnsHeader::from_bytes(&raw)?;

        if header.question_count != 1 {
            return Err(ProxyError::malformed(format!(
                "expected exactly one question, found {}",
                header.question_count
            )));
        }

        let (question, question_end) = DnsQuestion::from_bytes(&raw, HEADER_LEN)?;

        let answer = match header.direction() {
            Direction::Response if header.answer_count > 0 => {
                let first = RecordLayout::read(&raw, question_end)?;
                Some((first.record_type()?, first.record_class()?))
            }
            _ => None,
        };

        Ok(Message {
            raw,
            header,
            question,
            answer,
            question_end,
        })
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn direction(&self) -> Direction {
        self.header.direction()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    /// The question section, used verbatim as the cache key.
    pub fn question_key(&self) -> CacheKey {
        self.raw.slice(HEADER_LEN..self.question_end)
    }

    /// TTL of the first answer record.
    pub fn extract_ttl(&self) -> Result<u32> {
        if self.direction() != Direction::Response {
            return Err(ProxyError::NotAResponse);
        }
        if self.header.answer_count == 0 {
            return Err(ProxyError::malformed("response carries no answer records"));
        }

        Ok(RecordLayout::read(&self.raw, self.question_end)?.ttl)
    }

    /// Copy of this message with a different transaction id; every other byte is kept.
    pub fn rewrite_id(&self, new_id: u16) -> Message {
        let mut raw = BytesMut::from(&self.raw[..]);
        raw[..2].copy_from_slice(&new_id.to_be_bytes());

        Message {
            raw: raw.freeze(),
            header: DnsHeader {
                id: new_id,
                ..self.header
            },
            ..self.clone()
        }
    }

    /// Copy of this message with every answer TTL aged by the time spent in cache.
    ///
    /// Each of the `ancount` records gets `original_ttl - elapsed`, floored at zero.
    pub fn rewrite_ttl(&self, inserted_at: Instant, original_ttl: u32, now: Instant) -> Result<Message> {
        let ttl = remaining_ttl(inserted_at, original_ttl, now);
        let mut raw = BytesMut::from(&self.raw[..]);

        let mut offset = self.question_end;
        for _ in 0..self.header.answer_count {
            let record = RecordLayout::read(&raw, offset)?;
            raw[record.ttl_offset..record.ttl_offset + 4].copy_from_slice(&ttl.to_be_bytes());
            offset = record.end;
        }

        Ok(Message {
            raw: raw.freeze(),
            ..self.clone()
        })
    }

    /// Build a recursion-desired query for `name`.
    pub fn query(id: u16, name: &str, qtype: RecordType, qclass: RecordClass) -> Result<Message> {
        let header = DnsHeader {
            id,
            flags: 0x0100,
            question_count: 1,
            answer_count: 0,
            authority_count: 0,
            additional_count: 0,
        };
        let question = DnsQuestion {
            name: name.to_string(),
            qtype,
            qclass,
        };

        let mut raw = BytesMut::with_capacity(HEADER_LEN + name.len() + 6);
        raw.extend_from_slice(&header.to_bytes());
        raw.extend_from_slice(&question.to_bytes()?);
        Message::decode(raw.freeze())
    }

    /// Build a response to `query` carrying `answers` with uncompressed owner names.
    pub fn response(query: &Message, answers: &[DnsAnswer]) -> Result<Message> {
        let answer_count = u16::try_from(answers.len())
            .map_err(|_| ProxyError::malformed("too many answer records"))?;
        let header = DnsHeader {
            flags: query.header.flags | 0x8080, // QR + RA
            answer_count,
            authority_count: 0,
            additional_count: 0,
            ..query.header
        };

        let mut raw = BytesMut::new();
        raw.extend_from_slice(&header.to_bytes());
        raw.extend_from_slice(&query.raw[HEADER_LEN..query.question_end]);
        for answer in answers {
            raw.extend_from_slice(&answer.to_bytes()?);
        }
        Message::decode(raw.freeze())
    }
}

/// Seconds of validity left for an answer cached at `inserted_at`.
pub fn remaining_ttl(inserted_at: Instant, original_ttl: u32, now: Instant) -> u32 {
    let elapsed = now.saturating_duration_since(inserted_at).as_secs();
    u64::from(original_ttl).saturating_sub(elapsed) as u32
}
