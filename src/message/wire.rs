// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The DNS message wire codec.
//!
//! [`parse`] decodes a received message into a [`Message`], following
//! compression pointers and converting record sections into
//! presentation form. [`write`] serializes a response; names are
//! written uncompressed. A response that exceeds the caller's size
//! limit is rewritten with the record sections dropped and TC set.

use std::fmt;

use crate::class::Class;
use crate::name::{self, Name};
use crate::rr::{rdata, Record, Type};

use super::tsig::ReadTsig;
use super::{Message, Opcode, Question, Rcode};

/// The length of the DNS message header.
pub const HEADER_LEN: usize = 12;

////////////////////////////////////////////////////////////////////////
// PARSING                                                            //
////////////////////////////////////////////////////////////////////////

/// Decodes a DNS message.
pub fn parse(buf: &[u8]) -> Result<Message, Error> {
    if buf.len() < HEADER_LEN {
        return Err(Error::Truncated);
    }
    let id = u16::from_be_bytes(buf[0..2].try_into().unwrap());
    let flags_hi = buf[2];
    let flags_lo = buf[3];
    let qdcount = u16::from_be_bytes(buf[4..6].try_into().unwrap());
    let ancount = u16::from_be_bytes(buf[6..8].try_into().unwrap());
    let nscount = u16::from_be_bytes(buf[8..10].try_into().unwrap());
    let arcount = u16::from_be_bytes(buf[10..12].try_into().unwrap());

    let mut message = Message {
        id,
        qr: flags_hi & 0x80 != 0,
        opcode: Opcode::from(flags_hi >> 3),
        aa: flags_hi & 0x04 != 0,
        tc: flags_hi & 0x02 != 0,
        rd: flags_hi & 0x01 != 0,
        rcode: Rcode::from(flags_lo),
        ..Message::default()
    };

    let mut pos = HEADER_LEN;
    for _ in 0..qdcount {
        let (qname, consumed) = Name::from_wire(buf, pos)?;
        pos += consumed;
        let qtype = read_u16(buf, pos)?;
        let qclass = read_u16(buf, pos + 2)?;
        pos += 4;
        message.questions.push(Question {
            qname,
            qtype: Type::from(qtype),
            qclass: Class::from(qclass),
        });
    }

    for section in 0..3 {
        let count = match section {
            0 => ancount,
            1 => nscount,
            _ => arcount,
        };
        for i in 0..count {
            let rr_start = pos;
            let (record, consumed) = parse_rr(buf, pos)?;
            pos += consumed;
            match section {
                0 => message.answers.push(record),
                1 => message.authority.push(record),
                _ => {
                    if record.rr_type() == Type::TSIG {
                        // RFC 8945 § 5.1: the TSIG RR must be the last
                        // record of the additional section.
                        if i + 1 != count {
                            return Err(Error::TsigNotLast);
                        }
                        message.tsig = Some(ReadTsig::parse(buf, rr_start)?);
                    } else {
                        message.additional.push(record);
                    }
                }
            }
        }
    }

    Ok(message)
}

/// Parses one resource record at index `start` of `msg`, returning the
/// record and the number of octets consumed.
fn parse_rr(msg: &[u8], start: usize) -> Result<(Record, usize), Error> {
    let (owner, name_len) = Name::from_wire(msg, start)?;
    let fixed = start + name_len;
    let rr_type = Type::from(read_u16(msg, fixed)?);
    let class = Class::from(read_u16(msg, fixed + 2)?);
    let ttl_octets = msg.get(fixed + 4..fixed + 8).ok_or(Error::Truncated)?;
    let ttl = u32::from_be_bytes(ttl_octets.try_into().unwrap());
    let rdlength = read_u16(msg, fixed + 8)? as usize;
    let rdata_start = fixed + 10;
    if msg.len() < rdata_start + rdlength {
        return Err(Error::Truncated);
    }
    let rdata = if rdlength == 0 {
        // RFC 2136 delete requests carry empty RDATA.
        String::new()
    } else {
        rdata::to_text(rr_type, msg, rdata_start, rdlength)?
    };
    let record = Record::new(owner, ttl, class, rr_type, rdata);
    Ok((record, name_len + 10 + rdlength))
}

pub(super) fn read_u16(msg: &[u8], offset: usize) -> Result<u16, Error> {
    msg.get(offset..offset + 2)
        .map(|octets| u16::from_be_bytes(octets.try_into().unwrap()))
        .ok_or(Error::Truncated)
}

////////////////////////////////////////////////////////////////////////
// WRITING                                                            //
////////////////////////////////////////////////////////////////////////

/// Serializes a response message. If the result would exceed
/// `size_limit`, the record sections are dropped and TC is set
/// instead.
pub fn write(message: &Message, size_limit: usize) -> Result<Vec<u8>, Error> {
    let buf = write_unchecked(message, false)?;
    if buf.len() <= size_limit {
        return Ok(buf);
    }
    write_unchecked(message, true)
}

fn write_unchecked(message: &Message, truncate: bool) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(512);
    buf.extend_from_slice(&message.id.to_be_bytes());
    let mut flags_hi = u8::from(message.opcode) << 3;
    if message.qr {
        flags_hi |= 0x80;
    }
    if message.aa {
        flags_hi |= 0x04;
    }
    if message.tc || truncate {
        flags_hi |= 0x02;
    }
    if message.rd {
        flags_hi |= 0x01;
    }
    buf.push(flags_hi);
    buf.push(u8::from(message.rcode));
    buf.extend_from_slice(&(message.questions.len() as u16).to_be_bytes());
    if truncate {
        buf.extend_from_slice(&[0; 6]);
    } else {
        buf.extend_from_slice(&(message.answers.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(message.authority.len() as u16).to_be_bytes());
        buf.extend_from_slice(&(message.additional.len() as u16).to_be_bytes());
    }

    for question in &message.questions {
        question.qname.to_wire(&mut buf);
        buf.extend_from_slice(&u16::from(question.qtype).to_be_bytes());
        buf.extend_from_slice(&u16::from(question.qclass).to_be_bytes());
    }
    if !truncate {
        for record in message
            .answers
            .iter()
            .chain(&message.authority)
            .chain(&message.additional)
        {
            write_rr(record, &mut buf)?;
        }
    }
    Ok(buf)
}

/// Serializes one resource record, uncompressed.
pub fn write_rr(record: &Record, buf: &mut Vec<u8>) -> Result<(), Error> {
    record.owner().to_wire(buf);
    buf.extend_from_slice(&u16::from(record.rr_type()).to_be_bytes());
    buf.extend_from_slice(&u16::from(record.class()).to_be_bytes());
    buf.extend_from_slice(&record.ttl().to_be_bytes());
    let rdlength_at = buf.len();
    buf.extend_from_slice(&[0, 0]);
    if !record.rdata().is_empty() {
        rdata::to_wire(record.rr_type(), record.rdata(), buf)?;
    }
    let rdlength = (buf.len() - rdlength_at - 2) as u16;
    buf[rdlength_at..rdlength_at + 2].copy_from_slice(&rdlength.to_be_bytes());
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while reading or writing a DNS message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// A domain name in the message was invalid.
    Name(name::Error),

    /// RDATA could not be converted between forms.
    Rdata(rdata::Error),

    /// The message ended before the advertised contents.
    Truncated,

    /// A TSIG RR was present but was not the final additional record.
    TsigNotLast,

    /// The TSIG RR itself was malformed.
    BadTsig,
}

impl From<name::Error> for Error {
    fn from(error: name::Error) -> Self {
        Self::Name(error)
    }
}

impl From<rdata::Error> for Error {
    fn from(error: rdata::Error) -> Self {
        Self::Rdata(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Name(error) => write!(f, "invalid domain name: {}", error),
            Self::Rdata(error) => write!(f, "invalid RDATA: {}", error),
            Self::Truncated => f.write_str("message is truncated"),
            Self::TsigNotLast => f.write_str("TSIG RR is not the last record"),
            Self::BadTsig => f.write_str("TSIG RR is malformed"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
