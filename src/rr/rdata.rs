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

//! Conversion of RDATA between presentation and wire form.
//!
//! The record store works with records in presentation form, while the
//! transport works with wire form, so every record that enters or
//! leaves the server passes through this module. RR types with
//! structured presentation formats are handled individually; everything
//! else round-trips through the RFC 3597 generic form (`\# <length>
//! <hex>`).

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::{self, Name};
use crate::util::{hex_digit_to_nibble, push_hex};

use super::Type;

////////////////////////////////////////////////////////////////////////
// WIRE-TO-PRESENTATION CONVERSION                                    //
////////////////////////////////////////////////////////////////////////

/// Converts the RDATA of an RR of type `rr_type` into presentation
/// form. The RDATA starts at index `start` of `msg` and is `rdlength`
/// octets long; the full message is required because RDATA domain names
/// may be compressed.
pub fn to_text(
    rr_type: Type,
    msg: &[u8],
    start: usize,
    rdlength: usize,
) -> Result<String, Error> {
    let rdata = msg
        .get(start..start + rdlength)
        .ok_or(Error::Truncated)?;
    match rr_type {
        Type::A => {
            let octets: [u8; 4] = rdata.try_into().or(Err(Error::Truncated))?;
            Ok(Ipv4Addr::from(octets).to_string())
        }
        Type::AAAA => {
            let octets: [u8; 16] = rdata.try_into().or(Err(Error::Truncated))?;
            Ok(Ipv6Addr::from(octets).to_string())
        }
        Type::CNAME | Type::NS | Type::PTR => {
            let (target, consumed) = Name::from_wire(msg, start)?;
            if consumed != rdlength {
                return Err(Error::Truncated);
            }
            Ok(target.to_string())
        }
        Type::MX => {
            let preference = read_u16(rdata, 0)?;
            let (exchange, consumed) = Name::from_wire(msg, start + 2)?;
            if consumed + 2 != rdlength {
                return Err(Error::Truncated);
            }
            Ok(format!("{} {}", preference, exchange))
        }
        Type::SRV => {
            let priority = read_u16(rdata, 0)?;
            let weight = read_u16(rdata, 2)?;
            let port = read_u16(rdata, 4)?;
            let (target, consumed) = Name::from_wire(msg, start + 6)?;
            if consumed + 6 != rdlength {
                return Err(Error::Truncated);
            }
            Ok(format!("{} {} {} {}", priority, weight, port, target))
        }
        Type::TXT => {
            if rdata.is_empty() {
                return Err(Error::Truncated);
            }
            let mut text = String::new();
            let mut pos = 0;
            while pos < rdata.len() {
                let len = rdata[pos] as usize;
                let chunk = rdata
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(Error::Truncated)?;
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push('"');
                for &octet in chunk {
                    if !octet.is_ascii() || octet.is_ascii_control() {
                        return Err(Error::BadOctet);
                    }
                    if octet == b'"' || octet == b'\\' {
                        text.push('\\');
                    }
                    text.push(octet as char);
                }
                text.push('"');
                pos += 1 + len;
            }
            Ok(text)
        }
        Type::SOA => {
            let (mname, mname_len) = Name::from_wire(msg, start)?;
            let (rname, rname_len) = Name::from_wire(msg, start + mname_len)?;
            let fixed = start + mname_len + rname_len;
            let fixed_octets = msg
                .get(fixed..fixed + 20)
                .ok_or(Error::Truncated)?;
            if mname_len + rname_len + 20 != rdlength {
                return Err(Error::Truncated);
            }
            let serial = u32::from_be_bytes(fixed_octets[0..4].try_into().unwrap());
            let refresh = u32::from_be_bytes(fixed_octets[4..8].try_into().unwrap());
            let retry = u32::from_be_bytes(fixed_octets[8..12].try_into().unwrap());
            let expire = u32::from_be_bytes(fixed_octets[12..16].try_into().unwrap());
            let minimum = u32::from_be_bytes(fixed_octets[16..20].try_into().unwrap());
            Ok(format!(
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ))
        }
        _ => {
            // RFC 3597 § 5 generic form.
            let mut text = format!("\\# {}", rdata.len());
            if !rdata.is_empty() {
                text.push(' ');
                push_hex(rdata, &mut text);
            }
            Ok(text)
        }
    }
}

fn read_u16(rdata: &[u8], offset: usize) -> Result<u16, Error> {
    rdata
        .get(offset..offset + 2)
        .map(|octets| u16::from_be_bytes(octets.try_into().unwrap()))
        .ok_or(Error::Truncated)
}

////////////////////////////////////////////////////////////////////////
// PRESENTATION-TO-WIRE CONVERSION                                    //
////////////////////////////////////////////////////////////////////////

/// Converts RDATA in presentation form into wire form, appending it to
/// `buf`. Domain names embedded in RDATA are written uncompressed.
pub fn to_wire(rr_type: Type, text: &str, buf: &mut Vec<u8>) -> Result<(), Error> {
    if text.starts_with("\\#") {
        return generic_to_wire(text, buf);
    }
    match rr_type {
        Type::A => {
            let addr: Ipv4Addr = text.parse().or(Err(Error::BadText("invalid A RDATA")))?;
            buf.extend_from_slice(&addr.octets());
            Ok(())
        }
        Type::AAAA => {
            let addr: Ipv6Addr = text
                .parse()
                .or(Err(Error::BadText("invalid AAAA RDATA")))?;
            buf.extend_from_slice(&addr.octets());
            Ok(())
        }
        Type::CNAME | Type::NS | Type::PTR => {
            let target: Name = text.parse()?;
            target.to_wire(buf);
            Ok(())
        }
        Type::MX => {
            let mut fields = text.split_ascii_whitespace();
            let preference: u16 = next_int(&mut fields, "MX preference")?;
            let exchange: Name = next_name(&mut fields, "MX exchange")?;
            expect_end(&mut fields)?;
            buf.extend_from_slice(&preference.to_be_bytes());
            exchange.to_wire(buf);
            Ok(())
        }
        Type::SRV => {
            let mut fields = text.split_ascii_whitespace();
            let priority: u16 = next_int(&mut fields, "SRV priority")?;
            let weight: u16 = next_int(&mut fields, "SRV weight")?;
            let port: u16 = next_int(&mut fields, "SRV port")?;
            let target: Name = next_name(&mut fields, "SRV target")?;
            expect_end(&mut fields)?;
            buf.extend_from_slice(&priority.to_be_bytes());
            buf.extend_from_slice(&weight.to_be_bytes());
            buf.extend_from_slice(&port.to_be_bytes());
            target.to_wire(buf);
            Ok(())
        }
        Type::TXT => txt_to_wire(text, buf),
        Type::SOA => {
            let mut fields = text.split_ascii_whitespace();
            let mname: Name = next_name(&mut fields, "SOA MNAME")?;
            let rname: Name = next_name(&mut fields, "SOA RNAME")?;
            let serial: u32 = next_int(&mut fields, "SOA serial")?;
            let refresh: u32 = next_int(&mut fields, "SOA refresh")?;
            let retry: u32 = next_int(&mut fields, "SOA retry")?;
            let expire: u32 = next_int(&mut fields, "SOA expire")?;
            let minimum: u32 = next_int(&mut fields, "SOA minimum")?;
            expect_end(&mut fields)?;
            mname.to_wire(buf);
            rname.to_wire(buf);
            buf.extend_from_slice(&serial.to_be_bytes());
            buf.extend_from_slice(&refresh.to_be_bytes());
            buf.extend_from_slice(&retry.to_be_bytes());
            buf.extend_from_slice(&expire.to_be_bytes());
            buf.extend_from_slice(&minimum.to_be_bytes());
            Ok(())
        }
        _ => Err(Error::BadText(
            "unknown RR type RDATA must use the RFC 3597 generic form",
        )),
    }
}

/// Parses the RFC 3597 generic RDATA form, `\# <length> <hex>`.
fn generic_to_wire(text: &str, buf: &mut Vec<u8>) -> Result<(), Error> {
    let mut fields = text.split_ascii_whitespace();
    if fields.next() != Some("\\#") {
        return Err(Error::BadText("malformed generic RDATA"));
    }
    let len: usize = next_int(&mut fields, "generic RDATA length")?;
    let start = buf.len();
    for field in fields {
        let mut octets = field.bytes();
        while let Some(high) = octets.next() {
            let low = octets
                .next()
                .ok_or(Error::BadText("odd number of hex digits"))?;
            let high = hex_digit_to_nibble(high).ok_or(Error::BadText("invalid hex digit"))?;
            let low = hex_digit_to_nibble(low).ok_or(Error::BadText("invalid hex digit"))?;
            buf.push(high << 4 | low);
        }
    }
    if buf.len() - start != len {
        buf.truncate(start);
        return Err(Error::BadText("generic RDATA length mismatch"));
    }
    Ok(())
}

/// Parses TXT presentation RDATA: one or more `"`-quoted character
/// strings with `\\` and `\"` escapes.
fn txt_to_wire(text: &str, buf: &mut Vec<u8>) -> Result<(), Error> {
    let mut octets = text.bytes().peekable();
    let mut wrote_any = false;
    loop {
        while octets.next_if(|&o| o == b' ' || o == b'\t').is_some() {}
        match octets.next() {
            None => break,
            Some(b'"') => (),
            Some(_) => return Err(Error::BadText("TXT RDATA must be quoted")),
        }
        let mut chunk = Vec::new();
        loop {
            match octets.next().ok_or(Error::BadText("unterminated TXT string"))? {
                b'"' => break,
                b'\\' => {
                    let escaped = octets
                        .next()
                        .ok_or(Error::BadText("unterminated TXT escape"))?;
                    chunk.push(escaped);
                }
                octet => chunk.push(octet),
            }
        }
        if chunk.len() > 255 {
            return Err(Error::BadText("TXT string is longer than 255 octets"));
        }
        buf.push(chunk.len() as u8);
        buf.extend_from_slice(&chunk);
        wrote_any = true;
    }
    if wrote_any {
        Ok(())
    } else {
        Err(Error::BadText("TXT RDATA is empty"))
    }
}

fn next_int<'a, T, I>(fields: &mut I, what: &'static str) -> Result<T, Error>
where
    T: std::str::FromStr,
    I: Iterator<Item = &'a str>,
{
    fields
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or(Error::BadText(what))
}

fn next_name<'a, I>(fields: &mut I, what: &'static str) -> Result<Name, Error>
where
    I: Iterator<Item = &'a str>,
{
    fields
        .next()
        .ok_or(Error::BadText(what))?
        .parse()
        .or(Err(Error::BadText(what)))
}

fn expect_end<'a, I>(fields: &mut I) -> Result<(), Error>
where
    I: Iterator<Item = &'a str>,
{
    if fields.next().is_none() {
        Ok(())
    } else {
        Err(Error::BadText("extra fields in RDATA"))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while converting RDATA between forms.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// A disallowed octet appeared in wire-form character-string data.
    BadOctet,

    /// The presentation form could not be parsed.
    BadText(&'static str),

    /// A domain name in the RDATA was invalid.
    Name(name::Error),

    /// The wire form ended early or did not match RDLENGTH.
    Truncated,
}

impl From<name::Error> for Error {
    fn from(error: name::Error) -> Self {
        Self::Name(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadOctet => f.write_str("disallowed octet in character-string"),
            Self::BadText(what) => write!(f, "invalid RDATA presentation form: {}", what),
            Self::Name(error) => write!(f, "invalid domain name in RDATA: {}", error),
            Self::Truncated => f.write_str("RDATA wire form is truncated"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(rr_type: Type, text: &str) {
        let mut wire = Vec::new();
        to_wire(rr_type, text, &mut wire).unwrap();
        let back = to_text(rr_type, &wire, 0, wire.len()).unwrap();
        assert_eq!(back, text);
    }

    #[test]
    fn a_round_trips() {
        round_trip(Type::A, "10.0.0.1");
    }

    #[test]
    fn aaaa_round_trips() {
        round_trip(Type::AAAA, "2001:db8::1");
    }

    #[test]
    fn cname_round_trips() {
        round_trip(Type::CNAME, "target.example.test.");
    }

    #[test]
    fn mx_round_trips() {
        round_trip(Type::MX, "10 mail.example.test.");
    }

    #[test]
    fn srv_round_trips() {
        round_trip(Type::SRV, "0 5 5060 sip.example.test.");
    }

    #[test]
    fn txt_round_trips() {
        round_trip(Type::TXT, "\"hello world\" \"with \\\" quote\"");
    }

    #[test]
    fn soa_round_trips() {
        round_trip(
            Type::SOA,
            "localhost. nobody. 1700000000 28800 7200 2419200 1200",
        );
    }

    #[test]
    fn unknown_type_uses_generic_form() {
        let wire = [0xde, 0xad, 0xbe, 0xef];
        let text = to_text(Type::from(999), &wire, 0, 4).unwrap();
        assert_eq!(text, "\\# 4 deadbeef");
        let mut back = Vec::new();
        to_wire(Type::from(999), &text, &mut back).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn generic_form_rejects_length_mismatch() {
        let mut buf = Vec::new();
        assert_eq!(
            to_wire(Type::from(999), "\\# 3 deadbeef", &mut buf),
            Err(Error::BadText("generic RDATA length mismatch"))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn compressed_rdata_names_are_followed() {
        // A message fragment: "example.test." at offset 0, then CNAME
        // RDATA at offset 14 consisting of "www" + pointer to 0.
        let mut msg = Vec::new();
        msg.extend_from_slice(b"\x07example\x04test\x00");
        msg.extend_from_slice(b"\x03www\xc0\x00");
        let text = to_text(Type::CNAME, &msg, 14, 6).unwrap();
        assert_eq!(text, "www.example.test.");
    }

    #[test]
    fn a_rejects_short_rdata() {
        assert_eq!(to_text(Type::A, &[10, 0, 0], 0, 3), Err(Error::Truncated));
    }
}
