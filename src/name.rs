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

//! Implementation of the [`Name`] type for domain names.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A validated, fully qualified domain name.
///
/// A `Name` is stored in presentation form with a trailing dot (the
/// root is `.`). Construction validates the RFC 1035 length limits and
/// restricts names to printable ASCII; escape sequences are not
/// supported, so a label never contains `.`, `\`, `"`, or whitespace.
/// This is a far more modest representation than a label-offset wire
/// buffer, but this server keys and compares records textually, so the
/// presentation form is the working form.
///
/// The original case of the name is preserved; [`PartialEq`] and
/// [`Hash`] are ASCII-case-insensitive, as the DNS requires.
#[derive(Clone, Debug)]
pub struct Name {
    text: Box<str>,
}

impl Name {
    /// Returns a `Name` representing the DNS root, `.`.
    pub fn root() -> Self {
        Self { text: ".".into() }
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        &*self.text == "."
    }

    /// Returns the presentation form of the `Name`, with its trailing
    /// dot.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns an iterator over the labels of the `Name`, from leftmost
    /// to rightmost. The null (root) label is not included, so the root
    /// yields no labels.
    pub fn labels(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.text.split('.').filter(|label| !label.is_empty())
    }

    /// Returns the number of non-null labels in the `Name`.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`, comparing ASCII-case-insensitively on label
    /// boundaries.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        let mut mine = self.labels().rev();
        let mut theirs = other.labels().rev();
        loop {
            match (mine.next(), theirs.next()) {
                (_, None) => return true,
                (None, Some(_)) => return false,
                (Some(a), Some(b)) => {
                    if !a.eq_ignore_ascii_case(b) {
                        return false;
                    }
                }
            }
        }
    }

    /// Appends the uncompressed on-the-wire representation of the
    /// `Name` to `buf`.
    pub fn to_wire(&self, buf: &mut Vec<u8>) {
        for label in self.labels() {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
    }

    /// Returns the length of the uncompressed on-the-wire
    /// representation of the `Name`.
    pub fn wire_len(&self) -> usize {
        self.labels().map(|label| label.len() + 1).sum::<usize>() + 1
    }

    /// Parses a (possibly compressed) name at index `start` of `msg`.
    /// Pointer targets are indices into `msg`, so `msg` should be an
    /// entire DNS message. On success, this returns the parsed `Name`
    /// and the number of contiguous octets read at `start` (2 if the
    /// name begins with a pointer label).
    ///
    /// Pointers must point strictly backward; this, along with the
    /// name length limit, bounds the parse.
    pub fn from_wire(msg: &[u8], start: usize) -> Result<(Self, usize), Error> {
        let mut text = String::new();
        let mut pos = start;
        let mut wire_len = 0;
        let mut consumed = None;

        loop {
            let octet = *msg.get(pos).ok_or(Error::UnexpectedEom)?;
            if octet == 0 {
                if consumed.is_none() {
                    consumed = Some(pos + 1 - start);
                }
                break;
            } else if octet & 0xc0 == 0xc0 {
                let next = *msg.get(pos + 1).ok_or(Error::UnexpectedEom)?;
                let target = usize::from(octet & 0x3f) << 8 | usize::from(next);
                if target >= pos {
                    return Err(Error::InvalidPointer);
                }
                if consumed.is_none() {
                    consumed = Some(pos + 2 - start);
                }
                pos = target;
            } else if octet & 0xc0 != 0 {
                return Err(Error::InvalidLabelType);
            } else {
                let len = octet as usize;
                wire_len += len + 1;
                if wire_len + 1 > MAX_WIRE_LEN {
                    return Err(Error::NameTooLong);
                }
                let label = msg
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(Error::UnexpectedEom)?;
                for &c in label {
                    if !is_allowed_octet(c) {
                        return Err(Error::BadOctet);
                    }
                    text.push(c as char);
                }
                text.push('.');
                pos += len + 1;
            }
        }

        let name = if text.is_empty() {
            Self::root()
        } else {
            Self { text: text.into() }
        };
        Ok((name, consumed.unwrap()))
    }
}

/// Returns whether an octet may appear in a label. Since escapes are
/// not supported in the presentation form, anything that would need
/// one is rejected.
fn is_allowed_octet(octet: u8) -> bool {
    octet.is_ascii_graphic() && octet != b'.' && octet != b'\\' && octet != b'"'
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.text.eq_ignore_ascii_case(&other.text)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in self.text.bytes() {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The string
/// must be strictly ASCII; a trailing dot is accepted but not
/// required.
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Self::root());
        }

        let without_dot = s.strip_suffix('.').unwrap_or(s);
        let mut wire_len = 1;
        for label in without_dot.split('.') {
            if label.is_empty() {
                return Err(Error::NullNonTerminal);
            } else if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong);
            }
            if !label.bytes().all(is_allowed_octet) {
                return Err(Error::BadOctet);
            }
            wire_len += label.len() + 1;
        }
        if wire_len > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }

        Ok(Self {
            text: format!("{}.", without_dot).into(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error type used to report problems constructing a [`Name`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A label contained an octet that is not allowed (escapes are not
    /// supported).
    BadOctet,

    /// An unknown label type was encountered while parsing a wire-form
    /// name.
    InvalidLabelType,

    /// An invalid (non-backward) pointer was encountered while parsing
    /// a compressed name.
    InvalidPointer,

    /// A label was longer than 63 octets.
    LabelTooLong,

    /// The name is too long (longer than 255 octets on the wire).
    NameTooLong,

    /// A null label was found in a non-terminal position.
    NullNonTerminal,

    /// When parsing a [`Name`] from a [`str`], the string was empty.
    StrEmpty,

    /// We unexpectedly encountered the end of the message while parsing
    /// the name.
    UnexpectedEom,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::BadOctet => f.write_str("label contains a disallowed octet"),
            Self::InvalidLabelType => f.write_str("unknown label type"),
            Self::InvalidPointer => f.write_str("invalid pointer"),
            Self::LabelTooLong => f.write_str("label is longer than 63 octets"),
            Self::NameTooLong => f.write_str("name is longer than 255 octets on the wire"),
            Self::NullNonTerminal => f.write_str("non-terminal label is null"),
            Self::StrEmpty => f.write_str("string was empty"),
            Self::UnexpectedEom => f.write_str("unexpected end of message"),
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

    #[test]
    fn fromstr_works() {
        let name: Name = "example.test.".parse().unwrap();
        assert_eq!(name.as_str(), "example.test.");
        let labels: Vec<&str> = name.labels().collect();
        assert_eq!(labels, ["example", "test"]);
    }

    #[test]
    fn fromstr_adds_trailing_dot() {
        let name: Name = "example.test".parse().unwrap();
        assert_eq!(name.as_str(), "example.test.");
    }

    #[test]
    fn fromstr_works_for_root() {
        let name: Name = ".".parse().unwrap();
        assert!(name.is_root());
        assert_eq!(name.label_count(), 0);
    }

    #[test]
    fn fromstr_rejects_empty() {
        assert_eq!("".parse::<Name>(), Err(Error::StrEmpty));
    }

    #[test]
    fn fromstr_rejects_non_ascii() {
        assert_eq!("✈.aero.".parse::<Name>(), Err(Error::BadOctet));
    }

    #[test]
    fn fromstr_rejects_null_non_terminal() {
        assert_eq!("a.b..c.".parse::<Name>(), Err(Error::NullNonTerminal));
    }

    #[test]
    fn fromstr_rejects_long_label() {
        assert_eq!(
            "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx.".parse::<Name>(),
            Err(Error::LabelTooLong)
        );
    }

    #[test]
    fn fromstr_rejects_long_name() {
        assert_eq!(
            "x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x."
                .parse::<Name>(),
            Err(Error::NameTooLong)
        );
    }

    #[test]
    fn eq_is_case_insensitive() {
        let a: Name = "WWW.Example.COM.".parse().unwrap();
        let b: Name = "www.example.com.".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn eq_or_subdomain_of_works() {
        let subdomain: Name = "subdomain.example.test.".parse().unwrap();
        let domain: Name = "example.test.".parse().unwrap();
        let other: Name = "xexample.test.".parse().unwrap();
        let root = Name::root();
        assert!(subdomain.eq_or_subdomain_of(&subdomain));
        assert!(subdomain.eq_or_subdomain_of(&domain));
        assert!(subdomain.eq_or_subdomain_of(&root));
        assert!(!domain.eq_or_subdomain_of(&subdomain));
        assert!(!other.eq_or_subdomain_of(&domain));
        assert!(!domain.eq_or_subdomain_of(&other));
    }

    #[test]
    fn wire_round_trip_works() {
        let name: Name = "a.bb.ccc.".parse().unwrap();
        let mut buf = Vec::new();
        name.to_wire(&mut buf);
        assert_eq!(buf, b"\x01a\x02bb\x03ccc\x00");
        assert_eq!(name.wire_len(), buf.len());
        let (parsed, consumed) = Name::from_wire(&buf, 0).unwrap();
        assert_eq!(parsed, name);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn from_wire_follows_pointers() {
        // "example.test." at offset 0, "www" + pointer to 0 at offset
        // 14.
        let mut msg = Vec::new();
        msg.extend_from_slice(b"\x07example\x04test\x00");
        msg.extend_from_slice(b"\x03www\xc0\x00");
        let (parsed, consumed) = Name::from_wire(&msg, 14).unwrap();
        assert_eq!(parsed, "www.example.test.".parse().unwrap());
        assert_eq!(consumed, 6);
    }

    #[test]
    fn from_wire_rejects_forward_pointers() {
        let msg = b"\x03www\xc0\x06\x00";
        assert_eq!(Name::from_wire(msg, 0), Err(Error::InvalidPointer));
    }

    #[test]
    fn from_wire_rejects_truncated_names() {
        let msg = b"\x07examp";
        assert_eq!(Name::from_wire(msg, 0), Err(Error::UnexpectedEom));
    }
}
