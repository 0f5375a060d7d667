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

//! Implementation of the [`Record`] type.

use std::fmt;
use std::str::FromStr;

use crate::class::Class;
use crate::name::{self, Name};

use super::Type;

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A single DNS resource record.
///
/// The canonical representation of a record in this server is its
/// presentation form, `owner ttl class type rdata` with tab-separated
/// header fields — this is the string the record store persists and
/// compares. `Display` produces that form and `FromStr` parses it
/// back. The RDATA is carried as an opaque presentation-form string;
/// it is validated only when converted to wire form (see
/// [`rdata`](super::rdata)).
///
/// Update records parsed from an RFC 2136 message may carry an empty
/// RDATA together with the sentinel classes NONE and ANY; such records
/// exist only transiently, inside an update batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    owner: Name,
    ttl: u32,
    class: Class,
    rr_type: Type,
    rdata: String,
}

impl Record {
    pub fn new(owner: Name, ttl: u32, class: Class, rr_type: Type, rdata: String) -> Self {
        Self {
            owner,
            ttl,
            class,
            rr_type,
            rdata,
        }
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn rr_type(&self) -> Type {
        self.rr_type
    }

    pub fn rdata(&self) -> &str {
        &self.rdata
    }

    /// Formats the record with the given TTL and class substituted for
    /// its own. RFC 2136 delete-an-RR requests arrive with TTL 0 and
    /// class NONE; rewriting a stored record's header this way lets
    /// the two be compared as strings.
    pub fn to_string_with(&self, ttl: u32, class: Class) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.owner, ttl, class, self.rr_type, self.rdata
        )
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.owner, self.ttl, self.class, self.rr_type, self.rdata
        )
    }
}

/// Splits the next whitespace-delimited token off the front of `rest`.
fn next_token<'a>(rest: &mut &'a str) -> Option<&'a str> {
    *rest = rest.trim_start();
    if rest.is_empty() {
        return None;
    }
    let end = rest
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let token = &rest[..end];
    *rest = &rest[end..];
    Some(token)
}

impl FromStr for Record {
    type Err = ParseRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s;
        let owner = next_token(&mut rest)
            .ok_or(ParseRecordError::MissingField("owner"))?
            .parse()
            .map_err(ParseRecordError::BadOwner)?;
        let ttl = next_token(&mut rest)
            .ok_or(ParseRecordError::MissingField("TTL"))?
            .parse()
            .or(Err(ParseRecordError::BadTtl))?;
        let class = next_token(&mut rest)
            .ok_or(ParseRecordError::MissingField("class"))?
            .parse()
            .or(Err(ParseRecordError::BadClass))?;
        let rr_type = next_token(&mut rest)
            .ok_or(ParseRecordError::MissingField("type"))?
            .parse()
            .or(Err(ParseRecordError::BadType))?;
        let rdata = rest.trim();
        if rdata.is_empty() {
            return Err(ParseRecordError::MissingField("RDATA"));
        }
        Ok(Self {
            owner,
            ttl,
            class,
            rr_type,
            rdata: rdata.to_owned(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a stored record string could not be parsed
/// back into a [`Record`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseRecordError {
    BadClass,
    BadOwner(name::Error),
    BadTtl,
    BadType,
    MissingField(&'static str),
}

impl fmt::Display for ParseRecordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadClass => f.write_str("invalid class"),
            Self::BadOwner(error) => write!(f, "invalid owner name: {}", error),
            Self::BadTtl => f.write_str("invalid TTL"),
            Self::BadType => f.write_str("invalid RR type"),
            Self::MissingField(field) => write!(f, "missing {} field", field),
        }
    }
}

impl std::error::Error for ParseRecordError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_fromstr_round_trip() {
        let record = Record::new(
            "www.example.test.".parse().unwrap(),
            3600,
            Class::IN,
            Type::A,
            "10.0.0.1".into(),
        );
        let text = record.to_string();
        assert_eq!(text, "www.example.test.\t3600\tIN\tA\t10.0.0.1");
        assert_eq!(text.parse::<Record>().unwrap(), record);
    }

    #[test]
    fn fromstr_accepts_space_separated_input() {
        let record: Record = "www.example.test. 300 IN TXT \"a b c\"".parse().unwrap();
        assert_eq!(record.ttl(), 300);
        assert_eq!(record.rr_type(), Type::TXT);
        assert_eq!(record.rdata(), "\"a b c\"");
    }

    #[test]
    fn fromstr_rejects_missing_fields() {
        assert_eq!(
            "www.example.test. 300 IN".parse::<Record>(),
            Err(ParseRecordError::MissingField("type"))
        );
        assert_eq!(
            "www.example.test. 300 IN A".parse::<Record>(),
            Err(ParseRecordError::MissingField("RDATA"))
        );
    }

    #[test]
    fn fromstr_rejects_bad_ttl() {
        assert_eq!(
            "www.example.test. soon IN A 10.0.0.1".parse::<Record>(),
            Err(ParseRecordError::BadTtl)
        );
    }

    #[test]
    fn to_string_with_substitutes_header_fields() {
        let record: Record = "www.example.test. 3600 IN A 10.0.0.1".parse().unwrap();
        assert_eq!(
            record.to_string_with(0, Class::NONE),
            "www.example.test.\t0\tNONE\tA\t10.0.0.1"
        );
    }
}
