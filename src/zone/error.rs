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

//! Implementation of the [`Error`] type for zone-engine errors.

use std::fmt;

use crate::rr::ParseRecordError;
use crate::store;

/// An error produced by the zone engine (lookups, update transactions,
/// or persistence).
///
/// Malformed domain names never reach the engine as such: names are
/// validated when parsed from the wire or from presentation format, and
/// a stored record whose owner fails to parse surfaces here as
/// [`MalformedRecord`](Error::MalformedRecord).
#[derive(Debug)]
pub enum Error {
    /// A name may hold either a CNAME record or records of other
    /// types, never both; an update tried to violate this.
    ConflictExists,

    /// A stored or incoming record string could not be parsed back
    /// into structured form. This is a data-corruption signal and is
    /// fatal to the enclosing batch or query.
    MalformedRecord(ParseRecordError),

    /// A lookup matched nothing. This is the normal "no such record"
    /// outcome, not a protocol error; it drives the CNAME-chase
    /// fallback.
    NotFound,

    /// The record database could not be loaded or saved.
    Store(store::Error),
}

impl From<ParseRecordError> for Error {
    fn from(error: ParseRecordError) -> Self {
        Self::MalformedRecord(error)
    }
}

impl From<store::Error> for Error {
    fn from(error: store::Error) -> Self {
        Self::Store(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConflictExists => {
                f.write_str("a CNAME record cannot coexist with other records at a name")
            }
            Self::MalformedRecord(error) => write!(f, "malformed record: {}", error),
            Self::NotFound => f.write_str("record not found"),
            Self::Store(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedRecord(error) => Some(error),
            Self::Store(error) => Some(error),
            _ => None,
        }
    }
}
