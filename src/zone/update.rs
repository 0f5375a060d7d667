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

//! The RFC 2136 update transaction engine.
//!
//! [`apply`] interprets an update batch against a working copy of the
//! record table and returns the new table on success. The live table
//! is never touched: the caller installs the working copy only after
//! it has been persisted, so a failed batch (or a failed save) leaves
//! the zone exactly as it was.

use crate::class::Class;
use crate::key;
use crate::rr::{Record, Type};
use crate::store::RecordTable;

use super::Error;

/// Applies an update batch to a copy of `table`, returning the updated
/// copy. The first error abandons the whole batch.
///
/// Update RRs are classified per [RFC 2136 § 2.5]:
///
/// * CLASS ANY, empty RDATA, TYPE ANY: delete every record at the name
///   and below it.
/// * CLASS ANY, empty RDATA, any other TYPE: delete the RRset of that
///   type at the name.
/// * CLASS NONE, TTL 0: delete the one record whose data matches.
/// * CLASS IN: add the record.
///
/// Deletions of absent records are no-ops. Anything else is ignored.
///
/// [RFC 2136 § 2.5]: https://datatracker.ietf.org/doc/html/rfc2136#section-2.5
pub(super) fn apply(table: &RecordTable, batch: &[Record]) -> Result<RecordTable, Error> {
    let mut working = table.clone();
    for rr in batch {
        if rr.class() == Class::ANY && rr.rdata().is_empty() {
            if rr.rr_type() == Type::ANY {
                working.remove_subtree(&key::prefix_for(rr.owner()));
            } else {
                working.remove(&key::exact_for(rr.owner(), rr.rr_type()));
            }
        } else if rr.class() == Class::NONE && rr.ttl() == 0 {
            omit(&mut working, rr)?;
        } else if rr.class() == Class::IN && !rr.rdata().is_empty() {
            store(&mut working, rr)?;
        }
    }
    Ok(working)
}

/// Adds one record, enforcing CNAME mutual exclusivity and silently
/// dropping exact duplicates.
fn store(working: &mut RecordTable, rr: &Record) -> Result<(), Error> {
    let canonical = rr.to_string();
    if rr.rr_type() == Type::CNAME {
        // A CNAME may not join records of any type at its name, its
        // own included; only the exact duplicate is accepted, as a
        // no-op.
        let cname_key = key::exact_for(rr.owner(), Type::CNAME);
        if let Some(existing) = working.get(&cname_key) {
            return if existing.iter().any(|stored| *stored == canonical) {
                Ok(())
            } else {
                Err(Error::ConflictExists)
            };
        }
        // Keys for the name itself continue the prefix with `_`;
        // descendant names (which continue it with `.`) do not
        // conflict.
        let prefix = key::prefix_for(rr.owner());
        let occupied = working.subtree_keys(&prefix).any(|key| {
            key.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('_'))
        });
        if occupied {
            return Err(Error::ConflictExists);
        }
    } else if working.get(&key::exact_for(rr.owner(), Type::CNAME)).is_some() {
        return Err(Error::ConflictExists);
    }

    let exact = key::exact_for(rr.owner(), rr.rr_type());
    if let Some(existing) = working.get(&exact) {
        if existing.iter().any(|stored| *stored == canonical) {
            return Ok(());
        }
    }
    working.push(&exact, canonical);
    Ok(())
}

/// Deletes the one stored record matching the incoming delete request.
/// The comparison rewrites both sides to TTL 0 and class NONE (the
/// header a delete request arrives with) and ignores case.
fn omit(working: &mut RecordTable, rr: &Record) -> Result<(), Error> {
    let exact = key::exact_for(rr.owner(), rr.rr_type());
    let target = rr.to_string_with(0, Class::NONE).to_lowercase();
    let existing = match working.get(&exact) {
        Some(existing) => existing,
        None => return Ok(()),
    };
    let mut kept = Vec::with_capacity(existing.len());
    for text in existing {
        let stored: Record = text.parse()?;
        if stored.to_string_with(0, Class::NONE).to_lowercase() != target {
            kept.push(text.clone());
        }
    }
    working.replace(&exact, kept);
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
