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

//! Query resolution against a [`RecordTable`] snapshot.
//!
//! Questions are answered in a fixed priority order: synthesized apex
//! NS and SOA records, AXFR envelopes, stored-record lookups, and
//! finally a bounded CNAME chase for names that only resolve through
//! an alias.

use std::collections::HashSet;

use crate::class::Class;
use crate::key;
use crate::message::Question;
use crate::name::Name;
use crate::rr::{Record, Type};
use crate::store::RecordTable;

use super::{Error, Zone};

/// The TTL of synthesized apex NS, SOA, and name-server A records.
const APEX_TTL: u32 = 3600;

/// The fixed timer fields of the synthesized SOA record: refresh,
/// retry, expire, and minimum.
const SOA_TIMERS: (u32, u32, u32, u32) = (28800, 7200, 2419200, 1200);

/// The maximum number of CNAME links followed for one question.
const MAX_CHASE_LEN: usize = 8;

/// A resolved answer: the records for the answer section, plus any
/// records for the additional section.
#[derive(Debug, Default)]
pub(super) struct Answer {
    pub records: Vec<Record>,
    pub extra: Vec<Record>,
}

/// Resolves one question against a table snapshot. `NotFound` is the
/// ordinary empty outcome, not a failure of the zone.
pub(super) fn resolve(
    zone: &Zone,
    table: &RecordTable,
    serial: u32,
    question: &Question,
) -> Result<Answer, Error> {
    if question.qname == zone.name {
        match question.qtype {
            Type::NS => {
                return Ok(Answer {
                    records: vec![ns_rr(zone)],
                    extra: vec![ns_a_rr(zone)],
                });
            }
            Type::SOA => {
                return Ok(Answer {
                    records: vec![soa_rr(zone, serial)],
                    ..Answer::default()
                });
            }
            Type::AXFR => return axfr(zone, table, serial),
            _ => (),
        }
    }

    match lookup(table, &question.qname, question.qtype) {
        Ok(records) => Ok(Answer {
            records,
            ..Answer::default()
        }),
        Err(Error::NotFound) if question.qtype != Type::CNAME => Ok(Answer {
            records: chase_cname(zone, table, &question.qname, question.qtype)?,
            ..Answer::default()
        }),
        Err(e) => Err(e),
    }
}

/// Synthesizes the apex NS record.
fn ns_rr(zone: &Zone) -> Record {
    Record::new(
        zone.name.clone(),
        APEX_TTL,
        Class::IN,
        Type::NS,
        zone.ns_name.to_string(),
    )
}

/// Synthesizes the A record gluing the name server to the configured
/// local address.
fn ns_a_rr(zone: &Zone) -> Record {
    Record::new(
        zone.ns_name.clone(),
        APEX_TTL,
        Class::IN,
        Type::A,
        zone.local_addr.to_string(),
    )
}

/// Synthesizes the apex SOA record. The serial is the last-modified
/// Unix time of the backing database file.
fn soa_rr(zone: &Zone, serial: u32) -> Record {
    let (refresh, retry, expire, minimum) = SOA_TIMERS;
    Record::new(
        zone.name.clone(),
        APEX_TTL,
        Class::IN,
        Type::SOA,
        format!(
            "localhost. nobody. {} {} {} {} {}",
            serial, refresh, retry, expire, minimum
        ),
    )
}

/// Produces the AXFR envelope: SOA, NS, name-server A, every stored
/// record in stable key order, and the SOA again.
fn axfr(zone: &Zone, table: &RecordTable, serial: u32) -> Result<Answer, Error> {
    let soa = soa_rr(zone, serial);
    let mut records = vec![soa.clone(), ns_rr(zone), ns_a_rr(zone)];
    for text in table.records() {
        records.push(text.parse()?);
    }
    records.push(soa);
    Ok(Answer {
        records,
        ..Answer::default()
    })
}

/// Fetches the records stored for a (name, type) pair; `Type::ANY`
/// fetches the whole subtree below the name.
///
/// An empty fetch is `NotFound`. A non-empty fetch is filtered by
/// owner-name equality with the question name; the filtered result may
/// legitimately be empty (descendant names matched but the queried
/// name itself holds nothing), and that is a successful empty answer
/// rather than `NotFound`.
fn lookup(table: &RecordTable, qname: &Name, qtype: Type) -> Result<Vec<Record>, Error> {
    let mut fetched: Vec<&str> = Vec::new();
    if qtype == Type::ANY {
        let prefix = key::prefix_for(qname);
        for key in table.subtree_keys(&prefix) {
            if let Some(records) = table.get(key) {
                fetched.extend(records.iter().map(String::as_str));
            }
        }
    } else if let Some(records) = table.get(&key::exact_for(qname, qtype)) {
        fetched.extend(records.iter().map(String::as_str));
    }
    if fetched.is_empty() {
        return Err(Error::NotFound);
    }

    let mut records = Vec::new();
    for text in fetched {
        let record: Record = text.parse()?;
        if record.owner() == qname {
            records.push(record);
        }
    }
    Ok(records)
}

/// Answers a question through its CNAME chain.
///
/// The chain is followed only while the alias target stays inside the
/// zone, for at most [`MAX_CHASE_LEN`] links, and never through a name
/// already visited. At each link, records typed CNAME or the original
/// QTYPE are kept.
fn chase_cname(
    zone: &Zone,
    table: &RecordTable,
    qname: &Name,
    qtype: Type,
) -> Result<Vec<Record>, Error> {
    let mut answers = Vec::new();
    let mut visited: HashSet<Name> = HashSet::new();
    let mut current = qname.clone();
    let mut fetch_type = Type::CNAME;

    for _ in 0..MAX_CHASE_LEN {
        if !visited.insert(current.clone()) {
            break;
        }
        let fetched = match lookup(table, &current, fetch_type) {
            Ok(records) => records,
            Err(Error::NotFound) => break,
            Err(e) => return Err(e),
        };
        let mut next = None;
        for record in fetched {
            if record.rr_type() != Type::CNAME && record.rr_type() != qtype {
                continue;
            }
            if record.rr_type() == Type::CNAME {
                // A target outside the zone (or unparseable) ends the
                // chase; the client follows it elsewhere.
                if let Ok(target) = record.rdata().parse::<Name>() {
                    if target.eq_or_subdomain_of(&zone.name) {
                        next = Some(target);
                    }
                }
            }
            answers.push(record);
        }
        match next {
            Some(target) => {
                current = target;
                fetch_type = Type::ANY;
            }
            None => break,
        }
    }

    if answers.is_empty() {
        Err(Error::NotFound)
    } else {
        Ok(answers)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use crate::class::Class;
    use crate::message::Question;

    use super::super::tests::{test_zone, with_records};
    use super::*;

    fn question(qname: &str, qtype: Type) -> Question {
        Question {
            qname: qname.parse().unwrap(),
            qtype,
            qclass: Class::IN,
        }
    }

    #[test]
    fn apex_ns_is_synthesized() {
        let zone = test_zone("apex-ns");
        let table = RecordTable::new();
        let answer = resolve(&zone, &table, 7, &question("example.test.", Type::NS)).unwrap();
        assert_eq!(answer.records.len(), 1);
        assert_eq!(answer.records[0].rr_type(), Type::NS);
        assert_eq!(answer.records[0].rdata(), "ns.example.test.");
        assert_eq!(answer.extra.len(), 1);
        assert_eq!(answer.extra[0].rdata(), "127.0.0.1");
    }

    #[test]
    fn apex_soa_uses_the_serial() {
        let zone = test_zone("apex-soa");
        let table = RecordTable::new();
        let answer = resolve(&zone, &table, 1700000000, &question("example.test.", Type::SOA))
            .unwrap();
        assert_eq!(answer.records.len(), 1);
        assert_eq!(
            answer.records[0].rdata(),
            "localhost. nobody. 1700000000 28800 7200 2419200 1200"
        );
    }

    #[test]
    fn exact_lookup_finds_the_rrset() {
        let zone = test_zone("exact");
        let table = with_records(&[
            "www.example.test.\t60\tIN\tA\t10.0.0.1",
            "www.example.test.\t60\tIN\tA\t10.0.0.2",
        ]);
        let answer = resolve(&zone, &table, 0, &question("www.example.test.", Type::A)).unwrap();
        assert_eq!(answer.records.len(), 2);
    }

    #[test]
    fn missing_name_is_not_found() {
        let zone = test_zone("missing");
        let table = with_records(&["www.example.test.\t60\tIN\tA\t10.0.0.1"]);
        assert!(matches!(
            resolve(&zone, &table, 0, &question("mail.example.test.", Type::A)),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn any_lookup_filters_descendants() {
        let zone = test_zone("any");
        let table = with_records(&[
            "www.example.test.\t60\tIN\tA\t10.0.0.1",
            "www.example.test.\t60\tIN\tTXT\t\"v=1\"",
            "deep.www.example.test.\t60\tIN\tA\t10.0.0.9",
        ]);
        let answer =
            resolve(&zone, &table, 0, &question("www.example.test.", Type::ANY)).unwrap();
        assert_eq!(answer.records.len(), 2);
        assert!(answer
            .records
            .iter()
            .all(|r| r.owner() == &"www.example.test.".parse().unwrap()));
    }

    #[test]
    fn cname_chase_returns_alias_and_target() {
        let zone = test_zone("chase");
        let table = with_records(&[
            "alias.example.test.\t60\tIN\tCNAME\twww.example.test.",
            "www.example.test.\t60\tIN\tA\t10.0.0.1",
        ]);
        let answer = resolve(&zone, &table, 0, &question("alias.example.test.", Type::A)).unwrap();
        assert_eq!(answer.records.len(), 2);
        assert_eq!(answer.records[0].rr_type(), Type::CNAME);
        assert_eq!(answer.records[1].rr_type(), Type::A);
        assert_eq!(answer.records[1].rdata(), "10.0.0.1");
    }

    #[test]
    fn cname_chase_stops_at_external_targets() {
        let zone = test_zone("chase-external");
        let table = with_records(&["alias.example.test.\t60\tIN\tCNAME\twww.elsewhere.net."]);
        let answer = resolve(&zone, &table, 0, &question("alias.example.test.", Type::A)).unwrap();
        assert_eq!(answer.records.len(), 1);
        assert_eq!(answer.records[0].rr_type(), Type::CNAME);
    }

    #[test]
    fn cyclic_cname_chains_terminate() {
        let zone = test_zone("chase-cycle");
        let table = with_records(&[
            "a.example.test.\t60\tIN\tCNAME\tb.example.test.",
            "b.example.test.\t60\tIN\tCNAME\ta.example.test.",
        ]);
        let answer = resolve(&zone, &table, 0, &question("a.example.test.", Type::A)).unwrap();
        // Each name is visited once; the cycle is not followed again.
        assert_eq!(answer.records.len(), 2);
    }

    #[test]
    fn cname_question_does_not_chase() {
        let zone = test_zone("no-chase");
        let table = with_records(&["www.example.test.\t60\tIN\tA\t10.0.0.1"]);
        assert!(matches!(
            resolve(&zone, &table, 0, &question("www.example.test.", Type::CNAME)),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn axfr_produces_the_full_envelope() {
        let zone = test_zone("axfr");
        let table = with_records(&[
            "mail.example.test.\t60\tIN\tA\t10.0.0.3",
            "www.example.test.\t60\tIN\tA\t10.0.0.1",
        ]);
        let answer =
            resolve(&zone, &table, 42, &question("example.test.", Type::AXFR)).unwrap();
        assert_eq!(answer.records.len(), 6);
        assert_eq!(answer.records[0].rr_type(), Type::SOA);
        assert_eq!(answer.records[1].rr_type(), Type::NS);
        assert_eq!(answer.records[2].rr_type(), Type::A);
        assert_eq!(answer.records.last().unwrap().rr_type(), Type::SOA);
    }

    #[test]
    fn corrupt_stored_record_fails_the_query() {
        let zone = test_zone("corrupt");
        let mut table = RecordTable::new();
        table.push("test.example.www_A", "not a record".into());
        assert!(matches!(
            resolve(&zone, &table, 0, &question("www.example.test.", Type::A)),
            Err(Error::MalformedRecord(_))
        ));
    }
}
