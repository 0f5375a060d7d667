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

//! The zone coordinator.
//!
//! A [`Zone`] ties together one record database, the queries answered
//! from it, and the RFC 2136 updates applied to it. Readers take an
//! `Arc` snapshot of the current [`RecordTable`] and work entirely
//! from that; updates are serialized on a per-zone lock, applied to a
//! working copy, persisted, and only then installed with a single
//! pointer swap. A query therefore sees either all of an update or
//! none of it.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::UNIX_EPOCH;

use ipnet::IpNet;
use log::{info, warn};

use crate::message::{Message, Opcode, Rcode};
use crate::name::Name;
use crate::rr::Type;
use crate::store::{self, RecordTable};

mod auth;
mod error;
mod resolve;
mod update;

pub use error::Error;

////////////////////////////////////////////////////////////////////////
// ZONES                                                              //
////////////////////////////////////////////////////////////////////////

/// One authoritative zone and its backing database.
pub struct Zone {
    name: Name,
    ns_name: Name,
    local_addr: Ipv4Addr,
    allow: Option<IpNet>,
    db_path: PathBuf,
    state: RwLock<State>,
    update_lock: Mutex<()>,
}

/// The swappable part of a [`Zone`]: the current table snapshot and
/// the SOA serial (the database file's last-modified Unix time).
struct State {
    table: Arc<RecordTable>,
    serial: u32,
}

impl Zone {
    /// Loads a zone from its backing database file.
    pub fn load(
        name: Name,
        ns_name: Name,
        local_addr: Ipv4Addr,
        allow: Option<IpNet>,
        db_path: PathBuf,
    ) -> Result<Self, Error> {
        let table = store::load(&db_path)?;
        let serial = file_serial(&db_path);
        info!(
            "zone {}: loaded {} RRsets from {}",
            name,
            table.len(),
            db_path.display()
        );
        Ok(Self {
            name,
            ns_name,
            local_addr,
            allow,
            db_path,
            state: RwLock::new(State {
                table: Arc::new(table),
                serial,
            }),
            update_lock: Mutex::new(()),
        })
    }

    /// Returns the zone's name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    fn snapshot(&self) -> (Arc<RecordTable>, u32) {
        let state = self.state.read().unwrap();
        (state.table.clone(), state.serial)
    }

    /// Handles a message routed to this zone, producing the response.
    /// `tsig_valid` reports whether the request carried a TSIG RR that
    /// verified against a configured key.
    pub fn handle_message(&self, request: &Message, remote: IpAddr, tsig_valid: bool) -> Message {
        match request.opcode {
            Opcode::QUERY => self.handle_query(request, tsig_valid),
            Opcode::UPDATE => self.handle_update(request, remote, tsig_valid),
            _ => {
                let mut response = request.start_response();
                response.rcode = Rcode::NOTIMP;
                response
            }
        }
    }

    fn handle_query(&self, request: &Message, tsig_valid: bool) -> Message {
        let mut response = request.start_response();
        response.aa = true;
        let (table, serial) = self.snapshot();
        for question in &request.questions {
            if question.qtype == Type::AXFR {
                if let Err(denied) = auth::authorize_axfr(tsig_valid) {
                    response.rcode = denied.rcode();
                    continue;
                }
            }
            match resolve::resolve(self, &table, serial, question) {
                Ok(answer) => {
                    response.answers.extend(answer.records);
                    response.additional.extend(answer.extra);
                }
                Err(Error::NotFound) => (),
                Err(e) => {
                    // Resolution failures surface as empty answers;
                    // the cause is for the operator.
                    warn!("zone {}: query for {} failed: {}", self.name, question.qname, e);
                }
            }
        }
        response
    }

    fn handle_update(&self, request: &Message, remote: IpAddr, tsig_valid: bool) -> Message {
        let mut response = request.start_response();
        if let Err(denied) = auth::authorize_update(self.allow.as_ref(), remote, tsig_valid) {
            info!("zone {}: update from {} denied: {:?}", self.name, remote, denied);
            response.rcode = denied.rcode();
            return response;
        }

        // Updates are serialized; each works from the table its
        // predecessor installed.
        let _guard = self.update_lock.lock().unwrap();
        let current = self.state.read().unwrap().table.clone();
        let updated = match update::apply(&current, &request.authority) {
            Ok(updated) => updated,
            Err(e) => {
                warn!("zone {}: update from {} rejected: {}", self.name, remote, e);
                response.rcode = Rcode::REFUSED;
                return response;
            }
        };
        if let Err(e) = store::save(&self.db_path, &updated) {
            warn!("zone {}: failed to save update: {}", self.name, e);
            response.rcode = Rcode::REFUSED;
            return response;
        }
        let serial = file_serial(&self.db_path);
        let mut state = self.state.write().unwrap();
        state.table = Arc::new(updated);
        state.serial = serial;
        info!(
            "zone {}: applied update of {} RRs from {}",
            self.name,
            request.authority.len(),
            remote
        );
        response
    }
}

/// Returns the last-modified Unix time of the database file, truncated
/// to 32 bits for use as the SOA serial.
fn file_serial(path: &Path) -> u32 {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;

    use crate::class::Class;
    use crate::message::Question;
    use crate::rr::Record;

    use super::*;

    pub(crate) fn test_zone(tag: &str) -> Zone {
        test_zone_named(tag, "example.test.", "ns.example.test.")
    }

    pub(crate) fn test_zone_named(tag: &str, name: &str, ns_name: &str) -> Zone {
        let mut db_path = std::env::temp_dir();
        db_path.push(format!("dyndns-zone-test-{}-{}.json", std::process::id(), tag));
        Zone {
            name: name.parse().unwrap(),
            ns_name: ns_name.parse().unwrap(),
            local_addr: Ipv4Addr::LOCALHOST,
            allow: None,
            db_path,
            state: RwLock::new(State {
                table: Arc::new(RecordTable::new()),
                serial: 0,
            }),
            update_lock: Mutex::new(()),
        }
    }

    pub(crate) fn with_records(records: &[&str]) -> RecordTable {
        let mut table = RecordTable::new();
        for text in records {
            let record: Record = text.parse().unwrap();
            let exact = crate::key::exact_for(record.owner(), record.rr_type());
            table.push(&exact, record.to_string());
        }
        table
    }

    fn remote() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    fn query(qname: &str, qtype: Type) -> Message {
        Message {
            id: 99,
            questions: vec![Question {
                qname: qname.parse().unwrap(),
                qtype,
                qclass: Class::IN,
            }],
            ..Message::default()
        }
    }

    fn update_message(rrs: Vec<Record>) -> Message {
        Message {
            id: 100,
            opcode: Opcode::UPDATE,
            questions: vec![Question {
                qname: "example.test.".parse().unwrap(),
                qtype: Type::SOA,
                qclass: Class::IN,
            }],
            authority: rrs,
            ..Message::default()
        }
    }

    /// A zone backed by a real (empty) database file, for tests that
    /// exercise the save/install path.
    fn persistent_zone(tag: &str) -> Zone {
        let zone = test_zone(tag);
        store::save(&zone.db_path, &RecordTable::new()).unwrap();
        Zone::load(
            zone.name.clone(),
            zone.ns_name.clone(),
            zone.local_addr,
            None,
            zone.db_path.clone(),
        )
        .unwrap()
    }

    #[test]
    fn update_applies_and_persists() {
        let zone = persistent_zone("update-persists");
        let request =
            update_message(vec!["www.example.test. 60 IN A 10.0.0.1".parse().unwrap()]);
        let response = zone.handle_message(&request, remote(), true);
        assert_eq!(response.rcode, Rcode::NOERROR);

        let answer = zone.handle_message(&query("www.example.test.", Type::A), remote(), false);
        assert_eq!(answer.answers.len(), 1);
        assert_eq!(answer.answers[0].rdata(), "10.0.0.1");

        // The new table reached the file, not just the snapshot.
        let reloaded = store::load(&zone.db_path).unwrap();
        assert_eq!(reloaded.len(), 1);
        fs::remove_file(&zone.db_path).unwrap();
    }

    #[test]
    fn unsigned_update_is_notauth() {
        let zone = persistent_zone("update-notauth");
        let request =
            update_message(vec!["www.example.test. 60 IN A 10.0.0.1".parse().unwrap()]);
        let response = zone.handle_message(&request, remote(), false);
        assert_eq!(response.rcode, Rcode::NOTAUTH);
        assert!(store::load(&zone.db_path).unwrap().is_empty());
        fs::remove_file(&zone.db_path).unwrap();
    }

    #[test]
    fn update_outside_allow_cidr_is_refused() {
        let zone = test_zone("update-cidr");
        let zone = Zone {
            allow: Some("10.0.0.0/24".parse().unwrap()),
            ..zone
        };
        let request =
            update_message(vec!["www.example.test. 60 IN A 10.0.0.1".parse().unwrap()]);
        let response = zone.handle_message(&request, remote(), true);
        assert_eq!(response.rcode, Rcode::REFUSED);
    }

    #[test]
    fn rejected_batch_leaves_the_snapshot_alone() {
        let zone = persistent_zone("update-atomic");
        let seed = update_message(vec![
            "www.example.test. 60 IN CNAME other.example.test.".parse().unwrap(),
        ]);
        assert_eq!(zone.handle_message(&seed, remote(), true).rcode, Rcode::NOERROR);

        let bad = update_message(vec![
            "a.example.test. 60 IN A 10.0.0.1".parse().unwrap(),
            "www.example.test. 60 IN A 10.0.0.3".parse().unwrap(),
        ]);
        let response = zone.handle_message(&bad, remote(), true);
        assert_eq!(response.rcode, Rcode::REFUSED);

        // Neither the first (valid) RR of the batch nor anything else
        // landed.
        let answer = zone.handle_message(&query("a.example.test.", Type::A), remote(), false);
        assert!(answer.answers.is_empty());
        assert_eq!(store::load(&zone.db_path).unwrap().len(), 1);
        fs::remove_file(&zone.db_path).unwrap();
    }

    #[test]
    fn axfr_without_tsig_is_notauth() {
        let zone = test_zone("axfr-gate");
        let response = zone.handle_message(&query("example.test.", Type::AXFR), remote(), false);
        assert_eq!(response.rcode, Rcode::NOTAUTH);
        assert!(response.answers.is_empty());
    }

    #[test]
    fn axfr_with_tsig_produces_the_envelope() {
        let zone = persistent_zone("axfr-full");
        let seed = update_message(vec!["www.example.test. 60 IN A 10.0.0.1".parse().unwrap()]);
        zone.handle_message(&seed, remote(), true);
        let response = zone.handle_message(&query("example.test.", Type::AXFR), remote(), true);
        assert_eq!(response.rcode, Rcode::NOERROR);
        assert_eq!(response.answers.len(), 5);
        assert_eq!(response.answers[0].rr_type(), Type::SOA);
        assert_eq!(response.answers.last().unwrap().rr_type(), Type::SOA);
        fs::remove_file(&zone.db_path).unwrap();
    }

    #[test]
    fn queries_never_require_tsig() {
        let zone = test_zone("query-open");
        let response = zone.handle_message(&query("example.test.", Type::SOA), remote(), false);
        assert_eq!(response.rcode, Rcode::NOERROR);
        assert_eq!(response.answers.len(), 1);
        assert!(response.aa);
    }

    #[test]
    fn other_opcodes_are_notimp() {
        let zone = test_zone("notimp");
        let mut request = query("example.test.", Type::SOA);
        request.opcode = Opcode::NOTIFY;
        let response = zone.handle_message(&request, remote(), false);
        assert_eq!(response.rcode, Rcode::NOTIMP);
    }
}
