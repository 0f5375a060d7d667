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

//! The DNS server front end.
//!
//! A [`Server`] owns the zone set and the TSIG keys. Transports hand
//! it raw messages through [`Server::handle_message`]; it parses,
//! verifies TSIG, routes to the zone whose name is the longest suffix
//! of the question name, serializes the zone's response, and signs it
//! when the request was signed.

use std::net::IpAddr;

use log::{debug, warn};

use crate::message::{tsig, wire, Message, Opcode, Rcode};
use crate::name::Name;
use crate::zone::Zone;

pub mod net;

/// The transport a message arrived over, which determines the response
/// size limit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    /// Returns the maximum response size for the transport. UDP
    /// responses are limited to the RFC 1035 512-octet payload;
    /// anything larger is truncated. TCP responses are limited only by
    /// the two-octet length prefix.
    fn payload_limit(self) -> usize {
        match self {
            Self::Udp => 512,
            Self::Tcp => u16::MAX as usize,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SERVERS                                                            //
////////////////////////////////////////////////////////////////////////

/// The server: the zones served and the TSIG keys accepted.
pub struct Server {
    zones: Vec<Zone>,
    tsig_keys: tsig::KeyMap,
}

impl Server {
    pub fn new(zones: Vec<Zone>, tsig_keys: tsig::KeyMap) -> Self {
        Self { zones, tsig_keys }
    }

    /// Handles one received message, returning the serialized response
    /// (or `None` when no response should be sent at all).
    pub fn handle_message(
        &self,
        buf: &[u8],
        remote: IpAddr,
        transport: Transport,
    ) -> Option<Vec<u8>> {
        let request = match wire::parse(buf) {
            Ok(request) => request,
            Err(e) => {
                debug!("unparseable message from {}: {}", remote, e);
                return formerr_for(buf);
            }
        };
        if request.qr {
            // Responses (including our own, reflected) get no reply.
            return None;
        }

        let mut tsig_valid = false;
        let mut signing = None;
        if let Some(read_tsig) = &request.tsig {
            match read_tsig.verify(buf, &self.tsig_keys, tsig::now()) {
                Ok(()) => {
                    tsig_valid = true;
                    signing = self
                        .tsig_keys
                        .get(&read_tsig.key_name)
                        .map(|key| (read_tsig, key));
                }
                Err(e) => {
                    warn!(
                        "TSIG verification failed for {} (key {}): {}",
                        remote, read_tsig.key_name, e
                    );
                }
            }
        }

        let response = match request.questions.first() {
            None => {
                let mut response = request.start_response();
                response.rcode = Rcode::FORMERR;
                response
            }
            Some(question) => match self.find_zone(&question.qname) {
                Some(zone) => zone.handle_message(&request, remote, tsig_valid),
                None => {
                    debug!("no zone matches {} (from {})", question.qname, remote);
                    let mut response = request.start_response();
                    response.rcode = Rcode::REFUSED;
                    response
                }
            },
        };

        // Leave room for the TSIG RR within the transport limit.
        let mut limit = transport.payload_limit();
        if let Some((read_tsig, key)) = &signing {
            limit = limit.saturating_sub(tsig_rr_len(&read_tsig.key_name, key));
        }
        let mut bytes = match wire::write(&response, limit) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize response for {}: {}", remote, e);
                let mut servfail = request.start_response();
                servfail.questions.clear();
                servfail.rcode = Rcode::SERVFAIL;
                wire::write(&servfail, limit).ok()?
            }
        };
        if let Some((read_tsig, key)) = signing {
            tsig::sign_response(&mut bytes, read_tsig, key, tsig::now());
        }
        Some(bytes)
    }

    /// Finds the zone whose name is the longest suffix of `qname`.
    fn find_zone(&self, qname: &Name) -> Option<&Zone> {
        self.zones
            .iter()
            .filter(|zone| qname.eq_or_subdomain_of(zone.name()))
            .max_by_key(|zone| zone.name().label_count())
    }
}

/// The serialized length of the TSIG RR appended when signing with the
/// given key.
fn tsig_rr_len(key_name: &Name, key: &tsig::Key) -> usize {
    let algorithm = key.algorithm.name();
    key_name.wire_len() + 10 + algorithm.wire_len() + 16 + key.algorithm.output_size()
}

/// Builds a FORMERR reply to a message we could not parse, provided
/// its header is readable and is not itself a response.
fn formerr_for(buf: &[u8]) -> Option<Vec<u8>> {
    if buf.len() < wire::HEADER_LEN || buf[2] & 0x80 != 0 {
        return None;
    }
    let response = Message {
        id: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
        qr: true,
        opcode: Opcode::from(buf[2] >> 3),
        rcode: Rcode::FORMERR,
        ..Message::default()
    };
    wire::write(&response, wire::HEADER_LEN).ok()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use crate::class::Class;
    use crate::message::Question;
    use crate::rr::Type;
    use crate::zone::tests::test_zone;

    use super::*;

    fn remote() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    fn test_server() -> Server {
        Server::new(vec![test_zone("server")], tsig::KeyMap::new())
    }

    fn query_bytes(qname: &str, qtype: Type) -> Vec<u8> {
        let message = Message {
            id: 7,
            questions: vec![Question {
                qname: qname.parse().unwrap(),
                qtype,
                qclass: Class::IN,
            }],
            ..Message::default()
        };
        wire::write(&message, 512).unwrap()
    }

    #[test]
    fn routes_to_the_matching_zone() {
        let server = test_server();
        let request = query_bytes("example.test.", Type::SOA);
        let response = server.handle_message(&request, remote(), Transport::Udp).unwrap();
        let parsed = wire::parse(&response).unwrap();
        assert_eq!(parsed.rcode, Rcode::NOERROR);
        assert_eq!(parsed.answers.len(), 1);
        assert!(parsed.aa);
    }

    #[test]
    fn unmatched_zone_is_refused() {
        let server = test_server();
        let request = query_bytes("www.elsewhere.net.", Type::A);
        let response = server.handle_message(&request, remote(), Transport::Udp).unwrap();
        let parsed = wire::parse(&response).unwrap();
        assert_eq!(parsed.rcode, Rcode::REFUSED);
    }

    #[test]
    fn garbage_with_a_readable_header_gets_formerr() {
        let server = test_server();
        let mut request = query_bytes("example.test.", Type::SOA);
        request.truncate(14); // cut into the question section
        let response = server.handle_message(&request, remote(), Transport::Udp).unwrap();
        let parsed = wire::parse(&response).unwrap();
        assert_eq!(parsed.rcode, Rcode::FORMERR);
        assert_eq!(parsed.id, 7);
    }

    #[test]
    fn short_garbage_gets_no_response() {
        let server = test_server();
        assert!(server
            .handle_message(b"junk", remote(), Transport::Udp)
            .is_none());
    }

    #[test]
    fn responses_are_not_answered() {
        let server = test_server();
        let mut request = query_bytes("example.test.", Type::SOA);
        request[2] |= 0x80;
        assert!(server
            .handle_message(&request, remote(), Transport::Udp)
            .is_none());
    }

    #[test]
    fn longest_suffix_match_wins() {
        let server = Server::new(
            vec![
                test_zone("outer"),
                crate::zone::tests::test_zone_named(
                    "inner",
                    "sub.example.test.",
                    "ns.sub.example.test.",
                ),
            ],
            tsig::KeyMap::new(),
        );
        // sub.example.test. is below both zones, but the more
        // specific one owns it, so its synthesized apex NS answers.
        let request = query_bytes("sub.example.test.", Type::NS);
        let response = server.handle_message(&request, remote(), Transport::Udp).unwrap();
        let parsed = wire::parse(&response).unwrap();
        assert_eq!(parsed.answers[0].rdata(), "ns.sub.example.test.");
    }
}
