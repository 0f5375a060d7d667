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

//! The dyndns dynamic-update authoritative DNS server.
//!
//! dyndns serves small authoritative zones whose contents are managed
//! entirely through RFC 2136 dynamic updates, authenticated with TSIG
//! (RFC 8945). Each zone is backed by a flat line-JSON database file
//! that is rewritten atomically on every accepted update.
//!
//! The crate is organized as follows:
//!
//! * [`name`], [`class`], and [`rr`] provide the DNS data model:
//!   domain names, classes, RR types, and records in their canonical
//!   presentation form.
//! * [`key`] derives the reversed-label record keys under which
//!   records are stored, and [`store`] holds them in memory and on
//!   disk.
//! * [`zone`] is the engine: query resolution, update transactions,
//!   and the authorization gate, coordinated per zone.
//! * [`message`] reads and writes DNS messages, including TSIG
//!   verification and signing.
//! * [`server`] routes messages to zones and runs the UDP and TCP
//!   transports.

pub mod class;
pub mod key;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
pub mod store;
pub mod util;
pub mod zone;
