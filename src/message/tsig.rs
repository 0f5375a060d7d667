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

//! Implementation of Secret Key Authentication for DNS (TSIG), as
//! specified by [RFC 8945].
//!
//! Two operations are provided. [`ReadTsig::verify`] authenticates a
//! received request against a configured [`KeyMap`].
//! [`sign_response`] appends a signed TSIG RR to a serialized
//! response; per [RFC 8945 § 5.3], the response MAC covers the
//! request's MAC, so signing requires the verified [`ReadTsig`] of the
//! request.
//!
//! The two algorithms required by [RFC 8945 § 6] are implemented:
//! HMAC-SHA1 and HMAC-SHA256.
//!
//! [RFC 8945]: https://datatracker.ietf.org/doc/html/rfc8945

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::digest::{MacError, OutputSizeUser};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use sha1::Sha1;
use sha2::Sha256;

use crate::class::Class;
use crate::name::Name;
use crate::rr::Type;

use super::wire::{self, read_u16};

////////////////////////////////////////////////////////////////////////
// TSIG ALGORITHMS                                                    //
////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref HMAC_SHA1_NAME: Name = "hmac-sha1.".parse().unwrap();
    static ref HMAC_SHA256_NAME: Name = "hmac-sha256.".parse().unwrap();
    static ref ALGORITHMS_BY_NAME: HashMap<&'static Name, Algorithm> = HashMap::from([
        (&*HMAC_SHA1_NAME, Algorithm::HmacSha1),
        (&*HMAC_SHA256_NAME, Algorithm::HmacSha256),
    ]);
}

/// A supported TSIG algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    HmacSha1,
    HmacSha256,
}

impl Algorithm {
    /// Returns the name assigned (by [RFC 8945 § 6]) to identify this
    /// algorithm.
    ///
    /// [RFC 8945 § 6]: https://datatracker.ietf.org/doc/html/rfc8945#section-6
    pub fn name(&self) -> &'static Name {
        match self {
            Self::HmacSha1 => &HMAC_SHA1_NAME,
            Self::HmacSha256 => &HMAC_SHA256_NAME,
        }
    }

    /// Returns the size of the MAC produced by this algorithm.
    pub fn output_size(&self) -> usize {
        match self {
            Self::HmacSha1 => Hmac::<Sha1>::output_size(),
            Self::HmacSha256 => Hmac::<Sha256>::output_size(),
        }
    }

    /// Finds an algorithm by its assigned name. This returns `None` if
    /// the algorithm is not defined or not supported by this
    /// implementation.
    pub fn from_name(name: &Name) -> Option<Self> {
        ALGORITHMS_BY_NAME.get(name).copied()
    }

    fn make_authenticator(&self, key: &[u8]) -> Box<dyn Authenticator> {
        match self {
            Algorithm::HmacSha1 => Box::new(Hmac::<Sha1>::new_from_slice(key).unwrap()),
            Algorithm::HmacSha256 => Box::new(Hmac::<Sha256>::new_from_slice(key).unwrap()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HmacSha1 => f.write_str("hmac-sha1"),
            Self::HmacSha256 => f.write_str("hmac-sha256"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// KEYS                                                               //
////////////////////////////////////////////////////////////////////////

/// A configured TSIG key: the algorithm it is bound to and the shared
/// secret.
#[derive(Clone)]
pub struct Key {
    pub algorithm: Algorithm,
    pub secret: Box<[u8]>,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // The secret stays out of logs.
        f.debug_struct("Key")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// The set of configured TSIG keys, indexed by key name.
pub type KeyMap = HashMap<Name, Key>;

/// Returns the current Unix time, for use as the `now` argument of
/// [`ReadTsig::verify`] and [`sign_response`].
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

////////////////////////////////////////////////////////////////////////
// TSIG SIGNING AND VERIFICATION HELPERS                              //
////////////////////////////////////////////////////////////////////////

/// An abstraction over different MAC implementations. Basically, this
/// wraps the `digest` crate's [`Mac`] trait to give us an object-safe
/// trait (so that we can use `Box<dyn Authenticator>`).
trait Authenticator {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Box<[u8]>;
    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> Result<(), MacError>;
}

impl<M> Authenticator for M
where
    M: Mac,
{
    fn update(&mut self, data: &[u8]) {
        <Self as Mac>::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Box<[u8]> {
        <Self as Mac>::finalize(*self)
            .into_bytes()
            .to_vec()
            .into_boxed_slice()
    }

    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> Result<(), MacError> {
        <Self as Mac>::verify_truncated_left(*self, tag)
    }
}

/// Adds the given message to a MAC, decrementing the ARCOUNT and
/// restoring the original message ID first (in accordance with
/// [RFC 8945 § 4.3.2]).
///
/// [RFC 8945 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.3.2
fn add_modified_message(authenticator: &mut dyn Authenticator, message: &[u8], original_id: u16) {
    authenticator.update(&original_id.to_be_bytes());
    authenticator.update(&message[2..10]);
    let arcount_without_tsig =
        u16::from_be_bytes(message[10..12].try_into().unwrap()).wrapping_sub(1);
    authenticator.update(&arcount_without_tsig.to_be_bytes());
    authenticator.update(&message[12..]);
}

/// Adds the TSIG variables specified by [RFC 8945 § 4.3.3] to a MAC.
///
/// [RFC 8945 § 4.3.3]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.3.3
fn add_tsig_variables(
    authenticator: &mut dyn Authenticator,
    key_name: &Name,
    algorithm: &Name,
    time_signed: u64,
    fudge: u16,
    error: u16,
    other: &[u8],
) {
    let mut buf = Vec::with_capacity(64);
    key_name.to_wire(&mut buf);
    authenticator.update(&buf);
    authenticator.update(b"\x00\xff\x00\x00\x00\x00");
    buf.clear();
    algorithm.to_wire(&mut buf);
    authenticator.update(&buf);
    authenticator.update(&time_signed.to_be_bytes()[2..8]);
    authenticator.update(&fudge.to_be_bytes());
    authenticator.update(&error.to_be_bytes());
    authenticator.update(&(other.len() as u16).to_be_bytes());
    authenticator.update(other);
}

////////////////////////////////////////////////////////////////////////
// TSIG READING/VERIFICATION                                          //
////////////////////////////////////////////////////////////////////////

/// A TSIG RR that has been read from a request.
///
/// `prefix_len` records the offset at which the TSIG RR began, so the
/// digest can cover the message up to (but not including) the RR.
#[derive(Clone, Debug)]
pub struct ReadTsig {
    pub key_name: Name,
    pub algorithm: Name,
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
    pub other: Vec<u8>,
    pub prefix_len: usize,
}

impl ReadTsig {
    /// Parses the TSIG RR beginning at index `rr_start` of `msg`.
    pub(super) fn parse(msg: &[u8], rr_start: usize) -> Result<Self, wire::Error> {
        let (key_name, name_len) = Name::from_wire(msg, rr_start)?;
        let fixed = rr_start + name_len;
        if Type::from(read_u16(msg, fixed)?) != Type::TSIG {
            return Err(wire::Error::BadTsig);
        }
        let class = Class::from(read_u16(msg, fixed + 2)?);
        let ttl_octets = msg.get(fixed + 4..fixed + 8).ok_or(wire::Error::Truncated)?;
        if class != Class::ANY || ttl_octets != [0; 4] {
            return Err(wire::Error::BadTsig);
        }
        let rdlength = read_u16(msg, fixed + 8)? as usize;
        let rdata_start = fixed + 10;
        let rdata_end = rdata_start + rdlength;
        if msg.len() < rdata_end {
            return Err(wire::Error::Truncated);
        }

        let (algorithm, algo_len) = Name::from_wire(msg, rdata_start)?;
        let mut pos = rdata_start + algo_len;
        let time_octets = msg.get(pos..pos + 6).ok_or(wire::Error::BadTsig)?;
        let mut time_signed = 0u64;
        for &octet in time_octets {
            time_signed = (time_signed << 8) | u64::from(octet);
        }
        let fudge = read_u16(msg, pos + 6)?;
        let mac_size = read_u16(msg, pos + 8)? as usize;
        pos += 10;
        let mac = msg
            .get(pos..pos + mac_size)
            .ok_or(wire::Error::BadTsig)?
            .to_vec();
        pos += mac_size;
        let original_id = read_u16(msg, pos)?;
        let error = read_u16(msg, pos + 2)?;
        let other_len = read_u16(msg, pos + 4)? as usize;
        pos += 6;
        let other = msg
            .get(pos..pos + other_len)
            .ok_or(wire::Error::BadTsig)?
            .to_vec();
        if pos + other_len != rdata_end {
            return Err(wire::Error::BadTsig);
        }

        Ok(Self {
            key_name,
            algorithm,
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other,
            prefix_len: rr_start,
        })
    }

    /// Verifies the request `message` (the full received buffer,
    /// including the TSIG RR) against the configured keys.
    pub fn verify(&self, message: &[u8], keys: &KeyMap, now: u64) -> Result<(), VerificationError> {
        // RFC 8945 § 5.2.1: the key must be known and must use the
        // algorithm named in the RR.
        let key = keys.get(&self.key_name).ok_or(VerificationError::BadKey)?;
        if Algorithm::from_name(&self.algorithm) != Some(key.algorithm) {
            return Err(VerificationError::BadKey);
        }

        // Ensure that any MAC truncation applied meets RFC 8945
        // § 5.2.2.1's minimum requirements.
        let half_output_size = (key.algorithm.output_size() + 1) / 2;
        if self.mac.len() > key.algorithm.output_size()
            || self.mac.len() < 10.max(half_output_size)
        {
            return Err(VerificationError::FormErr);
        }

        // RFC 8945 § 5.2.2: verify the MAC.
        let mut authenticator = key.algorithm.make_authenticator(&key.secret);
        add_modified_message(
            authenticator.as_mut(),
            &message[..self.prefix_len],
            self.original_id,
        );
        add_tsig_variables(
            authenticator.as_mut(),
            &self.key_name,
            &self.algorithm,
            self.time_signed,
            self.fudge,
            self.error,
            &self.other,
        );
        authenticator
            .verify_truncated_left(&self.mac)
            .or(Err(VerificationError::BadSig))?;

        // RFC 8945 § 5.2.3: ensure that the time signed is close
        // enough to the server time.
        let window_start = self.time_signed.saturating_sub(u64::from(self.fudge));
        let window_end = self.time_signed.saturating_add(u64::from(self.fudge));
        if now < window_start || now > window_end {
            return Err(VerificationError::BadTime);
        }

        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TSIG WRITING/SIGNING                                               //
////////////////////////////////////////////////////////////////////////

/// Signs a serialized response to a TSIG-authenticated request,
/// appending the TSIG RR and incrementing the message ARCOUNT.
///
/// `response` must be a complete serialized message whose ID matches
/// the request's, without a TSIG RR of its own. `request` is the
/// verified TSIG RR of the request; per [RFC 8945 § 5.3], its MAC is
/// the first component of the response digest. The key must be the one
/// the request was verified against.
///
/// [RFC 8945 § 5.3]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.3
pub fn sign_response(response: &mut Vec<u8>, request: &ReadTsig, key: &Key, now: u64) {
    let algorithm = key.algorithm.name();
    let fudge = 300u16;

    let mut authenticator = key.algorithm.make_authenticator(&key.secret);
    authenticator.update(&(request.mac.len() as u16).to_be_bytes());
    authenticator.update(&request.mac);
    // The buffer does not include the TSIG RR yet, so it is already
    // the RFC 8945 § 4.3.2 modified message.
    authenticator.update(response);
    add_tsig_variables(
        authenticator.as_mut(),
        &request.key_name,
        algorithm,
        now,
        fudge,
        0,
        &[],
    );
    let mac = authenticator.finalize();

    request.key_name.to_wire(response);
    response.extend_from_slice(&u16::from(Type::TSIG).to_be_bytes());
    response.extend_from_slice(&u16::from(Class::ANY).to_be_bytes());
    response.extend_from_slice(&[0; 4]);
    let rdlength = algorithm.wire_len() + 16 + mac.len();
    response.extend_from_slice(&(rdlength as u16).to_be_bytes());
    algorithm.to_wire(response);
    response.extend_from_slice(&now.to_be_bytes()[2..8]);
    response.extend_from_slice(&fudge.to_be_bytes());
    response.extend_from_slice(&(mac.len() as u16).to_be_bytes());
    response.extend_from_slice(&mac);
    response.extend_from_slice(&request.original_id.to_be_bytes());
    response.extend_from_slice(&[0; 4]);

    let arcount = u16::from_be_bytes(response[10..12].try_into().unwrap()) + 1;
    response[10..12].copy_from_slice(&arcount.to_be_bytes());
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that arise during TSIG verification.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum VerificationError {
    /// The key is unknown, or the algorithm does not match the key's.
    BadKey,

    /// MAC verification failed.
    BadSig,

    /// Time check failed.
    BadTime,

    /// The MAC does not meet the minimum size requirements of
    /// [RFC 8945 § 5.2.2.1].
    ///
    /// [RFC 8945 § 5.2.2.1]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.2.2.1
    FormErr,
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadKey => f.write_str("BADKEY"),
            Self::BadSig => f.write_str("BADSIG"),
            Self::BadTime => f.write_str("BADTIME"),
            Self::FormErr => f.write_str("FORMERR"),
        }
    }
}

impl std::error::Error for VerificationError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::wire;
    use super::*;

    const KEY_NAME: &str = "a.tsig.key.";
    const SECRET: &[u8] = b"topsecret";
    const TIME_SIGNED: u64 = 1663798730;
    const FUDGE: u16 = 300;

    fn key_map() -> KeyMap {
        KeyMap::from([(
            KEY_NAME.parse().unwrap(),
            Key {
                algorithm: Algorithm::HmacSha256,
                secret: SECRET.into(),
            },
        )])
    }

    /// Builds a signed request the way a client would: serialize the
    /// unsigned message, digest it with the TSIG variables, then
    /// append the TSIG RR and bump the ARCOUNT.
    fn signed_request() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xa2e0u16.to_be_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
        let qname: Name = "www.example.test.".parse().unwrap();
        qname.to_wire(&mut buf);
        buf.extend_from_slice(&u16::from(Type::TXT).to_be_bytes());
        buf.extend_from_slice(&u16::from(Class::IN).to_be_bytes());

        let key_name: Name = KEY_NAME.parse().unwrap();
        let algorithm = Algorithm::HmacSha256;
        let mut authenticator = algorithm.make_authenticator(SECRET);
        authenticator.update(&buf);
        add_tsig_variables(
            authenticator.as_mut(),
            &key_name,
            algorithm.name(),
            TIME_SIGNED,
            FUDGE,
            0,
            &[],
        );
        let mac = authenticator.finalize();

        key_name.to_wire(&mut buf);
        buf.extend_from_slice(&u16::from(Type::TSIG).to_be_bytes());
        buf.extend_from_slice(&u16::from(Class::ANY).to_be_bytes());
        buf.extend_from_slice(&[0; 4]);
        let rdlength = algorithm.name().wire_len() + 16 + mac.len();
        buf.extend_from_slice(&(rdlength as u16).to_be_bytes());
        algorithm.name().to_wire(&mut buf);
        buf.extend_from_slice(&TIME_SIGNED.to_be_bytes()[2..8]);
        buf.extend_from_slice(&FUDGE.to_be_bytes());
        buf.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        buf.extend_from_slice(&mac);
        buf.extend_from_slice(&0xa2e0u16.to_be_bytes());
        buf.extend_from_slice(&[0; 4]);
        buf[11] = 1;
        buf
    }

    #[test]
    fn parse_extracts_tsig_fields() {
        let request = signed_request();
        let message = wire::parse(&request).unwrap();
        let tsig = message.tsig.expect("TSIG RR not recognized");
        assert_eq!(tsig.key_name, KEY_NAME.parse().unwrap());
        assert_eq!(tsig.algorithm, *Algorithm::HmacSha256.name());
        assert_eq!(tsig.time_signed, TIME_SIGNED);
        assert_eq!(tsig.fudge, FUDGE);
        assert_eq!(tsig.original_id, 0xa2e0);
        assert_eq!(tsig.error, 0);
        assert!(tsig.other.is_empty());
        assert!(message.additional.is_empty());
    }

    #[test]
    fn verification_works() {
        let request = signed_request();
        let tsig = wire::parse(&request).unwrap().tsig.unwrap();
        assert_eq!(tsig.verify(&request, &key_map(), TIME_SIGNED), Ok(()));
    }

    #[test]
    fn verification_rejects_corrupted_message() {
        let mut request = signed_request();
        request[2] = 0xff;
        let tsig = wire::parse(&request).unwrap().tsig.unwrap();
        assert_eq!(
            tsig.verify(&request, &key_map(), TIME_SIGNED),
            Err(VerificationError::BadSig)
        );
    }

    #[test]
    fn verification_rejects_unknown_key() {
        let request = signed_request();
        let tsig = wire::parse(&request).unwrap().tsig.unwrap();
        assert_eq!(
            tsig.verify(&request, &KeyMap::new(), TIME_SIGNED),
            Err(VerificationError::BadKey)
        );
    }

    #[test]
    fn verification_rejects_algorithm_mismatch() {
        let request = signed_request();
        let tsig = wire::parse(&request).unwrap().tsig.unwrap();
        let mut keys = key_map();
        keys.get_mut(&KEY_NAME.parse().unwrap()).unwrap().algorithm = Algorithm::HmacSha1;
        assert_eq!(
            tsig.verify(&request, &keys, TIME_SIGNED),
            Err(VerificationError::BadKey)
        );
    }

    #[test]
    fn verification_rejects_stale_time() {
        let request = signed_request();
        let tsig = wire::parse(&request).unwrap().tsig.unwrap();
        let keys = key_map();
        let late = TIME_SIGNED + u64::from(FUDGE) + 1;
        assert_eq!(
            tsig.verify(&request, &keys, late),
            Err(VerificationError::BadTime)
        );
        let early = TIME_SIGNED - u64::from(FUDGE) - 1;
        assert_eq!(
            tsig.verify(&request, &keys, early),
            Err(VerificationError::BadTime)
        );
    }

    #[test]
    fn signed_response_verifies_as_a_response() {
        let request = signed_request();
        let request_tsig = wire::parse(&request).unwrap().tsig.unwrap();
        let keys = key_map();
        request_tsig
            .verify(&request, &keys, TIME_SIGNED)
            .unwrap();

        let message = wire::parse(&request).unwrap();
        let mut response = wire::write(&message.start_response(), 512).unwrap();
        let key = keys.get(&request_tsig.key_name).unwrap();
        sign_response(&mut response, &request_tsig, key, TIME_SIGNED);

        // Recompute the digest by hand and compare with the MAC in the
        // appended TSIG RR.
        let response_tsig = wire::parse(&response).unwrap().tsig.unwrap();
        let mut authenticator = key.algorithm.make_authenticator(&key.secret);
        authenticator.update(&(request_tsig.mac.len() as u16).to_be_bytes());
        authenticator.update(&request_tsig.mac);
        add_modified_message(
            authenticator.as_mut(),
            &response[..response_tsig.prefix_len],
            response_tsig.original_id,
        );
        add_tsig_variables(
            authenticator.as_mut(),
            &response_tsig.key_name,
            &response_tsig.algorithm,
            response_tsig.time_signed,
            response_tsig.fudge,
            response_tsig.error,
            &response_tsig.other,
        );
        assert!(authenticator
            .verify_truncated_left(&response_tsig.mac)
            .is_ok());
    }
}
