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

//! The authorization gate for updates and zone transfers.
//!
//! Plain queries are answered unconditionally. Updates must come from
//! inside the zone's allow-CIDR (when one is configured) and must
//! carry a valid TSIG signature; transfers require the signature only.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::message::Rcode;

/// The reason a request was denied, and the rcode it maps to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Denied {
    /// The source address is outside the zone's allow-CIDR.
    Cidr,

    /// The request was unsigned, or its TSIG did not verify.
    Tsig,
}

impl Denied {
    pub(super) fn rcode(self) -> Rcode {
        match self {
            Self::Cidr => Rcode::REFUSED,
            Self::Tsig => Rcode::NOTAUTH,
        }
    }
}

/// Authorizes an UPDATE request.
pub(super) fn authorize_update(
    allow: Option<&IpNet>,
    remote: IpAddr,
    tsig_valid: bool,
) -> Result<(), Denied> {
    if let Some(allow) = allow {
        if !allow.contains(&remote) {
            return Err(Denied::Cidr);
        }
    }
    if !tsig_valid {
        return Err(Denied::Tsig);
    }
    Ok(())
}

/// Authorizes an AXFR request.
pub(super) fn authorize_axfr(tsig_valid: bool) -> Result<(), Denied> {
    if tsig_valid {
        Ok(())
    } else {
        Err(Denied::Tsig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn update_requires_cidr_match_when_configured() {
        let allow: IpNet = "10.0.0.0/24".parse().unwrap();
        assert_eq!(
            authorize_update(Some(&allow), remote("10.0.1.1"), true),
            Err(Denied::Cidr)
        );
        assert_eq!(
            authorize_update(Some(&allow), remote("10.0.0.7"), true),
            Ok(())
        );
    }

    #[test]
    fn update_requires_tsig() {
        assert_eq!(authorize_update(None, remote("10.0.0.7"), false), Err(Denied::Tsig));
        assert_eq!(authorize_update(None, remote("10.0.0.7"), true), Ok(()));
    }

    #[test]
    fn cidr_is_checked_before_tsig() {
        let allow: IpNet = "10.0.0.0/24".parse().unwrap();
        assert_eq!(
            authorize_update(Some(&allow), remote("192.0.2.1"), false),
            Err(Denied::Cidr)
        );
    }

    #[test]
    fn axfr_requires_tsig_only() {
        assert_eq!(authorize_axfr(false), Err(Denied::Tsig));
        assert_eq!(authorize_axfr(true), Ok(()));
    }
}
