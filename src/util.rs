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

//! Crate-private utilities.

/// A wrapper around [`str`] references whose [`PartialEq`] and [`Eq`]
/// implementations are ASCII-case-insensitive.
pub struct Caseless<'a>(pub &'a str);

impl PartialEq for Caseless<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(other.0)
    }
}

impl Eq for Caseless<'_> {}

/// Writes `octets` into `target` as lower-case ASCII hex.
pub fn push_hex(octets: &[u8], target: &mut String) {
    for octet in octets {
        target.push(nibble_to_hex_digit(octet >> 4) as char);
        target.push(nibble_to_hex_digit(octet & 0xf) as char);
    }
}

/// Converts a nibble into an ASCII hex character. Lower-case hex digits
/// are used. The passed value must be less than 16.
fn nibble_to_hex_digit(nibble: u8) -> u8 {
    assert!(nibble < 16);
    if nibble < 10 {
        b'0' + nibble
    } else {
        b'a' + nibble - 10
    }
}

/// Converts an ASCII hexadecimal digit to its numeric value. This
/// returns [`None`] if `digit` is not one of the ASCII characters
/// `0` through `9`, `A` through `F`, or `a` through `f`.
pub fn hex_digit_to_nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_hex_works() {
        let mut target = String::new();
        push_hex(&[0x0a, 0xff, 0x00], &mut target);
        assert_eq!(target, "0aff00");
    }

    #[test]
    fn hex_digit_to_nibble_works() {
        assert_eq!(hex_digit_to_nibble(b'7'), Some(7));
        assert_eq!(hex_digit_to_nibble(b'a'), Some(10));
        assert_eq!(hex_digit_to_nibble(b'F'), Some(15));
        assert_eq!(hex_digit_to_nibble(b'g'), None);
    }
}
