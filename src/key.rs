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

//! The record-key codec.
//!
//! Records are indexed by a textual key derived from the owner name:
//! the name's labels are reversed (top-level label first), lower-cased,
//! and joined with `.`, so that names under a common origin share a
//! common key prefix. An exact key additionally appends `_` and the RR
//! type mnemonic:
//!
//! ```text
//! www.example.com. + A  ->  com.example.www_A
//! ```
//!
//! Subtree operations (ANY lookups, RFC 2136 subtree deletes) match on
//! the reversed-label prefix. Matching respects label boundaries: the
//! remainder after the prefix must begin with `.` (a descendant name)
//! or `_` (a type key for the name itself), so `com.example` never
//! captures keys under `com.example2`.

use crate::name::Name;
use crate::rr::Type;

/// Returns the reversed-label, lower-cased key prefix for a domain
/// name.
pub fn prefix_for(name: &Name) -> String {
    let mut prefix = String::new();
    for label in name.labels().rev() {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        for c in label.chars() {
            prefix.push(c.to_ascii_lowercase());
        }
    }
    prefix
}

/// Returns the exact lookup key for a (domain name, RR type) pair.
pub fn exact_for(name: &Name, rr_type: Type) -> String {
    format!("{}_{}", prefix_for(name), rr_type)
}

/// Returns whether an exact key falls within the subtree rooted at the
/// given key prefix. The name the key was derived from must equal the
/// prefix's name or be a descendant of it; textual prefixing alone is
/// not enough.
pub fn in_subtree(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.starts_with('.') || rest.starts_with('_'),
        None => false,
    }
}
