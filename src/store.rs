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

//! The in-memory record store and its flat-file persistence.
//!
//! A [`RecordTable`] maps exact record keys (see [`key`](crate::key))
//! to ordered lists of records in presentation form. The backing file
//! holds one JSON object per line:
//!
//! ```text
//! {"domain":"com.example.www_A","records":["www.example.com.\t60\tIN\tA\t10.0.0.1"]}
//! ```
//!
//! The whole file is rewritten on every successful update. Writes go
//! through a temporary file in the same directory, renamed into place
//! on success, so a failed write never leaves a half-written database
//! behind.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::key;

////////////////////////////////////////////////////////////////////////
// RECORD TABLE                                                       //
////////////////////////////////////////////////////////////////////////

/// The authoritative record set of one zone, keyed by exact record
/// key. Iteration order is the lexicographic key order, which keeps
/// AXFR output and the saved file stable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecordTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records stored under an exact key.
    pub fn get(&self, exact_key: &str) -> Option<&[String]> {
        self.entries.get(exact_key).map(Vec::as_slice)
    }

    /// Returns an iterator over all (key, records) entries in key
    /// order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, records)| (key.as_str(), records.as_slice()))
    }

    /// Returns an iterator over every record in the table, in stable
    /// per-key order.
    pub fn records(&self) -> impl Iterator<Item = &str> {
        self.entries
            .values()
            .flat_map(|records| records.iter().map(String::as_str))
    }

    /// Returns an iterator over the keys within the subtree rooted at
    /// the given key prefix.
    pub fn subtree_keys<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        // Everything in a subtree sorts at or after the prefix itself,
        // so we can skip straight to it.
        self.entries
            .range(prefix.to_owned()..)
            .map(|(key, _)| key.as_str())
            .take_while(move |key| key.starts_with(prefix))
            .filter(move |key| key::in_subtree(key, prefix))
    }

    /// Appends a record under an exact key.
    pub fn push(&mut self, exact_key: &str, record: String) {
        self.entries
            .entry(exact_key.to_owned())
            .or_default()
            .push(record);
    }

    /// Replaces the records stored under an exact key; an empty list
    /// removes the key.
    pub fn replace(&mut self, exact_key: &str, records: Vec<String>) {
        if records.is_empty() {
            self.entries.remove(exact_key);
        } else {
            self.entries.insert(exact_key.to_owned(), records);
        }
    }

    /// Removes the RRset stored under an exact key. A no-op when the
    /// key is absent.
    pub fn remove(&mut self, exact_key: &str) {
        self.entries.remove(exact_key);
    }

    /// Removes every key within the subtree rooted at the given key
    /// prefix. A no-op when the subtree is empty.
    pub fn remove_subtree(&mut self, prefix: &str) {
        let doomed: Vec<String> = self
            .subtree_keys(prefix)
            .map(str::to_owned)
            .collect();
        for key in doomed {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////
// PERSISTENCE                                                        //
////////////////////////////////////////////////////////////////////////

/// One line of the backing file. The `domain` field holds the exact
/// record key.
#[derive(Debug, Deserialize, Serialize)]
struct Entry {
    domain: String,
    records: Vec<String>,
}

/// Loads a [`RecordTable`] from the backing file at `path`. A decode
/// error on any line aborts the whole load.
pub fn load(path: impl AsRef<Path>) -> Result<RecordTable, Error> {
    let file = File::open(path).map_err(Error::Io)?;
    let reader = BufReader::new(file);
    let mut table = RecordTable::new();
    for line in reader.lines() {
        let line = line.map_err(Error::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: Entry = serde_json::from_str(&line).map_err(Error::Decode)?;
        table.replace(&entry.domain, entry.records);
    }
    Ok(table)
}

/// Saves a [`RecordTable`] to the backing file at `path`, one entry
/// per line, via a temporary file renamed into place.
pub fn save(path: impl AsRef<Path>, table: &RecordTable) -> Result<(), Error> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");
    let file = File::create(&tmp_path).map_err(Error::Io)?;
    let mut writer = BufWriter::new(file);
    for (key, records) in table.entries() {
        let entry = Entry {
            domain: key.to_owned(),
            records: records.to_vec(),
        };
        let line = serde_json::to_string(&entry).map_err(Error::Encode)?;
        writer.write_all(line.as_bytes()).map_err(Error::Io)?;
        writer.write_all(b"\n").map_err(Error::Io)?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?
        .sync_all()
        .map_err(Error::Io)?;
    fs::rename(&tmp_path, path).map_err(Error::Io)?;
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while loading or saving a [`RecordTable`].
#[derive(Debug)]
pub enum Error {
    Decode(serde_json::Error),
    Encode(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Decode(error) => write!(f, "failed to decode the record database: {}", error),
            Self::Encode(error) => write!(f, "failed to encode the record database: {}", error),
            Self::Io(error) => write!(f, "record database I/O error: {}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(error) => Some(error),
            Self::Encode(error) => Some(error),
            Self::Io(error) => Some(error),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("dyndns-store-test-{}-{}", std::process::id(), name));
        path
    }

    fn sample_table() -> RecordTable {
        let mut table = RecordTable::new();
        table.push(
            "test.example.www_A",
            "www.example.test.\t60\tIN\tA\t10.0.0.1".into(),
        );
        table.push(
            "test.example.www_A",
            "www.example.test.\t60\tIN\tA\t10.0.0.2".into(),
        );
        table.push(
            "test.example_MX",
            "example.test.\t300\tIN\tMX\t10 mail.example.test.".into(),
        );
        table
    }

    #[test]
    fn save_and_load_round_trip() {
        let path = temp_path("round-trip");
        let table = sample_table();
        save(&path, &table).unwrap();
        let reloaded = load(&path).unwrap();
        assert_eq!(reloaded, table);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_skips_blank_lines() {
        let path = temp_path("blank-lines");
        fs::write(
            &path,
            "{\"domain\":\"test.example_A\",\"records\":[\"example.test.\\t60\\tIN\\tA\\t10.0.0.1\"]}\n\n",
        )
        .unwrap();
        let table = load(&path).unwrap();
        assert_eq!(table.len(), 1);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_rejects_garbage() {
        let path = temp_path("garbage");
        fs::write(&path, "{\"domain\":\"test.example_A\"\n").unwrap();
        assert!(matches!(load(&path), Err(Error::Decode(_))));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_fails_on_missing_file() {
        assert!(matches!(
            load(temp_path("does-not-exist")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn errors_name_the_failing_direction() {
        let decode = serde_json::from_str::<Entry>("{").unwrap_err();
        assert!(Error::Decode(decode).to_string().contains("decode"));
        let encode = serde_json::from_str::<Entry>("{").unwrap_err();
        assert!(Error::Encode(encode).to_string().contains("encode"));
    }

    #[test]
    fn subtree_keys_respect_boundaries() {
        let mut table = RecordTable::new();
        table.push("com.example_A", "x".into());
        table.push("com.example.www_A", "x".into());
        table.push("com.example2_A", "x".into());
        let keys: Vec<&str> = table.subtree_keys("com.example").collect();
        assert_eq!(keys, ["com.example.www_A", "com.example_A"]);
    }

    #[test]
    fn remove_subtree_removes_only_the_subtree() {
        let mut table = sample_table();
        table.push("test.example2_A", "other".into());
        table.remove_subtree("test.example");
        assert_eq!(table.len(), 1);
        assert!(table.get("test.example2_A").is_some());
        // Repeating the removal is a no-op.
        table.remove_subtree("test.example");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn replace_with_empty_removes_the_key() {
        let mut table = sample_table();
        table.replace("test.example_MX", Vec::new());
        assert!(table.get("test.example_MX").is_none());
    }
}
