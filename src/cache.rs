//! Content-addressed response cache backed by an append-only JSONL file.
//!
//! Keys are the SHA-256 of the request payload serialized with sorted keys,
//! `", "`/`": "` separators and raw non-ASCII text, so a cache file written by
//! earlier runs keeps resolving to the same entries.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub const CACHE_FILE: &str = "lm_cache.jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    key: String,
    value: String,
}

#[derive(Debug)]
pub struct ContentAddressedCache {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl ContentAddressedCache {
    /// Opens (creating if needed) `dir/lm_cache.jsonl` and preloads every
    /// readable record. Later lines override earlier ones.
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CACHE_FILE);
        let entries = load_records(&path);
        debug!(path = %path.display(), entries = entries.len(), "loaded completion cache");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn key_of(payload: &Value) -> String {
        let mut blob = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut blob, SpacedFormatter);
        // Writing into a Vec cannot fail and Value always serializes.
        if payload.serialize(&mut ser).is_err() {
            blob.clear();
        }
        hex::encode(Sha256::digest(&blob))
    }

    pub fn get(&self, payload: &Value) -> Option<&str> {
        self.entries.get(&Self::key_of(payload)).map(String::as_str)
    }

    pub fn put(&mut self, payload: &Value, value: &str) -> io::Result<()> {
        let key = Self::key_of(payload);
        let record = CacheRecord {
            key: key.clone(),
            value: value.to_string(),
        };
        self.entries.insert(key, value.to_string());

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

fn load_records(path: &Path) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return entries,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cache file unreadable, starting empty");
            return entries;
        }
    };
    let mut skipped = 0usize;
    for line in BufReader::new(file).split(b'\n') {
        let Ok(line) = line else {
            skipped += 1;
            continue;
        };
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<CacheRecord>(&line) {
            Ok(record) => {
                entries.insert(record.key, record.value);
            }
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(path = %path.display(), skipped, "dropped malformed cache records");
    }
    entries
}

/// Compact JSON with a space after every `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
