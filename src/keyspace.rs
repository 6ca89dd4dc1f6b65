use crate::rdb_parser::RdbRecord;
use crate::value_entry::ValueEntry;
use log::error;
use regex::Regex;
use std::collections::HashMap;

/// The key→value map shared by every connection. Expiry is lazy: an expired
/// entry lives until a `get` observes it.
#[derive(Default)]
pub struct Keyspace {
    entries: HashMap<String, ValueEntry>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Deletes the entry as a side effect when it has expired.
    pub fn get(&mut self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&mut self, key: String, entry: ValueEntry) {
        self.entries.insert(key, entry);
    }

    /// Unlike `get` this never deletes, so SET NX/XX checks stay read-only.
    pub fn key_exists(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Keys matching a glob pattern anchored over the whole key. `*` matches
    /// any run of characters, `?` one word character, everything else is
    /// literal. Expired entries are skipped but left in place.
    pub fn get_keys(&self, pattern: &str) -> Vec<String> {
        let regex = match glob_to_regex(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                error!("unusable KEYS pattern {:?}: {}", pattern, e);
                return Vec::new();
            }
        };
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, _)| key)
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect()
    }

    /// Replaces the whole map with the snapshot contents.
    pub fn load_rdb(&mut self, records: Vec<RdbRecord>) {
        self.entries.clear();
        for record in records {
            self.entries.insert(
                record.key,
                ValueEntry::new_absolute(record.value, record.expires_at_ms),
            );
        }
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut converted = String::with_capacity(pattern.len() + 8);
    converted.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => converted.push_str(".*"),
            '?' => converted.push_str("\\w"),
            _ => converted.push_str(&regex::escape(&ch.to_string())),
        }
    }
    converted.push('$');
    Regex::new(&converted)
}
