// src/core/storage/memory.rs

//! An in-process keyspace that answers [`Command`]s with the reply
//! conventions of a Redis-compatible server.
//!
//! Expiry is enforced lazily: an expired key is dropped the next time it is
//! touched.

use super::zset::SortedSet;
use crate::core::commands::Command;
use crate::core::value::Reply;
use crate::core::ClientError;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum DataValue {
    String(Bytes),
    List(VecDeque<Bytes>),
    SortedSet(SortedSet),
    Set(HashSet<Bytes>),
}

impl DataValue {
    fn is_empty_collection(&self) -> bool {
        match self {
            DataValue::String(_) => false,
            DataValue::List(l) => l.is_empty(),
            DataValue::SortedSet(z) => z.is_empty(),
            DataValue::Set(s) => s.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: DataValue,
    expiry: Option<Instant>,
}

impl StoredValue {
    fn new(data: DataValue) -> Self {
        Self { data, expiry: None }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expiry.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, StoredValue>,
}

impl Keyspace {
    fn live(&mut self, key: &str) -> Option<&mut StoredValue> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|v| v.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|v| v.data.is_empty_collection())
        {
            self.entries.remove(key);
        }
    }

    fn list_mut(&mut self, key: &str, create: bool) -> Result<Option<&mut VecDeque<Bytes>>, ClientError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries.insert(
                key.to_string(),
                StoredValue::new(DataValue::List(VecDeque::new())),
            );
        }
        match self.entries.get_mut(key).map(|v| &mut v.data) {
            Some(DataValue::List(list)) => Ok(Some(list)),
            Some(_) => Err(ClientError::WrongType),
            None => Ok(None),
        }
    }

    fn zset_mut(&mut self, key: &str, create: bool) -> Result<Option<&mut SortedSet>, ClientError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries.insert(
                key.to_string(),
                StoredValue::new(DataValue::SortedSet(SortedSet::new())),
            );
        }
        match self.entries.get_mut(key).map(|v| &mut v.data) {
            Some(DataValue::SortedSet(zset)) => Ok(Some(zset)),
            Some(_) => Err(ClientError::WrongType),
            None => Ok(None),
        }
    }

    fn set_mut(&mut self, key: &str, create: bool) -> Result<Option<&mut HashSet<Bytes>>, ClientError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries.insert(
                key.to_string(),
                StoredValue::new(DataValue::Set(HashSet::new())),
            );
        }
        match self.entries.get_mut(key).map(|v| &mut v.data) {
            Some(DataValue::Set(set)) => Ok(Some(set)),
            Some(_) => Err(ClientError::WrongType),
            None => Ok(None),
        }
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> Result<Reply, ClientError> {
        let current = match self.live(key) {
            Some(StoredValue {
                data: DataValue::String(s),
                ..
            }) => std::str::from_utf8(s)
                .map_err(|_| ClientError::NotAnInteger)?
                .parse::<i64>()?,
            Some(_) => return Err(ClientError::WrongType),
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| ClientError::Command("ERR increment or decrement would overflow".into()))?;
        let value = Bytes::from(next.to_string());
        match self.entries.get_mut(key) {
            Some(stored) => stored.data = DataValue::String(value),
            None => {
                self.entries
                    .insert(key.to_string(), StoredValue::new(DataValue::String(value)));
            }
        }
        Ok(Reply::Integer(next))
    }

    fn apply(&mut self, command: &Command) -> Result<Reply, ClientError> {
        match command {
            Command::Get { key } => match self.live(key) {
                Some(StoredValue {
                    data: DataValue::String(s),
                    ..
                }) => Ok(Reply::BulkString(s.clone())),
                Some(_) => Err(ClientError::WrongType),
                None => Ok(Reply::Null),
            },
            Command::Set { key, value, expiry } => {
                let Some(value) = value else {
                    return Err(ClientError::Command(
                        "ERR wrong number of arguments for 'set' command".into(),
                    ));
                };
                let mut stored = StoredValue::new(DataValue::String(value.clone()));
                if let Some(seconds) = expiry {
                    if *seconds == 0 {
                        return Err(invalid_expire("set"));
                    }
                    stored.expiry = Some(deadline(*seconds, "set")?);
                }
                self.entries.insert(key.clone(), stored);
                Ok(Reply::ok())
            }
            Command::Del { key } => {
                let existed = self.live(key).is_some();
                if existed {
                    self.entries.remove(key);
                }
                Ok(Reply::Integer(existed as i64))
            }
            Command::Expire { key, seconds } => {
                let at = deadline(*seconds, "expire")?;
                match self.live(key) {
                    Some(stored) => {
                        stored.expiry = Some(at);
                        Ok(Reply::Integer(1))
                    }
                    None => Ok(Reply::Integer(0)),
                }
            }
            Command::Ttl { key } => match self.live(key) {
                None => Ok(Reply::Integer(-2)),
                Some(StoredValue { expiry: None, .. }) => Ok(Reply::Integer(-1)),
                Some(StoredValue {
                    expiry: Some(at), ..
                }) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    Ok(Reply::Integer(((remaining.as_millis() + 500) / 1000) as i64))
                }
            },
            Command::Incr { key } => self.incr_by(key, 1),
            Command::Decr { key } => self.incr_by(key, -1),
            Command::LRange { key, start, stop } => {
                let items = match self.list_mut(key, false)? {
                    Some(list) => match normalize_range(*start, *stop, list.len()) {
                        Some((from, to)) => list
                            .range(from..=to)
                            .cloned()
                            .map(Reply::BulkString)
                            .collect(),
                        None => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(Reply::Array(items))
            }
            Command::LLen { key } => Ok(Reply::Integer(
                self.list_mut(key, false)?.map_or(0, |l| l.len() as i64),
            )),
            Command::LPop { key } => {
                let popped = self.list_mut(key, false)?.and_then(|l| l.pop_front());
                self.drop_if_empty(key);
                Ok(popped.map_or(Reply::Null, Reply::BulkString))
            }
            Command::RPush { key, value } => {
                let list = self
                    .list_mut(key, true)?
                    .ok_or_else(|| ClientError::Internal("list creation failed".into()))?;
                list.push_back(value.clone());
                Ok(Reply::Integer(list.len() as i64))
            }
            Command::LRem { key, count, value } => {
                let removed = match self.list_mut(key, false)? {
                    Some(list) => remove_from_list(list, *count, value),
                    None => 0,
                };
                self.drop_if_empty(key);
                Ok(Reply::Integer(removed as i64))
            }
            Command::LTrim { key, start, stop } => {
                if let Some(list) = self.list_mut(key, false)? {
                    match normalize_range(*start, *stop, list.len()) {
                        Some((from, to)) => {
                            list.truncate(to + 1);
                            list.drain(..from);
                        }
                        None => list.clear(),
                    }
                }
                self.drop_if_empty(key);
                Ok(Reply::ok())
            }
            Command::ZAdd { key, score, member } => {
                if score.is_nan() {
                    return Err(ClientError::Command("ERR value is not a valid float".into()));
                }
                let zset = self
                    .zset_mut(key, true)?
                    .ok_or_else(|| ClientError::Internal("zset creation failed".into()))?;
                Ok(Reply::Integer(zset.add(*score, member.clone()) as i64))
            }
            Command::ZRem { key, member } => {
                let removed = self
                    .zset_mut(key, false)?
                    .is_some_and(|z| z.remove(member));
                self.drop_if_empty(key);
                Ok(Reply::Integer(removed as i64))
            }
            Command::ZRange { key, start, stop } => {
                let members = self
                    .zset_mut(key, false)?
                    .map_or_else(Vec::new, |z| z.range(*start, *stop));
                Ok(Reply::Array(
                    members.into_iter().map(Reply::BulkString).collect(),
                ))
            }
            Command::ZRemRangeByScore { key, min, max } => {
                let removed = self
                    .zset_mut(key, false)?
                    .map_or(0, |z| z.remove_range_by_score(*min, *max));
                self.drop_if_empty(key);
                Ok(Reply::Integer(removed as i64))
            }
            Command::SAdd { key, member } => {
                let set = self
                    .set_mut(key, true)?
                    .ok_or_else(|| ClientError::Internal("set creation failed".into()))?;
                Ok(Reply::Integer(set.insert(member.clone()) as i64))
            }
            Command::SMembers { key } => {
                let mut members: Vec<Bytes> = self
                    .set_mut(key, false)?
                    .map_or_else(Vec::new, |s| s.iter().cloned().collect());
                members.sort();
                Ok(Reply::Array(
                    members.into_iter().map(Reply::BulkString).collect(),
                ))
            }
            Command::SPop { key } => {
                let popped = match self.set_mut(key, false)? {
                    Some(set) => {
                        let chosen = set.iter().choose(&mut rand::thread_rng()).cloned();
                        if let Some(member) = &chosen {
                            set.remove(member);
                        }
                        chosen
                    }
                    None => None,
                };
                self.drop_if_empty(key);
                Ok(popped.map_or(Reply::Null, Reply::BulkString))
            }
            Command::SRem { key, member } => {
                let removed = self.set_mut(key, false)?.is_some_and(|s| s.remove(member));
                self.drop_if_empty(key);
                Ok(Reply::Integer(removed as i64))
            }
            Command::FlushDb => {
                self.entries.clear();
                Ok(Reply::ok())
            }
            Command::Quit => Ok(Reply::ok()),
        }
    }
}

fn invalid_expire(command: &str) -> ClientError {
    ClientError::Command(format!("ERR invalid expire time in '{command}' command"))
}

/// The instant `seconds` from now, or an error when it is not representable.
fn deadline(seconds: u64, command: &str) -> Result<Instant, ClientError> {
    Instant::now()
        .checked_add(Duration::from_secs(seconds))
        .ok_or_else(|| invalid_expire(command))
}

/// Resolves a Redis-style inclusive index range against `len`.
fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// `LREM` semantics: `count > 0` removes from the head, `count < 0` from the
/// tail, `count == 0` removes every occurrence.
fn remove_from_list(list: &mut VecDeque<Bytes>, count: i64, value: &Bytes) -> usize {
    let limit = if count == 0 {
        usize::MAX
    } else {
        count.unsigned_abs() as usize
    };
    let mut removed = 0;
    if count >= 0 {
        let mut i = 0;
        while i < list.len() && removed < limit {
            if list[i] == *value {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = list.len();
        while i > 0 && removed < limit {
            i -= 1;
            if list[i] == *value {
                list.remove(i);
                removed += 1;
            }
        }
    }
    removed
}

/// How many command names the store remembers; older entries are dropped.
pub const COMMAND_LOG_CAPACITY: usize = 1024;

/// A bounded record of the command names that reached the store.
#[derive(Debug, Default)]
struct CommandLog {
    entries: VecDeque<String>,
}

impl CommandLog {
    fn push(&mut self, name: &str) {
        if self.entries.len() == COMMAND_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(name.to_string());
    }
}

/// A thread-safe, multi-database in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: Mutex<HashMap<u32, Keyspace>>,
    command_log: Mutex<CommandLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes one command against database `db`.
    pub fn apply(&self, db: u32, command: &Command) -> Result<Reply, ClientError> {
        self.command_log.lock().push(command.name());
        let mut databases = self.databases.lock();
        databases.entry(db).or_default().apply(command)
    }

    /// Executes `commands` atomically against database `db`.
    ///
    /// Per-command failures become `Reply::Error` entries, as with `EXEC`.
    pub fn apply_atomic(&self, db: u32, commands: &[Command]) -> Vec<Reply> {
        {
            let mut log = self.command_log.lock();
            log.push("MULTI");
            for command in commands {
                log.push(command.name());
            }
            log.push("EXEC");
        }
        let mut databases = self.databases.lock();
        let keyspace = databases.entry(db).or_default();
        commands
            .iter()
            .map(|command| {
                keyspace
                    .apply(command)
                    .unwrap_or_else(|e| Reply::Error(e.to_string()))
            })
            .collect()
    }

    /// Records a command name that reached the store without touching data.
    pub fn record(&self, name: &str) {
        self.command_log.lock().push(name);
    }

    /// Names of the most recent commands that reached the store, in arrival
    /// order. At most [`COMMAND_LOG_CAPACITY`] entries are kept.
    pub fn command_log(&self) -> Vec<String> {
        self.command_log.lock().entries.iter().cloned().collect()
    }

    pub fn clear_command_log(&self) {
        self.command_log.lock().entries.clear();
    }

    /// Number of live keys in database `db`.
    pub fn dbsize(&self, db: u32) -> usize {
        let now = Instant::now();
        self.databases
            .lock()
            .get(&db)
            .map_or(0, |ks| ks.entries.values().filter(|v| !v.is_expired(now)).count())
    }
}
