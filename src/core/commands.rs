// src/core/commands.rs

//! The typed command set the facade issues against a store capability.
//!
//! Each variant maps to exactly one store command. Capabilities that speak a
//! wire protocol can render a command with [`Command::to_args`].

use bytes::Bytes;
use std::fmt;

/// A boundary for score-based range removal (`ZREMRANGEBYSCORE`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBoundary {
    Inclusive(f64),
    Exclusive(f64),
    NegInfinity,
    PosInfinity,
}

impl ScoreBoundary {
    /// Returns `true` if `score` lies on the permitted side of this boundary
    /// when used as the lower bound of a range.
    pub fn admits_from_below(&self, score: f64) -> bool {
        match self {
            ScoreBoundary::Inclusive(b) => score >= *b,
            ScoreBoundary::Exclusive(b) => score > *b,
            ScoreBoundary::NegInfinity => true,
            ScoreBoundary::PosInfinity => false,
        }
    }

    /// Returns `true` if `score` lies on the permitted side of this boundary
    /// when used as the upper bound of a range.
    pub fn admits_from_above(&self, score: f64) -> bool {
        match self {
            ScoreBoundary::Inclusive(b) => score <= *b,
            ScoreBoundary::Exclusive(b) => score < *b,
            ScoreBoundary::NegInfinity => false,
            ScoreBoundary::PosInfinity => true,
        }
    }
}

impl fmt::Display for ScoreBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBoundary::Inclusive(score) => write!(f, "{score}"),
            ScoreBoundary::Exclusive(score) => write!(f, "({score}"),
            ScoreBoundary::NegInfinity => write!(f, "-inf"),
            ScoreBoundary::PosInfinity => write!(f, "+inf"),
        }
    }
}

impl From<f64> for ScoreBoundary {
    fn from(score: f64) -> Self {
        ScoreBoundary::Inclusive(score)
    }
}

/// A single store command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get { key: String },
    /// `value` may be absent when serialization of a structured value
    /// degraded; the store decides how to answer.
    Set {
        key: String,
        value: Option<Bytes>,
        expiry: Option<u64>,
    },
    Del { key: String },
    Expire { key: String, seconds: u64 },
    Ttl { key: String },
    Incr { key: String },
    Decr { key: String },
    LRange { key: String, start: i64, stop: i64 },
    LLen { key: String },
    LPop { key: String },
    RPush { key: String, value: Bytes },
    LRem { key: String, count: i64, value: Bytes },
    LTrim { key: String, start: i64, stop: i64 },
    ZAdd { key: String, score: f64, member: Bytes },
    ZRem { key: String, member: Bytes },
    ZRange { key: String, start: i64, stop: i64 },
    ZRemRangeByScore {
        key: String,
        min: ScoreBoundary,
        max: ScoreBoundary,
    },
    SAdd { key: String, member: Bytes },
    SMembers { key: String },
    SPop { key: String },
    SRem { key: String, member: Bytes },
    FlushDb,
    Quit,
}

impl Command {
    /// The upper-case store command name.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl { .. } => "TTL",
            Command::Incr { .. } => "INCR",
            Command::Decr { .. } => "DECR",
            Command::LRange { .. } => "LRANGE",
            Command::LLen { .. } => "LLEN",
            Command::LPop { .. } => "LPOP",
            Command::RPush { .. } => "RPUSH",
            Command::LRem { .. } => "LREM",
            Command::LTrim { .. } => "LTRIM",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZRange { .. } => "ZRANGE",
            Command::ZRemRangeByScore { .. } => "ZREMRANGEBYSCORE",
            Command::SAdd { .. } => "SADD",
            Command::SMembers { .. } => "SMEMBERS",
            Command::SPop { .. } => "SPOP",
            Command::SRem { .. } => "SREM",
            Command::FlushDb => "FLUSHDB",
            Command::Quit => "QUIT",
        }
    }

    /// The key the command touches, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::Get { key }
            | Command::Set { key, .. }
            | Command::Del { key }
            | Command::Expire { key, .. }
            | Command::Ttl { key }
            | Command::Incr { key }
            | Command::Decr { key }
            | Command::LRange { key, .. }
            | Command::LLen { key }
            | Command::LPop { key }
            | Command::RPush { key, .. }
            | Command::LRem { key, .. }
            | Command::LTrim { key, .. }
            | Command::ZAdd { key, .. }
            | Command::ZRem { key, .. }
            | Command::ZRange { key, .. }
            | Command::ZRemRangeByScore { key, .. }
            | Command::SAdd { key, .. }
            | Command::SMembers { key }
            | Command::SPop { key }
            | Command::SRem { key, .. } => Some(key),
            Command::FlushDb | Command::Quit => None,
        }
    }

    /// Renders the command as the argument vector of a request.
    pub fn to_args(&self) -> Vec<Bytes> {
        let mut args = vec![Bytes::from_static(self.name().as_bytes())];
        let key = |k: &String| Bytes::from(k.clone());
        let num = |n: String| Bytes::from(n);
        match self {
            Command::Get { key: k }
            | Command::Del { key: k }
            | Command::Ttl { key: k }
            | Command::Incr { key: k }
            | Command::Decr { key: k }
            | Command::LLen { key: k }
            | Command::LPop { key: k }
            | Command::SMembers { key: k }
            | Command::SPop { key: k } => args.push(key(k)),
            Command::Set {
                key: k,
                value,
                expiry,
            } => {
                args.push(key(k));
                if let Some(v) = value {
                    args.push(v.clone());
                }
                if let Some(seconds) = expiry {
                    args.push(Bytes::from_static(b"EX"));
                    args.push(num(seconds.to_string()));
                }
            }
            Command::Expire { key: k, seconds } => {
                args.push(key(k));
                args.push(num(seconds.to_string()));
            }
            Command::LRange {
                key: k,
                start,
                stop,
            }
            | Command::LTrim {
                key: k,
                start,
                stop,
            }
            | Command::ZRange {
                key: k,
                start,
                stop,
            } => {
                args.push(key(k));
                args.push(num(start.to_string()));
                args.push(num(stop.to_string()));
            }
            Command::RPush { key: k, value } => {
                args.push(key(k));
                args.push(value.clone());
            }
            Command::LRem {
                key: k,
                count,
                value,
            } => {
                args.push(key(k));
                args.push(num(count.to_string()));
                args.push(value.clone());
            }
            Command::ZAdd {
                key: k,
                score,
                member,
            } => {
                args.push(key(k));
                args.push(num(score.to_string()));
                args.push(member.clone());
            }
            Command::ZRem { key: k, member }
            | Command::SAdd { key: k, member }
            | Command::SRem { key: k, member } => {
                args.push(key(k));
                args.push(member.clone());
            }
            Command::ZRemRangeByScore { key: k, min, max } => {
                args.push(key(k));
                args.push(num(min.to_string()));
                args.push(num(max.to_string()));
            }
            Command::FlushDb | Command::Quit => {}
        }
        args
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key() {
            Some(key) => write!(f, "{} {key}", self.name()),
            None => write!(f, "{}", self.name()),
        }
    }
}
