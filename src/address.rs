//! Fluree Addresses
//!
//! The single wire-level contract owned by the core:
//!
//! ```text
//! fluree:<method>://<path>
//!   method ∈ file | memory | ipfs | ipns | s3 | localstorage | remote
//!   path   = <alias>/<branch>/(commits|contexts|index/<idx>)/<hash>.json
//!          | <alias>/<branch>/head
//! ```
//!
//! Parsing and rendering round-trip. A `/`-prefixed relative path is wrapped
//! to `//<path>` on construction.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address scheme shared by every backend.
pub const ADDRESS_SCHEME: &str = "fluree";

/// Storage method named in an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    File,
    Memory,
    Ipfs,
    Ipns,
    S3,
    LocalStorage,
    Remote,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::File => "file",
            Method::Memory => "memory",
            Method::Ipfs => "ipfs",
            Method::Ipns => "ipns",
            Method::S3 => "s3",
            Method::LocalStorage => "localstorage",
            Method::Remote => "remote",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Method::File),
            "memory" => Ok(Method::Memory),
            "ipfs" => Ok(Method::Ipfs),
            "ipns" => Ok(Method::Ipns),
            "s3" => Ok(Method::S3),
            "localstorage" => Ok(Method::LocalStorage),
            "remote" => Ok(Method::Remote),
            other => Err(Error::invalid_address(format!("unknown address method '{other}'"))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `fluree:<method>://<path>` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    method: Method,
    path: String,
}

impl Address {
    /// Construct from a method and a path. Leading slashes on the path are
    /// stripped so `/my-alias/main/head` and `my-alias/main/head` name the
    /// same address.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = path.trim_start_matches('/').to_string();
        Address { method, path }
    }

    /// Parse the canonical string form. The leading `//` after the method is
    /// required.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(ADDRESS_SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| Error::invalid_address(format!("missing '{ADDRESS_SCHEME}:' scheme in '{s}'")))?;
        let (method, path) = rest
            .split_once("://")
            .ok_or_else(|| Error::invalid_address(format!("missing '://' separator in '{s}'")))?;
        if path.is_empty() {
            return Err(Error::invalid_address(format!("empty path in '{s}'")));
        }
        Ok(Address { method: method.parse()?, path: path.to_string() })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First path segment: the ledger alias, when the path follows the ledger
    /// layout.
    pub fn alias(&self) -> Option<&str> {
        self.path.split('/').next().filter(|s| !s.is_empty())
    }

    /// Second path segment: the branch.
    pub fn branch(&self) -> Option<&str> {
        self.path.split('/').nth(1)
    }

    /// Whether this address names a mutable head pointer.
    pub fn is_head(&self) -> bool {
        self.path.ends_with("/head")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ADDRESS_SCHEME}:{}://{}", self.method, self.path)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Relative path of a commit file inside a ledger.
pub fn commit_path(alias: &str, branch: &str, hash: &str) -> String {
    format!("{alias}/{branch}/commits/{hash}.json")
}

/// Relative path of a context file inside a ledger.
pub fn context_path(alias: &str, branch: &str, hash: &str) -> String {
    format!("{alias}/{branch}/contexts/{hash}.json")
}

/// Relative path of an index-node file inside a ledger.
pub fn index_path(alias: &str, branch: &str, idx: &str, hash: &str) -> String {
    format!("{alias}/{branch}/index/{idx}/{hash}.json")
}

/// Relative path of the mutable head pointer for a branch.
pub fn head_path(alias: &str, branch: &str) -> String {
    format!("{alias}/{branch}/head")
}

/// Directory holding commit files, relative to the store root.
pub fn commit_dir(alias: &str, branch: &str) -> String {
    format!("{alias}/{branch}/commits")
}

/// Directory holding context files.
pub fn context_dir(alias: &str, branch: &str) -> String {
    format!("{alias}/{branch}/contexts")
}

/// Directory holding index nodes of one index.
pub fn index_dir(alias: &str, branch: &str, idx: &str) -> String {
    format!("{alias}/{branch}/index/{idx}")
}

/// Directory holding garbage records of a branch.
pub fn garbage_dir(alias: &str, branch: &str) -> String {
    format!("{alias}/{branch}/garbage")
}

/// Directory holding index-root records of a branch.
pub fn index_root_dir(alias: &str, branch: &str) -> String {
    format!("{alias}/{branch}/index/roots")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let s = "fluree:file://my-alias/main/commits/abc123.json";
        let addr = Address::parse(s).unwrap();
        assert_eq!(addr.method(), Method::File);
        assert_eq!(addr.path(), "my-alias/main/commits/abc123.json");
        assert_eq!(addr.to_string(), s);
    }

    #[test]
    fn test_every_method_round_trips() {
        for m in ["file", "memory", "ipfs", "ipns", "s3", "localstorage", "remote"] {
            let s = format!("fluree:{m}://a/b/head");
            let addr = Address::parse(&s).unwrap();
            assert_eq!(addr.to_string(), s);
        }
    }

    #[test]
    fn test_slash_prefixed_path_is_wrapped() {
        let addr = Address::new(Method::File, "/my-alias/main/head");
        assert_eq!(addr.to_string(), "fluree:file://my-alias/main/head");
    }

    #[test]
    fn test_rejects_unknown_scheme_and_method() {
        assert!(Address::parse("http://x/y").is_err());
        assert!(Address::parse("fluree:floppy://x/y").is_err());
        assert!(Address::parse("fluree:file:/only-one-slash").is_err());
        assert!(Address::parse("fluree:file://").is_err());
    }

    #[test]
    fn test_alias_branch_head() {
        let addr = Address::parse("fluree:memory://ledger1/main/head").unwrap();
        assert_eq!(addr.alias(), Some("ledger1"));
        assert_eq!(addr.branch(), Some("main"));
        assert!(addr.is_head());
        let commit = Address::parse("fluree:memory://ledger1/main/commits/ff.json").unwrap();
        assert!(!commit.is_head());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(commit_path("a", "main", "ff"), "a/main/commits/ff.json");
        assert_eq!(context_path("a", "main", "ff"), "a/main/contexts/ff.json");
        assert_eq!(index_path("a", "main", "spot", "ff"), "a/main/index/spot/ff.json");
        assert_eq!(head_path("a", "main"), "a/main/head");
    }
}
