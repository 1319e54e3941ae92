use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::error::{PackError, Result};

/// Digest algorithms computed for every downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    /// FIPS-202 SHA3-256, recorded under the `keccak256` label.
    Sha3_256,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha3_256,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha3_256 => "keccak256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque `algorithm:hexdigest` record.
///
/// Only the shape is validated; membership tests compare the raw strings, so
/// an expected checksum for an algorithm the cache never computes simply
/// never matches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        match raw.split_once(':') {
            Some((algorithm, value)) if !algorithm.is_empty() && !value.is_empty() => {
                Ok(Self(raw))
            }
            _ => Err(PackError::InvalidChecksum { raw }),
        }
    }

    pub fn from_digest(algorithm: Algorithm, digest: &[u8]) -> Self {
        Self(format!("{}:{}", algorithm.label(), hex::encode(digest)))
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(alg, _)| alg).unwrap_or_default()
    }

    pub fn value(&self) -> &str {
        self.0.split_once(':').map(|(_, value)| value).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Checksum {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Checksum {
    type Error = PackError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.0
    }
}

/// Writer that forwards bytes to `inner` and feeds every digest in
/// [`Algorithm::ALL`] with exactly the bytes the inner writer accepted.
pub struct HashingWriter<W> {
    inner: W,
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    sha3: Sha3_256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            sha3: Sha3_256::new(),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the inner writer and one checksum per algorithm, in
    /// [`Algorithm::ALL`] order.
    pub fn finish(self) -> (W, Vec<Checksum>) {
        let sums = vec![
            Checksum::from_digest(Algorithm::Md5, &self.md5.finalize()),
            Checksum::from_digest(Algorithm::Sha1, &self.sha1.finalize()),
            Checksum::from_digest(Algorithm::Sha256, &self.sha256.finalize()),
            Checksum::from_digest(Algorithm::Sha3_256, &self.sha3.finalize()),
        ];
        (self.inner, sums)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        let accepted = &buf[..n];
        self.md5.update(accepted);
        self.sha1.update(accepted);
        self.sha256.update(accepted);
        self.sha3.update(accepted);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Parses sidecar contents. Blank and malformed lines are ignored so a
/// partially written trailing line never poisons the whole record.
pub(crate) fn parse_sidecar(contents: &str) -> Vec<Checksum> {
    contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .filter_map(|line| Checksum::parse(line).ok())
        .collect()
}
