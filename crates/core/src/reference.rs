use std::fmt;
use std::ops::{Add, Index};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A string matching `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        let mut chars = s.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if valid {
            Ok(Self(s))
        } else {
            Err(CoreError::InvalidIdentifier(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One segment of a [`Reference`]: a named identifier or an integer index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefSegment {
    Name(Identifier),
    Index(i64),
}

impl fmt::Display for RefSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefSegment::Name(id) => write!(f, "{id}"),
            RefSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// An immutable dotted/bracketed path of identifier and integer segments,
/// e.g. `kernel.sub[3][2].port`. Underpins every addressable name in the
/// communication engine: port names, instance kernels, settings keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Reference(Vec<RefSegment>);

impl Reference {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_identifier(id: Identifier) -> Self {
        Self(vec![RefSegment::Name(id)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[RefSegment] {
        &self.0
    }

    /// The first `n` segments, or the whole reference if shorter.
    pub fn prefix(&self, n: usize) -> Reference {
        Reference(self.0.iter().take(n).cloned().collect())
    }

    /// Everything from segment `n` onward.
    pub fn suffix(&self, n: usize) -> Reference {
        Reference(self.0.iter().skip(n).cloned().collect())
    }

    /// Splits a `kernel.port` style reference into its leading kernel
    /// reference and trailing identifier segment.
    pub fn split_last(&self) -> Result<(Reference, Identifier), CoreError> {
        match self.0.last() {
            Some(RefSegment::Name(id)) => {
                Ok((Reference(self.0[..self.0.len() - 1].to_vec()), id.clone()))
            }
            _ => Err(CoreError::InvalidReference(format!(
                "reference `{self}` does not end in an identifier"
            ))),
        }
    }

    /// Interprets every segment as an integer index, for use as an
    /// ensemble index or slot coordinate list.
    pub fn as_indices(&self) -> Result<Vec<i64>, CoreError> {
        self.0
            .iter()
            .map(|s| match s {
                RefSegment::Index(i) => Ok(*i),
                RefSegment::Name(id) => Err(CoreError::InvalidReference(format!(
                    "expected an integer segment, found `{id}`"
                ))),
            })
            .collect()
    }

    pub fn from_indices(indices: &[i64]) -> Self {
        Self(indices.iter().map(|i| RefSegment::Index(*i)).collect())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                RefSegment::Name(_) if i > 0 => write!(f, ".{seg}")?,
                _ => write!(f, "{seg}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut rest = s;
        if rest.is_empty() {
            return Ok(Reference::empty());
        }
        loop {
            if let Some(tail) = rest.strip_prefix('[') {
                let end = tail
                    .find(']')
                    .ok_or_else(|| CoreError::InvalidReference(s.to_string()))?;
                let num = &tail[..end];
                let is_negative = num.starts_with('-');
                let digits = if is_negative { &num[1..] } else { num };
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) || is_negative
                {
                    return Err(CoreError::InvalidReference(s.to_string()));
                }
                let value: i64 = num
                    .parse()
                    .map_err(|_| CoreError::InvalidReference(s.to_string()))?;
                segments.push(RefSegment::Index(value));
                rest = &tail[end + 1..];
            } else {
                let end = rest
                    .find(['.', '['])
                    .unwrap_or(rest.len());
                if end == 0 {
                    return Err(CoreError::InvalidReference(s.to_string()));
                }
                let id = Identifier::new(&rest[..end])?;
                segments.push(RefSegment::Name(id));
                rest = &rest[end..];
            }

            if rest.is_empty() {
                break;
            }
            if let Some(tail) = rest.strip_prefix('.') {
                if tail.is_empty() {
                    return Err(CoreError::InvalidReference(s.to_string()));
                }
                rest = tail;
            }
        }
        Ok(Reference(segments))
    }
}

impl Add for Reference {
    type Output = Reference;

    fn add(mut self, rhs: Reference) -> Reference {
        self.0.extend(rhs.0);
        self
    }
}

impl Add<Identifier> for Reference {
    type Output = Reference;

    fn add(mut self, rhs: Identifier) -> Reference {
        self.0.push(RefSegment::Name(rhs));
        self
    }
}

impl Add<i64> for Reference {
    type Output = Reference;

    fn add(mut self, rhs: i64) -> Reference {
        self.0.push(RefSegment::Index(rhs));
        self
    }
}

impl Index<usize> for Reference {
    type Output = RefSegment;

    fn index(&self, index: usize) -> &RefSegment {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_and_bracketed_form() {
        let r: Reference = "kernel.sub[3][2].port".parse().unwrap();
        assert_eq!(r.to_string(), "kernel.sub[3][2].port");
    }

    #[test]
    fn round_trips_canonical_form() {
        for s in ["a", "a.b.c", "a[0]", "a.b[1][2].c"] {
            let r: Reference = s.parse().unwrap();
            let r2: Reference = r.to_string().parse().unwrap();
            assert_eq!(r, r2);
        }
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!("1abc".parse::<Reference>().is_err());
        assert!("a..b".parse::<Reference>().is_err());
        assert!("a.".parse::<Reference>().is_err());
    }

    #[test]
    fn rejects_negative_integers() {
        assert!("a[-1]".parse::<Reference>().is_err());
    }

    #[test]
    fn concatenation_appends_segments() {
        let a: Reference = "kernel".parse().unwrap();
        let id = Identifier::new("port").unwrap();
        assert_eq!((a + id).to_string(), "kernel.port");
    }

    #[test]
    fn split_last_separates_kernel_from_port() {
        let r: Reference = "a.b.port".parse().unwrap();
        let (kernel, port) = r.split_last().unwrap();
        assert_eq!(kernel.to_string(), "a.b");
        assert_eq!(port.as_str(), "port");
    }

    #[test]
    fn prefix_and_suffix_partition_indices() {
        let total = Reference::from_indices(&[1, 2, 3, 4]);
        assert_eq!(total.prefix(2).as_indices().unwrap(), vec![1, 2]);
        assert_eq!(total.suffix(2).as_indices().unwrap(), vec![3, 4]);
    }
}
