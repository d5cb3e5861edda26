//! Primer naming conventions.
//!
//! Primer names encode three things: the amplicon, the side of the amplicon
//! (`_LEFT`/`_RIGHT` by default) and, optionally, a spike-in index
//! (`AMP1_LEFT-2`) or a combination tag written by primer resplicing
//! (`AMP1_LEFT_splice3`). [`PrimerNaming`] turns a name into an [`AmpliconId`]
//! by folding `_splice` into the index delimiter, dropping the trailing index
//! and then stripping the side suffix.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_FWD_SUFFIX: &str = "_LEFT";
pub const DEFAULT_REV_SUFFIX: &str = "_RIGHT";
pub const DEFAULT_IDX_DELIM: &str = "-";

/// Separator written by primer resplicing in front of the combination number.
pub const SPLICE_SEPARATOR: &str = "_splice";

/// Which end of the amplicon a primer binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimerSide {
    Left,
    Right,
}

impl PrimerSide {
    /// Interpret a BED strand column.
    pub fn from_strand(strand: &str) -> Option<Self> {
        match strand.trim() {
            "+" => Some(PrimerSide::Left),
            "-" => Some(PrimerSide::Right),
            _ => None,
        }
    }
}

impl fmt::Display for PrimerSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimerSide::Left => write!(f, "LEFT"),
            PrimerSide::Right => write!(f, "RIGHT"),
        }
    }
}

/// Normalized amplicon identity shared by both primers of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AmpliconId(String);

impl AmpliconId {
    pub fn new(name: impl Into<String>) -> Self {
        AmpliconId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AmpliconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a primer name tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub amplicon: AmpliconId,
    /// `None` only in lenient mode, for names without a side suffix.
    pub side: Option<PrimerSide>,
    /// `spliceN` for resplice output, `None` for the implicit combination.
    pub combination: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PrimerNaming {
    fwd_suffix: String,
    rev_suffix: String,
    idx_delim: String,
    lenient: bool,
}

impl Default for PrimerNaming {
    fn default() -> Self {
        PrimerNaming {
            fwd_suffix: DEFAULT_FWD_SUFFIX.to_string(),
            rev_suffix: DEFAULT_REV_SUFFIX.to_string(),
            idx_delim: DEFAULT_IDX_DELIM.to_string(),
            lenient: false,
        }
    }
}

/// Split a trailing `<separator><digits>` off `name`.
fn split_trailing_index<'a>(name: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    let (head, digits) = name.rsplit_once(separator)?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some((head, digits))
}

impl PrimerNaming {
    pub fn new(fwd_suffix: &str, rev_suffix: &str, idx_delim: &str) -> Result<Self> {
        Self::build(fwd_suffix, rev_suffix, idx_delim, false)
    }

    /// Count names without a side suffix as their own amplicon instead of
    /// rejecting them.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    fn build(fwd_suffix: &str, rev_suffix: &str, idx_delim: &str, lenient: bool) -> Result<Self> {
        if fwd_suffix.is_empty() || rev_suffix.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "primer side suffixes cannot be empty".to_string(),
            ));
        }
        if fwd_suffix == rev_suffix {
            return Err(PipelineError::InvalidConfig(format!(
                "forward and reverse suffixes are both '{fwd_suffix}'"
            )));
        }
        if idx_delim.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "the spike-in index delimiter cannot be empty".to_string(),
            ));
        }

        Ok(PrimerNaming {
            fwd_suffix: fwd_suffix.to_string(),
            rev_suffix: rev_suffix.to_string(),
            idx_delim: idx_delim.to_string(),
            lenient,
        })
    }

    pub fn fwd_suffix(&self) -> &str {
        &self.fwd_suffix
    }

    pub fn rev_suffix(&self) -> &str {
        &self.rev_suffix
    }

    pub fn idx_delim(&self) -> &str {
        &self.idx_delim
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    pub fn suffix(&self, side: PrimerSide) -> &str {
        match side {
            PrimerSide::Left => &self.fwd_suffix,
            PrimerSide::Right => &self.rev_suffix,
        }
    }

    /// Drop the combination tag or spike-in index from a primer name,
    /// leaving `<amplicon><suffix>`.
    pub fn strip_index<'a>(&self, name: &'a str) -> std::borrow::Cow<'a, str> {
        let canonical = name.replace(SPLICE_SEPARATOR, &self.idx_delim);
        match split_trailing_index(&canonical, &self.idx_delim) {
            Some((head, _)) => std::borrow::Cow::Owned(head.to_string()),
            None if canonical == name => std::borrow::Cow::Borrowed(name),
            None => std::borrow::Cow::Owned(canonical),
        }
    }

    pub fn parse(&self, name: &str) -> Result<ParsedName> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::MalformedPrimerFile(
                "empty primer name".to_string(),
            ));
        }

        let combination = split_trailing_index(name, SPLICE_SEPARATOR)
            .map(|(_, n)| format!("splice{n}"));

        let base = self.strip_index(name);

        // the last suffix occurrence wins so that `AMP_LEFT_alt` still maps to AMP
        let fwd = base.rfind(&self.fwd_suffix).map(|i| (i, PrimerSide::Left));
        let rev = base.rfind(&self.rev_suffix).map(|i| (i, PrimerSide::Right));
        let found = match (fwd, rev) {
            (Some(f), Some(r)) => Some(if f.0 >= r.0 { f } else { r }),
            (f, r) => f.or(r),
        };

        let (amplicon, side) = match found {
            Some((idx, side)) => (base[..idx].to_string(), Some(side)),
            None if self.lenient => {
                warn!(
                    "Primer '{}' has neither the {} nor the {} suffix; counting it as its own amplicon.",
                    name, self.fwd_suffix, self.rev_suffix
                );
                (base.to_string(), None)
            }
            None => {
                return Err(PipelineError::MalformedPrimerFile(format!(
                    "primer name '{}' has neither the {} nor the {} suffix",
                    name, self.fwd_suffix, self.rev_suffix
                )))
            }
        };

        if amplicon.is_empty() {
            return Err(PipelineError::MalformedPrimerFile(format!(
                "primer name '{name}' does not name an amplicon in front of its suffix"
            )));
        }

        Ok(ParsedName {
            amplicon: AmpliconId::new(amplicon),
            side,
            combination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_names() {
        let naming = PrimerNaming::default();
        let left = naming.parse("AMP1_LEFT").unwrap();
        assert_eq!(left.amplicon.as_str(), "AMP1");
        assert_eq!(left.side, Some(PrimerSide::Left));
        assert_eq!(left.combination, None);

        let right = naming.parse("AMP1_RIGHT").unwrap();
        assert_eq!(right.amplicon, left.amplicon);
        assert_eq!(right.side, Some(PrimerSide::Right));
    }

    #[test]
    fn test_parse_spike_in_and_splice_tags() {
        let naming = PrimerNaming::default();
        let spike = naming.parse("AMP3_LEFT-2").unwrap();
        assert_eq!(spike.amplicon.as_str(), "AMP3");
        assert_eq!(spike.combination, None);

        let spliced = naming.parse("AMP3_RIGHT_splice4").unwrap();
        assert_eq!(spliced.amplicon.as_str(), "AMP3");
        assert_eq!(spliced.side, Some(PrimerSide::Right));
        assert_eq!(spliced.combination.as_deref(), Some("splice4"));
    }

    #[test]
    fn test_parse_keeps_internal_delimiters() {
        let naming = PrimerNaming::default();
        let parsed = naming.parse("SARS-CoV-2_14_LEFT").unwrap();
        assert_eq!(parsed.amplicon.as_str(), "SARS-CoV-2_14");

        let alt = naming.parse("SARS-CoV-2_14_LEFT_alt4").unwrap();
        assert_eq!(alt.amplicon.as_str(), "SARS-CoV-2_14");
        assert_eq!(alt.side, Some(PrimerSide::Left));
    }

    #[test]
    fn test_parse_unsuffixed_name_is_rejected() {
        let naming = PrimerNaming::default();
        let err = naming.parse("AMP9").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPrimerFile(_)));
        assert!(err.to_string().contains("neither"));
    }

    #[test]
    fn test_parse_unsuffixed_name_lenient() {
        let naming = PrimerNaming::default().lenient(true);
        let parsed = naming.parse("AMP9").unwrap();
        assert_eq!(parsed.amplicon.as_str(), "AMP9");
        assert_eq!(parsed.side, None);
    }

    #[test]
    fn test_custom_suffixes() {
        let naming = PrimerNaming::new("_F", "_R", ".").unwrap();
        let parsed = naming.parse("tile7_R.3").unwrap();
        assert_eq!(parsed.amplicon.as_str(), "tile7");
        assert_eq!(parsed.side, Some(PrimerSide::Right));
        assert!(PrimerNaming::new("_F", "_F", "-").is_err());
    }

    #[test]
    fn test_strip_index() {
        let naming = PrimerNaming::default();
        assert_eq!(naming.strip_index("AMP1_LEFT-3"), "AMP1_LEFT");
        assert_eq!(naming.strip_index("AMP1_LEFT_splice2"), "AMP1_LEFT");
        assert_eq!(naming.strip_index("AMP1_LEFT"), "AMP1_LEFT");
    }

    #[test]
    fn test_trailing_index_needs_digits() {
        assert_eq!(split_trailing_index("AMP-1-2", "-"), Some(("AMP-1", "2")));
        assert_eq!(split_trailing_index("AMP1_LEFT-", "-"), None);
        assert_eq!(split_trailing_index("AMP1_LEFT-x2", "-"), None);
        assert_eq!(split_trailing_index("AMP1_LEFT", "-"), None);

        let naming = PrimerNaming::default();
        let explicit = PrimerNaming::new(DEFAULT_FWD_SUFFIX, DEFAULT_REV_SUFFIX, DEFAULT_IDX_DELIM).unwrap();
        assert_eq!(naming.idx_delim(), explicit.idx_delim());
        assert_eq!(naming.strip_index("AMP1_LEFT-x2"), "AMP1_LEFT-x2");
        assert_eq!(
            naming.parse("AMP3_RIGHT-12").unwrap().amplicon,
            explicit.parse("AMP3_RIGHT-12").unwrap().amplicon
        );
    }

    #[test]
    fn test_side_from_strand() {
        assert_eq!(PrimerSide::from_strand("+"), Some(PrimerSide::Left));
        assert_eq!(PrimerSide::from_strand("-"), Some(PrimerSide::Right));
        assert_eq!(PrimerSide::from_strand("."), None);
    }
}
