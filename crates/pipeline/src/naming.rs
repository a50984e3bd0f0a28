//! File naming conventions
//!
//! Base rasters: `{index}_{region}_{year}_{month:02}[_sample].{ext}`
//! Artefacts:    `{index}_{STD|MORAN|GEARY}_{year}_{month:02}[_sample].{ext}`
//!
//! Artefacts live next to their base raster.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SAMPLE_SUFFIX: &str = "sample";

/// A derived statistic persisted as its own artefact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticKind {
    #[serde(alias = "STD")]
    Std,
    #[serde(alias = "MORAN")]
    Moran,
    #[serde(alias = "GEARY")]
    Geary,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 3] = [StatisticKind::Std, StatisticKind::Moran, StatisticKind::Geary];

    /// Tag used in artefact file names
    pub fn tag(self) -> &'static str {
        match self {
            StatisticKind::Std => "STD",
            StatisticKind::Moran => "MORAN",
            StatisticKind::Geary => "GEARY",
        }
    }

    /// Computed on the downsampled lattice
    pub fn is_autocorrelation(self) -> bool {
        matches!(self, StatisticKind::Moran | StatisticKind::Geary)
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for StatisticKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| format!("unknown statistic '{s}' (expected std, moran or geary)"))
    }
}

/// A monthly time period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: u16,
    pub month: u8,
}

impl Period {
    pub fn new(year: u16, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    fn parse(year: &str, month: &str) -> Option<Self> {
        if year.len() != 4 || !(1..=2).contains(&month.len()) {
            return None;
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:02}", self.year, self.month)
    }
}

/// Identity of a base raster, parsed from its file name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BaseName {
    pub index: String,
    pub period: Period,
    pub sample: bool,
}

impl BaseName {
    /// Parse `file_name` as a base raster of `index` in `region`.
    ///
    /// Derived artefacts, scratch files and other indices return `None`.
    pub fn parse(file_name: &str, index: &str, region: &str, extension: &str) -> Option<Self> {
        let stem = strip_extension(file_name, extension)?;
        let rest = stem.strip_prefix(index)?.strip_prefix('_')?;
        let rest = rest.strip_prefix(region)?.strip_prefix('_')?;

        let parts: Vec<&str> = rest.split('_').collect();
        let (period, sample) = match parts.as_slice() {
            [year, month] => (Period::parse(year, month)?, false),
            [year, month, flag] if *flag == SAMPLE_SUFFIX => (Period::parse(year, month)?, true),
            _ => return None,
        };

        Some(Self {
            index: index.to_string(),
            period,
            sample,
        })
    }

    /// Key of the artefact holding `statistic` for this raster
    pub fn artefact(&self, statistic: StatisticKind) -> ArtefactKey {
        ArtefactKey {
            index: self.index.clone(),
            statistic,
            period: self.period,
            sample: self.sample,
        }
    }

    /// `{index}_{year}_{month}[_sample]`, used in reports
    pub fn label(&self) -> String {
        let mut label = format!("{}_{}", self.index, self.period);
        if self.sample {
            label.push('_');
            label.push_str(SAMPLE_SUFFIX);
        }
        label
    }
}

/// Identity of one derived artefact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtefactKey {
    pub index: String,
    pub statistic: StatisticKind,
    pub period: Period,
    pub sample: bool,
}

impl ArtefactKey {
    pub fn file_name(&self, extension: &str) -> String {
        let sample = if self.sample { "_sample" } else { "" };
        format!(
            "{}_{}_{}{}.{}",
            self.index,
            self.statistic.tag(),
            self.period,
            sample,
            extension
        )
    }

    /// Artefact path inside `dir`
    pub fn path_in(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(self.file_name(extension))
    }

    /// Parse an artefact file name of `index`
    pub fn parse(file_name: &str, index: &str, extension: &str) -> Option<Self> {
        let stem = strip_extension(file_name, extension)?;
        let rest = stem.strip_prefix(index)?.strip_prefix('_')?;
        let (tag, rest) = rest.split_once('_')?;
        let statistic = StatisticKind::ALL.into_iter().find(|k| k.tag() == tag)?;

        let parts: Vec<&str> = rest.split('_').collect();
        let (period, sample) = match parts.as_slice() {
            [year, month] => (Period::parse(year, month)?, false),
            [year, month, flag] if *flag == SAMPLE_SUFFIX => (Period::parse(year, month)?, true),
            _ => return None,
        };

        Some(Self {
            index: index.to_string(),
            statistic,
            period,
            sample,
        })
    }
}

impl fmt::Display for ArtefactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.index, self.statistic.tag(), self.period)?;
        if self.sample {
            write!(f, "_{SAMPLE_SUFFIX}")?;
        }
        Ok(())
    }
}

fn strip_extension<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    ext.eq_ignore_ascii_case(extension).then_some(stem)
}
