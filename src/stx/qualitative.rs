use std::{
    collections::{BTreeMap, HashSet},
    sync::OnceLock,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{DataModelError, Result},
    stx::{for_each_valid, MaskTile, Merge, StxOp, Tile},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodingKind {
    /// Samples are class indexes, one name per value.
    Index,
    /// Samples are bit sets, one name per mask.
    Flag,
}

/// Names of the values or bit masks a categorical raster is coded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCoding {
    kind: CodingKind,
    entries: Vec<(String, i64)>,
}

impl SampleCoding {
    pub fn new<S: Into<String>>(kind: CodingKind, entries: impl IntoIterator<Item = (S, i64)>) -> Result<Self> {
        let entries: Vec<(String, i64)> = entries.into_iter().map(|(name, value)| (name.into(), value)).collect();
        if entries.is_empty() {
            return Err(DataModelError::invalid("sample coding without entries"));
        }
        let mut names = HashSet::with_capacity(entries.len());
        for (name, _) in &entries {
            if name.is_empty() {
                return Err(DataModelError::invalid("sample coding entry without a name"));
            }
            if !names.insert(name.as_str()) {
                return Err(DataModelError::invalid(format!("sample coding entry '{name}' is defined twice")));
            }
        }
        Ok(Self { kind, entries })
    }

    pub fn index<S: Into<String>>(entries: impl IntoIterator<Item = (S, i64)>) -> Result<Self> {
        Self::new(CodingKind::Index, entries)
    }

    pub fn flag<S: Into<String>>(entries: impl IntoIterator<Item = (S, i64)>) -> Result<Self> {
        Self::new(CodingKind::Flag, entries)
    }

    pub fn kind(&self) -> CodingKind {
        self.kind
    }

    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Majority {
    first: Option<String>,
    second: Option<String>,
}

/// Occurrence counts per class of a categorical raster.
///
/// Classes are the names of a [`SampleCoding`], or the sample values
/// themselves for samples a coding does not name.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitativeStxOp {
    coding: Option<SampleCoding>,
    counts: BTreeMap<String, u64>,
    majority: OnceLock<Majority>,
}

impl QualitativeStxOp {
    pub fn new(coding: Option<SampleCoding>) -> Self {
        Self {
            coding,
            counts: BTreeMap::new(),
            majority: OnceLock::new(),
        }
    }

    pub fn coding(&self) -> Option<&SampleCoding> {
        self.coding.as_ref()
    }

    fn increment(counts: &mut BTreeMap<String, u64>, class: &str) {
        match counts.get_mut(class) {
            Some(count) => *count += 1,
            None => {
                counts.insert(class.to_owned(), 1);
            }
        }
    }

    fn accumulate_value(counts: &mut BTreeMap<String, u64>, coding: Option<&SampleCoding>, value: i64) {
        match coding {
            Some(coding) if coding.kind == CodingKind::Flag => {
                coding
                    .entries
                    .iter()
                    .filter(|(_, mask)| value & mask != 0)
                    .for_each(|(name, _)| Self::increment(counts, name));
            }
            Some(coding) => match coding.entries.iter().find(|(_, index)| *index == value) {
                Some((name, _)) => Self::increment(counts, name),
                None => Self::increment(counts, &value.to_string()),
            },
            None => Self::increment(counts, &value.to_string()),
        }
    }

    /// Counts in ascending class name order.
    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn count(&self, class: &str) -> u64 {
        self.counts.get(class).copied().unwrap_or(0)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    /// Single scan in ascending name order, the earlier name wins a tie.
    fn majority(&self) -> &Majority {
        self.majority.get_or_init(|| {
            let mut first: Option<(&String, u64)> = None;
            let mut second: Option<(&String, u64)> = None;
            for (class, &count) in &self.counts {
                if first.map_or(true, |(_, best)| count > best) {
                    second = first;
                    first = Some((class, count));
                } else if second.map_or(true, |(_, runner_up)| count > runner_up) {
                    second = Some((class, count));
                }
            }
            Majority {
                first: first.map(|(class, _)| class.clone()),
                second: second.map(|(class, _)| class.clone()),
            }
        })
    }

    pub fn majority_class(&self) -> Option<&str> {
        self.majority().first.as_deref()
    }

    pub fn second_majority_class(&self) -> Option<&str> {
        self.majority().second.as_deref()
    }
}

impl StxOp for QualitativeStxOp {
    fn name(&self) -> &str {
        "qualitative"
    }

    fn accumulate_data(&mut self, tile: &Tile<'_>, mask: Option<&MaskTile<'_>>) -> Result<()> {
        self.majority.take();
        let (counts, coding) = (&mut self.counts, self.coding.as_ref());
        for_each_valid(tile, mask, |x, y| {
            Self::accumulate_value(counts, coding, tile.int_value(x, y))
        })
    }
}

impl Merge for QualitativeStxOp {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.coding != other.coding {
            return Err(DataModelError::IncompatibleMerge(String::from(
                "class counts of different sample codings",
            )));
        }
        self.majority.take();
        for (class, count) in &other.counts {
            *self.counts.entry(class.clone()).or_insert(0) += count;
        }
        Ok(())
    }
}
