//! Vendor amount history: the read-only snapshot fed to scoring.
//!
//! The persistence collaborator normally supplies the rolling statistics
//! directly. `from_records` exists for callers that only hold the raw
//! prior documents.

use crate::{
    document::DocumentRecord,
    types::{MinorUnits, VendorId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorHistory {
    pub vendor_id: VendorId,
    /// `None` means the statistics cover all categories of this vendor.
    #[serde(default)]
    pub category: Option<String>,
    pub sample_count: u32,
    /// Mean amount in minor units.
    pub mean: f64,
    /// Population variance of amounts, minor units squared.
    pub variance: f64,
}

impl VendorHistory {
    /// No prior data for this vendor.
    pub fn empty(vendor_id: impl Into<VendorId>) -> Self {
        Self {
            vendor_id: vendor_id.into(),
            category: None,
            sample_count: 0,
            mean: 0.0,
            variance: 0.0,
        }
    }

    /// Welford's running mean/variance over the given amounts.
    pub fn from_amounts<I>(vendor_id: impl Into<VendorId>, amounts: I) -> Self
    where
        I: IntoIterator<Item = MinorUnits>,
    {
        let mut count = 0u32;
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;
        for amount in amounts {
            count += 1;
            let x = amount as f64;
            let delta = x - mean;
            mean += delta / count as f64;
            m2 += delta * (x - mean);
        }
        Self {
            vendor_id: vendor_id.into(),
            category: None,
            sample_count: count,
            mean,
            variance: if count > 0 { m2 / count as f64 } else { 0.0 },
        }
    }

    /// Statistics over the known totals of `vendor_id`'s records,
    /// optionally restricted to one category.
    pub fn from_records<'a, I>(vendor_id: &str, category: Option<&str>, records: I) -> Self
    where
        I: IntoIterator<Item = &'a DocumentRecord>,
    {
        let amounts = records
            .into_iter()
            .filter(|r| r.vendor_id == vendor_id)
            .filter(|r| category.is_none() || r.category.as_deref() == category)
            .filter_map(DocumentRecord::known_total);
        let mut history = Self::from_amounts(vendor_id, amounts);
        history.category = category.map(str::to_string);
        history
    }

    pub fn std_dev(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }
}
