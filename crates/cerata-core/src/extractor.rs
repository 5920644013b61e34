//! # Dimension Extractor
//!
//! Turns a [`LeadRecord`] plus a [`Lens`] into four raw dimensions in [0,1]:
//!
//! - Ψ intent: does their need match what we offer?
//! - ρ authority: decision power and budget signals.
//! - q urgency: timeline and pain intensity (raw, before saturation).
//! - f fit: ideal-customer alignment.
//!
//! This is the validation boundary: a non-finite upstream score is rejected
//! here with [`CerataError::InvalidDimension`] and never reaches the
//! calculator.

use crate::error::{CerataError, Result};
use crate::lens::Lens;
use crate::record::{CompanySize, LeadRecord, LeadSource, Timeline};
use serde::{Deserialize, Serialize};

/// Titles that indicate decision authority (lowercase substrings).
const AUTHORITY_TITLES: [&str; 8] = ["ceo", "cto", "cfo", "coo", "vp", "director", "head of", "chief"];

/// Phrases in free text that indicate urgency.
const URGENCY_MARKERS: [&str; 10] = [
    "urgent",
    "asap",
    "immediately",
    "critical",
    "deadline",
    "struggling",
    "failing",
    "breaking",
    "desperate",
    "need now",
];

// =============================================================================
// DIMENSIONS
// =============================================================================

#[derive(Deserialize)]
struct RawDimensions {
    intent: f64,
    authority: f64,
    urgency: f64,
    fit: f64,
}

impl TryFrom<RawDimensions> for Dimensions {
    type Error = CerataError;

    fn try_from(raw: RawDimensions) -> Result<Self> {
        Dimensions::new(raw.intent, raw.authority, raw.urgency, raw.fit)
    }
}

/// Four dimension values, each guaranteed finite and within [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDimensions")]
pub struct Dimensions {
    intent: f64,
    authority: f64,
    urgency: f64,
    fit: f64,
}

impl Dimensions {
    /// Build from raw values. Out-of-range values are clamped; NaN or
    /// infinite values are rejected.
    pub fn new(intent: f64, authority: f64, urgency: f64, fit: f64) -> Result<Self> {
        Ok(Self {
            intent: checked("intent", intent)?,
            authority: checked("authority", authority)?,
            urgency: checked("urgency", urgency)?,
            fit: checked("fit", fit)?,
        })
    }

    /// Ψ: intent coherence.
    #[must_use]
    pub fn intent(&self) -> f64 {
        self.intent
    }

    /// ρ: decision authority.
    #[must_use]
    pub fn authority(&self) -> f64 {
        self.authority
    }

    /// q: raw urgency, before saturation.
    #[must_use]
    pub fn urgency(&self) -> f64 {
        self.urgency
    }

    /// f: fit.
    #[must_use]
    pub fn fit(&self) -> f64 {
        self.fit
    }

    /// `[intent, authority, urgency, fit]`.
    #[must_use]
    pub fn as_array(&self) -> [f64; 4] {
        [self.intent, self.authority, self.urgency, self.fit]
    }
}

fn checked(dimension: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(CerataError::InvalidDimension { dimension, value })
    }
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Deterministic record → dimensions mapping.
pub struct DimensionExtractor;

impl DimensionExtractor {
    /// Extract all four dimensions.
    ///
    /// Upstream overrides replace extracted values; a crisis flag then forces
    /// urgency to 1.0 so the safety signal can never be overridden away.
    pub fn extract(record: &LeadRecord, lens: &Lens) -> Result<Dimensions> {
        let overrides = record.overrides;
        let text = record.text_for_analysis().to_lowercase();

        let intent = overrides.intent.unwrap_or_else(|| Self::intent(record));
        let authority = overrides.authority.unwrap_or_else(|| Self::authority(record));
        let mut urgency = overrides.urgency.unwrap_or_else(|| Self::urgency(record, &text));
        let fit = overrides.fit.unwrap_or_else(|| Self::fit(record, lens));

        if record.crisis_flag {
            urgency = 1.0;
        }

        Dimensions::new(intent, authority, urgency, fit)
    }

    fn intent(record: &LeadRecord) -> f64 {
        let mut score: f64 = match record.source {
            LeadSource::Inbound => 0.3,
            LeadSource::Referral => 0.25,
            LeadSource::Event => 0.2,
            LeadSource::Content => 0.15,
            LeadSource::Outbound => 0.1,
            LeadSource::Unknown => 0.05,
        };
        if !record.pain_points.is_empty() {
            score += (record.pain_points.len() as f64 * 0.1).min(0.3);
        }
        if record.use_case.is_some() {
            score += 0.2;
        }
        if record.meeting_requests > 0 {
            score += 0.15;
        }
        if !record.content_downloads.is_empty() {
            score += (record.content_downloads.len() as f64 * 0.05).min(0.15);
        }
        score.min(1.0)
    }

    fn authority(record: &LeadRecord) -> f64 {
        let mut score: f64 = match record.is_decision_maker {
            Some(true) => 0.35,
            None => 0.15,
            Some(false) => 0.0,
        };
        if let Some(title) = &record.contact_title {
            let title = title.to_lowercase();
            if AUTHORITY_TITLES.iter().any(|t| title.contains(t)) {
                score += 0.25;
            }
        }
        if record.budget_mentioned == Some(true) {
            score += 0.2;
        }
        score += match record.company_size {
            Some(CompanySize::Enterprise | CompanySize::Smb) => 0.15,
            Some(CompanySize::MidMarket) => 0.2,
            Some(CompanySize::Startup) | None => 0.1,
        };
        score.min(1.0)
    }

    fn urgency(record: &LeadRecord, lowered_text: &str) -> f64 {
        let mut score: f64 = match record.timeline {
            Some(Timeline::Immediate) => 0.4,
            Some(Timeline::ThisQuarter) => 0.3,
            Some(Timeline::NextQuarter) => 0.2,
            Some(Timeline::ThisYear | Timeline::Unspecified) => 0.1,
            None => 0.0,
        };
        let markers = URGENCY_MARKERS
            .iter()
            .filter(|m| lowered_text.contains(*m))
            .count();
        score += (markers as f64 * 0.1).min(0.3);
        if record.meeting_requests > 1 {
            score += 0.15;
        }
        if record.website_visits > 5 {
            score += 0.1;
        }
        score.min(1.0)
    }

    fn fit(record: &LeadRecord, lens: &Lens) -> f64 {
        let mut score: f64 = 0.0;
        if let Some(industry) = &record.industry {
            let industry = industry.to_lowercase();
            if lens
                .target_industries()
                .iter()
                .any(|t| industry.contains(t.as_str()))
            {
                score += 0.25;
            }
        }
        if !record.tech_stack.is_empty() {
            score += (record.tech_stack.len() as f64 * 0.05).min(0.2);
        }
        score += match record.company_size {
            Some(CompanySize::MidMarket | CompanySize::Enterprise) => 0.2,
            Some(CompanySize::Smb) => 0.15,
            _ => 0.0,
        };
        score += if record.competitors_mentioned.is_empty() {
            0.15
        } else {
            0.1
        };
        if record.source == LeadSource::Referral {
            score += 0.15;
        }
        score.min(1.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
