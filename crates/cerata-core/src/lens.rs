//! # Lens Module
//!
//! Named, validated scoring configuration.
//!
//! Lenses are loaded from static configuration (TOML or JSON) through
//! [`LensDocument`], validated eagerly, and are immutable afterwards. A
//! malformed lens is rejected at load time and never reaches a qualification
//! call. Serializing a [`Lens`] goes through its document form, so a lens read
//! back from a snapshot is validated again.

use crate::error::{CerataError, Result};
use crate::STANDARD_LENS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default raw-urgency threshold above which a record is CRISIS.
pub const DEFAULT_CRISIS_THRESHOLD: f64 = 0.7;
/// Default minimum authority for HOT.
pub const DEFAULT_HOT_MIN_AUTHORITY: f64 = 0.5;
/// Default minimum raw urgency for HOT.
pub const DEFAULT_HOT_MIN_URGENCY: f64 = 0.3;
/// Default disqualifying authority floor.
pub const DEFAULT_AUTHORITY_FLOOR: f64 = 0.15;
/// Default disqualifying fit floor.
pub const DEFAULT_FIT_FLOOR: f64 = 0.2;
/// Default HOT coherence cutoff.
pub const DEFAULT_HOT_CUTOFF: f64 = 2.5;
/// Default WARM coherence cutoff.
pub const DEFAULT_WARM_CUTOFF: f64 = 1.5;
/// Default COLD coherence cutoff.
pub const DEFAULT_COLD_CUTOFF: f64 = 0.5;
/// Default half-saturation constant of the urgency transform.
pub const DEFAULT_KM: f64 = 0.2;
/// Default inhibition constant of the urgency transform.
pub const DEFAULT_KI: f64 = 0.8;

fn default_crisis_threshold() -> f64 {
    DEFAULT_CRISIS_THRESHOLD
}
fn default_hot_min_authority() -> f64 {
    DEFAULT_HOT_MIN_AUTHORITY
}
fn default_hot_min_urgency() -> f64 {
    DEFAULT_HOT_MIN_URGENCY
}
fn default_authority_floor() -> f64 {
    DEFAULT_AUTHORITY_FLOOR
}
fn default_fit_floor() -> f64 {
    DEFAULT_FIT_FLOOR
}
fn default_target_industries() -> Vec<String> {
    ["technology", "saas", "software", "fintech", "healthcare tech"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// Relative emphasis of the four dimensions. The sum need not be 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Ψ weight.
    pub intent: f64,
    /// ρ weight.
    pub authority: f64,
    /// q weight.
    pub urgency: f64,
    /// f weight.
    pub fit: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            intent: 0.25,
            authority: 0.30,
            urgency: 0.25,
            fit: 0.20,
        }
    }
}

impl Weights {
    /// Create a weight set.
    #[must_use]
    pub fn new(intent: f64, authority: f64, urgency: f64, fit: f64) -> Self {
        Self {
            intent,
            authority,
            urgency,
            fit,
        }
    }

    /// Sum of the four weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.intent + self.authority + self.urgency + self.fit
    }

    /// Weighted mean of `[intent, authority, urgency, fit]`.
    ///
    /// Returns 0.0 for an all-zero weight set (rejected by validation anyway).
    #[must_use]
    pub fn weighted_mean(&self, values: [f64; 4]) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let sum = self.intent * values[0]
            + self.authority * values[1]
            + self.urgency * values[2]
            + self.fit * values[3];
        sum / total
    }

    fn validate(&self, lens: &str) -> Result<()> {
        for (label, w) in [
            ("intent", self.intent),
            ("authority", self.authority),
            ("urgency", self.urgency),
            ("fit", self.fit),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(invalid(lens, format!("weight {label} must be finite and >= 0, got {w}")));
            }
        }
        if self.total() <= 0.0 {
            return Err(invalid(lens, "weights must not all be zero"));
        }
        Ok(())
    }
}

/// Constants of the urgency saturation transform `q / (Km + q + q²/Ki)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Saturation {
    /// Half-saturation constant.
    pub km: f64,
    /// Inhibition constant.
    pub ki: f64,
}

impl Default for Saturation {
    fn default() -> Self {
        Self {
            km: DEFAULT_KM,
            ki: DEFAULT_KI,
        }
    }
}

impl Saturation {
    /// Urgency at which the transform peaks: `sqrt(Km × Ki)`.
    #[must_use]
    pub fn peak(&self) -> f64 {
        (self.km * self.ki).sqrt()
    }
}

/// Coherence cutoffs for the tier ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCutoffs {
    /// C at or above this (with authority and urgency) is HOT.
    pub hot: f64,
    /// C at or above this is WARM.
    pub warm: f64,
    /// C at or above this is COLD.
    pub cold: f64,
}

impl Default for TierCutoffs {
    fn default() -> Self {
        Self {
            hot: DEFAULT_HOT_CUTOFF,
            warm: DEFAULT_WARM_CUTOFF,
            cold: DEFAULT_COLD_CUTOFF,
        }
    }
}

// =============================================================================
// LENS DOCUMENT (config form)
// =============================================================================

/// A lens as written in configuration. Every threshold has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensDocument {
    /// Unique lens name.
    pub name: String,
    /// Dimension weights.
    #[serde(default)]
    pub weights: Weights,
    /// Urgency saturation constants.
    #[serde(default)]
    pub saturation: Saturation,
    /// Raw urgency above this is CRISIS.
    #[serde(default = "default_crisis_threshold")]
    pub crisis_threshold: f64,
    /// Minimum authority for HOT.
    #[serde(default = "default_hot_min_authority")]
    pub hot_min_authority: f64,
    /// Minimum raw urgency for HOT.
    #[serde(default = "default_hot_min_urgency")]
    pub hot_min_urgency: f64,
    /// Authority below this forces NOT_READY.
    #[serde(default = "default_authority_floor")]
    pub authority_floor: f64,
    /// Fit below this forces NOT_READY.
    #[serde(default = "default_fit_floor")]
    pub fit_floor: f64,
    /// Tier ladder cutoffs.
    #[serde(default)]
    pub cutoffs: TierCutoffs,
    /// Industries counted as ideal-customer fit (lowercase substrings).
    #[serde(default = "default_target_industries")]
    pub target_industries: Vec<String>,
}

impl LensDocument {
    /// A document with every default and the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weights: Weights::default(),
            saturation: Saturation::default(),
            crisis_threshold: DEFAULT_CRISIS_THRESHOLD,
            hot_min_authority: DEFAULT_HOT_MIN_AUTHORITY,
            hot_min_urgency: DEFAULT_HOT_MIN_URGENCY,
            authority_floor: DEFAULT_AUTHORITY_FLOOR,
            fit_floor: DEFAULT_FIT_FLOOR,
            cutoffs: TierCutoffs::default(),
            target_industries: default_target_industries(),
        }
    }

    /// Validate into an immutable [`Lens`].
    pub fn validate(self) -> Result<Lens> {
        Lens::try_from(self)
    }
}

// =============================================================================
// LENS
// =============================================================================

/// Immutable, validated scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LensDocument", into = "LensDocument")]
pub struct Lens {
    doc: LensDocument,
}

impl TryFrom<LensDocument> for Lens {
    type Error = CerataError;

    fn try_from(mut doc: LensDocument) -> Result<Self> {
        let name = doc.name.trim().to_string();
        if name.is_empty() {
            return Err(invalid("<unnamed>", "name must not be empty"));
        }
        if name == STANDARD_LENS {
            return Err(invalid(&name, "name is reserved for the current standard"));
        }
        doc.name = name;
        let lens = doc.name.as_str();

        doc.weights.validate(lens)?;

        let sat = doc.saturation;
        if !(sat.km.is_finite() && sat.km > 0.0 && sat.ki.is_finite() && sat.ki > 0.0) {
            return Err(invalid(lens, "saturation constants km and ki must be finite and > 0"));
        }

        for (label, value) in [
            ("crisis_threshold", doc.crisis_threshold),
            ("hot_min_authority", doc.hot_min_authority),
            ("hot_min_urgency", doc.hot_min_urgency),
            ("authority_floor", doc.authority_floor),
            ("fit_floor", doc.fit_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(lens, format!("{label} must be within [0, 1], got {value}")));
            }
        }

        let c = doc.cutoffs;
        if !(c.hot.is_finite() && c.warm.is_finite() && c.cold.is_finite()) {
            return Err(invalid(lens, "cutoffs must be finite"));
        }
        if !(c.hot > c.warm && c.warm > c.cold && c.cold >= 0.0) {
            return Err(invalid(
                lens,
                format!(
                    "cutoffs must satisfy hot > warm > cold >= 0, got {}/{}/{}",
                    c.hot, c.warm, c.cold
                ),
            ));
        }

        doc.target_industries = doc
            .target_industries
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self { doc })
    }
}

impl From<Lens> for LensDocument {
    fn from(lens: Lens) -> Self {
        lens.doc
    }
}

impl Lens {
    /// A lens with every default threshold.
    pub fn with_defaults(name: impl Into<String>) -> Result<Self> {
        LensDocument::named(name).validate()
    }

    /// A lens with default thresholds and the given weights.
    pub fn with_weights(name: impl Into<String>, weights: Weights) -> Result<Self> {
        LensDocument {
            weights,
            ..LensDocument::named(name)
        }
        .validate()
    }

    /// Lens name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.doc.name
    }

    /// Dimension weights.
    #[must_use]
    pub fn weights(&self) -> Weights {
        self.doc.weights
    }

    /// Urgency saturation constants.
    #[must_use]
    pub fn saturation(&self) -> Saturation {
        self.doc.saturation
    }

    /// Raw urgency above this is CRISIS.
    #[must_use]
    pub fn crisis_threshold(&self) -> f64 {
        self.doc.crisis_threshold
    }

    /// Minimum authority for HOT.
    #[must_use]
    pub fn hot_min_authority(&self) -> f64 {
        self.doc.hot_min_authority
    }

    /// Minimum raw urgency for HOT.
    #[must_use]
    pub fn hot_min_urgency(&self) -> f64 {
        self.doc.hot_min_urgency
    }

    /// Authority below this forces NOT_READY.
    #[must_use]
    pub fn authority_floor(&self) -> f64 {
        self.doc.authority_floor
    }

    /// Fit below this forces NOT_READY.
    #[must_use]
    pub fn fit_floor(&self) -> f64 {
        self.doc.fit_floor
    }

    /// Tier ladder cutoffs.
    #[must_use]
    pub fn cutoffs(&self) -> TierCutoffs {
        self.doc.cutoffs
    }

    /// Lowercased industries counted as fit.
    #[must_use]
    pub fn target_industries(&self) -> &[String] {
        &self.doc.target_industries
    }

    /// The document form of this lens.
    #[must_use]
    pub fn document(&self) -> &LensDocument {
        &self.doc
    }
}

fn invalid(lens: &str, reason: impl Into<String>) -> CerataError {
    CerataError::InvalidLens {
        lens: lens.to_string(),
        reason: reason.into(),
    }
}

// =============================================================================
// LENS DELTA / EXPERIMENT CONFIG
// =============================================================================

/// Partial overrides applied on top of a base lens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LensDelta {
    /// Name of the resulting lens. Defaults to `<base>+experimental`.
    #[serde(default)]
    pub name: Option<String>,
    /// Replacement weights.
    #[serde(default)]
    pub weights: Option<Weights>,
    /// Replacement saturation constants.
    #[serde(default)]
    pub saturation: Option<Saturation>,
    /// Replacement crisis threshold.
    #[serde(default)]
    pub crisis_threshold: Option<f64>,
    /// Replacement HOT authority minimum.
    #[serde(default)]
    pub hot_min_authority: Option<f64>,
    /// Replacement HOT urgency minimum.
    #[serde(default)]
    pub hot_min_urgency: Option<f64>,
    /// Replacement authority floor.
    #[serde(default)]
    pub authority_floor: Option<f64>,
    /// Replacement fit floor.
    #[serde(default)]
    pub fit_floor: Option<f64>,
    /// Replacement cutoffs.
    #[serde(default)]
    pub cutoffs: Option<TierCutoffs>,
}

impl LensDelta {
    /// Apply the overrides to `base`, producing a validated lens.
    pub fn apply(&self, base: &Lens) -> Result<Lens> {
        let mut doc = base.document().clone();
        doc.name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("{}+experimental", base.name()));
        if let Some(weights) = self.weights {
            doc.weights = weights;
        }
        if let Some(saturation) = self.saturation {
            doc.saturation = saturation;
        }
        if let Some(v) = self.crisis_threshold {
            doc.crisis_threshold = v;
        }
        if let Some(v) = self.hot_min_authority {
            doc.hot_min_authority = v;
        }
        if let Some(v) = self.hot_min_urgency {
            doc.hot_min_urgency = v;
        }
        if let Some(v) = self.authority_floor {
            doc.authority_floor = v;
        }
        if let Some(v) = self.fit_floor {
            doc.fit_floor = v;
        }
        if let Some(cutoffs) = self.cutoffs {
            doc.cutoffs = cutoffs;
        }
        doc.validate()
    }
}

/// Configuration of a trial's experimental branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExperimentConfig {
    /// A complete replacement lens.
    Lens(Lens),
    /// Overrides on top of the classic lens.
    Delta(LensDelta),
}

impl ExperimentConfig {
    /// Resolve into a concrete lens against the classic configuration.
    pub fn resolve(&self, classic: &Lens) -> Result<Lens> {
        match self {
            ExperimentConfig::Lens(lens) => Ok(lens.clone()),
            ExperimentConfig::Delta(delta) => delta.apply(classic),
        }
    }
}

impl From<Lens> for ExperimentConfig {
    fn from(lens: Lens) -> Self {
        ExperimentConfig::Lens(lens)
    }
}

impl From<LensDelta> for ExperimentConfig {
    fn from(delta: LensDelta) -> Self {
        ExperimentConfig::Delta(delta)
    }
}

// =============================================================================
// LENS CATALOG
// =============================================================================

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    standard: Option<String>,
    #[serde(default, rename = "lens")]
    lenses: Vec<LensDocument>,
}

/// A validated set of lenses keyed by name.
#[derive(Debug, Clone, Default)]
pub struct LensCatalog {
    lenses: BTreeMap<String, Lens>,
    standard: Option<String>,
}

impl LensCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in industry calibrations. The standard is `enterprise_saas`.
    pub fn builtin() -> Result<Self> {
        let calibrations = [
            ("enterprise_saas", Weights::new(0.20, 0.35, 0.20, 0.25), 0.6),
            ("smb_tech", Weights::new(0.30, 0.20, 0.30, 0.20), 0.4),
            ("federal_gov", Weights::new(0.25, 0.25, 0.15, 0.35), 0.5),
            ("healthcare", Weights::new(0.20, 0.30, 0.20, 0.30), 0.55),
        ];

        let mut catalog = Self::new();
        for (name, weights, hot_min_authority) in calibrations {
            catalog.insert(
                LensDocument {
                    weights,
                    hot_min_authority,
                    ..LensDocument::named(name)
                }
                .validate()?,
            )?;
        }
        catalog.standard = Some("enterprise_saas".to_string());
        Ok(catalog)
    }

    /// Parse a TOML catalog:
    ///
    /// ```toml
    /// standard = "enterprise_saas"
    ///
    /// [[lens]]
    /// name = "enterprise_saas"
    /// hot_min_authority = 0.6
    /// weights = { intent = 0.2, authority = 0.35, urgency = 0.2, fit = 0.25 }
    /// ```
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let doc: CatalogDocument = toml::from_str(input)?;
        Self::from_document(doc)
    }

    /// Parse a JSON catalog with the same shape as the TOML form.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(input)?;
        Self::from_document(doc)
    }

    fn from_document(doc: CatalogDocument) -> Result<Self> {
        let mut catalog = Self::new();
        for lens_doc in doc.lenses {
            catalog.insert(lens_doc.validate()?)?;
        }
        if let Some(standard) = doc.standard {
            if !catalog.lenses.contains_key(&standard) {
                return Err(CerataError::Config(format!(
                    "standard lens '{standard}' is not defined in the catalog"
                )));
            }
            catalog.standard = Some(standard);
        }
        Ok(catalog)
    }

    /// Add a lens. Names must be unique.
    pub fn insert(&mut self, lens: Lens) -> Result<()> {
        if self.lenses.contains_key(lens.name()) {
            return Err(CerataError::Config(format!(
                "duplicate lens '{}'",
                lens.name()
            )));
        }
        self.lenses.insert(lens.name().to_string(), lens);
        Ok(())
    }

    /// Look up a lens by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Lens> {
        self.lenses.get(name)
    }

    /// Name of the configured standard lens, if any.
    #[must_use]
    pub fn standard_name(&self) -> Option<&str> {
        self.standard.as_deref()
    }

    /// The configured standard lens, if any.
    #[must_use]
    pub fn standard(&self) -> Option<&Lens> {
        self.standard.as_deref().and_then(|name| self.lenses.get(name))
    }

    /// Lens names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.lenses.keys().map(String::as_str)
    }

    /// Number of lenses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
