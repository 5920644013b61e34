//! # Record Module
//!
//! The normalized intake record supplied by ingestion collaborators.
//!
//! Field mapping from web forms, CSV, or JSON happens upstream. By the time a
//! record reaches this crate its categorical fields are already normalized
//! into the enums below.

use serde::{Deserialize, Serialize};

/// Where the record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    /// Contacted us.
    Inbound,
    /// Introduced by an existing relationship.
    Referral,
    /// Met at an event.
    Event,
    /// Engaged with published content.
    Content,
    /// We reached out.
    Outbound,
    /// Not recorded.
    #[default]
    Unknown,
}

/// Company size band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySize {
    /// Large enterprise.
    Enterprise,
    /// Mid-market.
    MidMarket,
    /// Small and medium business.
    Smb,
    /// Early-stage startup.
    Startup,
}

/// Stated buying or intake timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    /// Needs help now.
    Immediate,
    /// Within the current quarter.
    ThisQuarter,
    /// Next quarter.
    NextQuarter,
    /// Sometime this year.
    ThisYear,
    /// Mentioned but unspecific.
    Unspecified,
}

/// Numeric dimension values supplied by an upstream scorer.
///
/// When present they replace the extracted value for that dimension. Values
/// outside [0,1] are clamped; NaN or infinite values are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalOverrides {
    /// Ψ override.
    pub intent: Option<f64>,
    /// ρ override.
    pub authority: Option<f64>,
    /// q override.
    pub urgency: Option<f64>,
    /// f override.
    pub fit: Option<f64>,
}

/// A normalized intake record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadRecord {
    // Identity
    /// Stable record id.
    pub lead_id: String,
    /// Company or household name.
    pub company_name: String,
    /// Contact person.
    pub contact_name: Option<String>,
    /// Contact job title.
    pub contact_title: Option<String>,
    /// Contact email.
    pub contact_email: Option<String>,

    // Company signals
    /// Industry label.
    pub industry: Option<String>,
    /// Size band.
    pub company_size: Option<CompanySize>,
    /// Known technologies in use.
    pub tech_stack: Vec<String>,

    // Intent signals
    /// Acquisition channel.
    pub source: LeadSource,
    /// What they first asked about.
    pub initial_interest: Option<String>,
    /// Stated pain points.
    pub pain_points: Vec<String>,
    /// Concrete use case.
    pub use_case: Option<String>,

    // Authority signals
    /// Decision maker: `None` when unknown.
    pub is_decision_maker: Option<bool>,
    /// Budget discussed: `None` when unknown.
    pub budget_mentioned: Option<bool>,
    /// Stated timeline.
    pub timeline: Option<Timeline>,

    // Fit signals
    /// Incumbent solution.
    pub current_solution: Option<String>,
    /// Competitors named.
    pub competitors_mentioned: Vec<String>,

    // Engagement signals
    /// Website visits.
    pub website_visits: u32,
    /// Downloaded assets.
    pub content_downloads: Vec<String>,
    /// Email opens.
    pub email_opens: u32,
    /// Meeting requests.
    pub meeting_requests: u32,

    // Free text
    /// Intake notes.
    pub notes: String,
    /// Email body.
    pub email_content: String,
    /// Call transcript.
    pub call_transcript: String,

    /// Intake marked a safety concern. Forces urgency to 1.0.
    pub crisis_flag: bool,
    /// Upstream numeric scores.
    pub overrides: SignalOverrides,
}

impl LeadRecord {
    /// Create a record with identity only.
    #[must_use]
    pub fn new(lead_id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            lead_id: lead_id.into(),
            company_name: company_name.into(),
            ..Self::default()
        }
    }

    /// Set the contact name and title.
    #[must_use]
    pub fn with_contact(mut self, name: impl Into<String>, title: impl Into<String>) -> Self {
        self.contact_name = Some(name.into());
        self.contact_title = Some(title.into());
        self
    }

    /// Set the industry.
    #[must_use]
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Set the size band.
    #[must_use]
    pub fn with_size(mut self, size: CompanySize) -> Self {
        self.company_size = Some(size);
        self
    }

    /// Set the acquisition source.
    #[must_use]
    pub fn with_source(mut self, source: LeadSource) -> Self {
        self.source = source;
        self
    }

    /// Add pain points.
    #[must_use]
    pub fn with_pain_points<I, S>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pain_points.extend(points.into_iter().map(Into::into));
        self
    }

    /// Set the use case.
    #[must_use]
    pub fn with_use_case(mut self, use_case: impl Into<String>) -> Self {
        self.use_case = Some(use_case.into());
        self
    }

    /// Set decision maker and budget knowledge.
    #[must_use]
    pub fn with_authority(mut self, decision_maker: bool, budget_mentioned: bool) -> Self {
        self.is_decision_maker = Some(decision_maker);
        self.budget_mentioned = Some(budget_mentioned);
        self
    }

    /// Set the timeline.
    #[must_use]
    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = Some(timeline);
        self
    }

    /// Set free-text notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Set the engagement counters.
    #[must_use]
    pub fn with_engagement(mut self, website_visits: u32, meeting_requests: u32) -> Self {
        self.website_visits = website_visits;
        self.meeting_requests = meeting_requests;
        self
    }

    /// Mark a safety concern raised at intake.
    #[must_use]
    pub fn with_crisis_flag(mut self) -> Self {
        self.crisis_flag = true;
        self
    }

    /// Replace extracted dimensions with upstream scores.
    #[must_use]
    pub fn with_overrides(mut self, overrides: SignalOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// All free text joined with single spaces, empty parts skipped.
    #[must_use]
    pub fn text_for_analysis(&self) -> String {
        let pain = self.pain_points.join(" ");
        [
            self.notes.as_str(),
            self.email_content.as_str(),
            self.call_transcript.as_str(),
            self.initial_interest.as_deref().unwrap_or(""),
            pain.as_str(),
            self.use_case.as_deref().unwrap_or(""),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }
}
