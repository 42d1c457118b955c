use chrono::{DateTime, Datelike, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Entitlement tier. Only billing events move a user between tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Pro => "PRO",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(Tier::Free),
            "PRO" => Ok(Tier::Pro),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            tier: Tier::Free,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pro(&self) -> bool {
        self.tier == Tier::Pro
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    pub fn new(user_id: Uuid, token: String, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at: now + Duration::hours(expires_in_hours),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Single-use email sign-in token. Only the SHA-256 digest is stored.
#[derive(Debug, Clone)]
pub struct SignInToken {
    pub email: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostLength {
    Short,
    Medium,
    Long,
}

impl PostLength {
    /// Stored representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PostLength::Short => "SHORT",
            PostLength::Medium => "MEDIUM",
            PostLength::Long => "LONG",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "SHORT" => Some(PostLength::Short),
            "MEDIUM" => Some(PostLength::Medium),
            "LONG" => Some(PostLength::Long),
            _ => None,
        }
    }

    /// Approximate word count handed to the model as a hint.
    pub fn target_word_count(&self) -> u32 {
        match self {
            PostLength::Short => 500,
            PostLength::Medium => 900,
            PostLength::Long => 1300,
        }
    }
}

impl FromStr for PostLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(PostLength::Short),
            "medium" => Ok(PostLength::Medium),
            "long" => Ok(PostLength::Long),
            other => Err(format!("length must be short, medium or long, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Introduction,
    Body,
    Conclusion,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Introduction, Section::Body, Section::Conclusion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Introduction => "introduction",
            Section::Body => "body",
            Section::Conclusion => "conclusion",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "introduction" => Ok(Section::Introduction),
            "body" => Ok(Section::Body),
            "conclusion" => Ok(Section::Conclusion),
            other => Err(format!("unknown section '{other}'")),
        }
    }
}

/// SEO block attached to a post. Every field is required, so a partially
/// populated block cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoMetadata {
    pub keyword_density: BTreeMap<String, f64>,
    pub meta_title: String,
    pub meta_description: String,
    pub readability: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub introduction: String,
    pub body: String,
    pub conclusion: String,
    pub keywords: Vec<String>,
    pub length: PostLength,
    pub tone: String,
    pub audience: String,
    pub seo: Option<SeoMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn section(&self, section: Section) -> &str {
        match section {
            Section::Introduction => &self.introduction,
            Section::Body => &self.body,
            Section::Conclusion => &self.conclusion,
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut String {
        match section {
            Section::Introduction => &mut self.introduction,
            Section::Body => &mut self.body,
            Section::Conclusion => &mut self.conclusion,
        }
    }

    /// Refreshes `updated_at`, keeping it strictly increasing even when the
    /// clock has not advanced past the previous value.
    /// Advances `updated_at` by at least one microsecond, the precision
    /// Postgres stores, so successive edits never share a timestamp.
    pub fn touch(&mut self) {
        let now = Utc::now().trunc_subsecs(6);
        let floor = self.updated_at.trunc_subsecs(6) + Duration::microseconds(1);
        self.updated_at = now.max(floor);
    }
}

/// Calendar month a usage counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub year: i32,
    pub month: u32,
}

impl UsagePeriod {
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    /// Months since year zero, for ordering comparisons in SQL.
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub count: u32,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(user_id: Uuid, period: UsagePeriod) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            month: period.month,
            year: period.year,
            count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn period(&self) -> UsagePeriod {
        UsagePeriod { year: self.year, month: self.month }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: Option<String>,
    /// Mirrors the billing provider's vocabulary verbatim.
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub price_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub const PENDING: &'static str = "pending";
    pub const ACTIVE: &'static str = "active";

    pub fn pending(user_id: Uuid, stripe_customer_id: String, price_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            stripe_customer_id,
            stripe_subscription_id: None,
            status: Self::PENDING.to_string(),
            current_period_end: None,
            price_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn usage_period_wraps_year() {
        let jan = UsagePeriod::containing(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(jan, UsagePeriod { year: 2024, month: 1 });
        assert_eq!(jan.previous(), UsagePeriod { year: 2023, month: 12 });
        assert!(jan.previous().ordinal() < jan.ordinal());
    }

    #[test]
    fn length_maps_to_word_hint() {
        assert_eq!("short".parse::<PostLength>().unwrap().target_word_count(), 500);
        assert_eq!("medium".parse::<PostLength>().unwrap().target_word_count(), 900);
        assert_eq!("long".parse::<PostLength>().unwrap().target_word_count(), 1300);
        assert!("huge".parse::<PostLength>().is_err());
        assert_eq!(PostLength::from_db_str(PostLength::Long.as_db_str()), Some(PostLength::Long));
    }

    #[test]
    fn seo_block_requires_every_field() {
        let partial = serde_json::json!({
            "keywordDensity": {"rust": 1.5},
            "metaTitle": "Title"
        });
        assert!(serde_json::from_value::<SeoMetadata>(partial).is_err());
    }

    #[test]
    fn touch_is_strictly_increasing() {
        let now = Utc::now();
        let mut post = Post {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "t".into(),
            introduction: String::new(),
            body: String::new(),
            conclusion: String::new(),
            keywords: vec![],
            length: PostLength::Short,
            tone: "friendly".into(),
            audience: "devs".into(),
            seo: None,
            created_at: now,
            updated_at: now + Duration::hours(1),
        };
        let before = post.updated_at;
        post.touch();
        assert!(post.updated_at > before);
    }

    #[test]
    fn back_to_back_touches_differ_at_microsecond_precision() {
        let now = Utc::now();
        let mut post = Post {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "t".into(),
            introduction: String::new(),
            body: String::new(),
            conclusion: String::new(),
            keywords: vec![],
            length: PostLength::Short,
            tone: "friendly".into(),
            audience: "devs".into(),
            seo: None,
            created_at: now,
            // Sub-microsecond part that Postgres would drop.
            updated_at: now.trunc_subsecs(6) + Duration::nanoseconds(999),
        };

        let mut previous = post.updated_at.trunc_subsecs(6);
        for _ in 0..50 {
            post.touch();
            assert_eq!(post.updated_at, post.updated_at.trunc_subsecs(6));
            assert!(post.updated_at > previous);
            previous = post.updated_at;
        }
    }
}
