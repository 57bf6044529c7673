use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ScheduleError;

/// Category assigned when a request does not name one
pub const DEFAULT_CATEGORY: &str = "sponsor";

/// Content type used for attachments that do not declare one
pub const DEFAULT_ATTACHMENT_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// Scheduled Item Models
// ============================================================================

/// ScheduledItem is one timed send: a recipient, a rendered message and the
/// local wall-clock minute at which it should go out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledItem {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub fire_date: NaiveDate,
    pub fire_time: FireTime,
    pub category: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl ScheduledItem {
    /// Create a new pending item with a fresh id
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        fire_date: NaiveDate,
        fire_time: FireTime,
        category: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            fire_date,
            fire_time,
            category: category.into(),
            attachments,
            status: ItemStatus::Pending,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    /// Local wall-clock minute this item is scheduled for
    pub fn fire_at(&self) -> NaiveDateTime {
        self.fire_date.and_time(self.fire_time.as_naive_time())
    }

    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }

    /// Whether the item should fire on a tick observing `now`
    ///
    /// `now` is truncated to the minute before comparison. Items that already
    /// left `pending` are never due.
    pub fn is_due(&self, now: NaiveDateTime, policy: MissedFirePolicy) -> bool {
        if !self.is_pending() {
            return false;
        }
        let now = truncate_to_minute(now);
        match policy {
            MissedFirePolicy::CatchUp => self.fire_at() <= now,
            MissedFirePolicy::ExactMinute => self.fire_at() == now,
        }
    }

    /// Move the item out of `pending` into a terminal status
    ///
    /// Returns false and leaves the item untouched if it is not pending or if
    /// `status` is not terminal.
    pub fn complete(&mut self, status: ItemStatus, at: DateTime<Utc>) -> bool {
        if !self.is_pending() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.sent_at = Some(at);
        true
    }

    /// The message this item delivers
    pub fn envelope(&self) -> Envelope {
        Envelope {
            recipient: self.recipient.clone(),
            subject: self.subject.clone(),
            html_body: self.body.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Drop seconds and sub-second precision
pub fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// ItemStatus is the lifecycle state of a scheduled item
///
/// `pending` moves to exactly one of `sent` or `failed`, never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Sent,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Sent => "sent",
            ItemStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "sent" => Ok(ItemStatus::Sent),
            "failed" => Ok(ItemStatus::Failed),
            _ => Err(format!("Invalid item status: {}", s)),
        }
    }
}

impl TryFrom<String> for ItemStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// FireTime is a local time of day at minute resolution, written "HH:MM"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FireTime(NaiveTime);

impl FireTime {
    /// Build from hour (0-23) and minute (0-59)
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(FireTime)
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        self.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }
}

impl From<NaiveTime> for FireTime {
    fn from(time: NaiveTime) -> Self {
        FireTime(
            NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(NaiveTime::MIN),
        )
    }
}

impl std::fmt::Display for FireTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for FireTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Strict HH:MM, chrono alone would also accept "9:5"
        let (hour, minute) = s
            .split_once(':')
            .filter(|(h, m)| h.len() == 2 && m.len() == 2)
            .ok_or_else(|| format!("expected HH:MM, got '{}'", s))?;
        let hour: u32 = hour
            .parse()
            .map_err(|_| format!("invalid hour in '{}'", s))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| format!("invalid minute in '{}'", s))?;
        FireTime::from_hm(hour, minute).ok_or_else(|| format!("'{}' is not a 24-hour time", s))
    }
}

impl Serialize for FireTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FireTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FireTime::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a fire date given as `YYYY-MM-DD` or as an ISO datetime whose date
/// part is used
pub fn parse_fire_date(input: &str) -> Result<NaiveDate, ScheduleError> {
    let input = input.trim();
    let date_part = input.split(['T', ' ']).next().unwrap_or(input);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| {
        ScheduleError::malformed("fire_date", format!("'{}' is not a calendar date: {}", input, e))
    })
}

/// Attachment is an opaque payload carried along with a scheduled item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Base64-encoded content
    pub data: String,
}

fn default_content_type() -> String {
    DEFAULT_ATTACHMENT_CONTENT_TYPE.to_string()
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// MissedFirePolicy decides what happens to items whose minute has passed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissedFirePolicy {
    /// Fire on the first tick at or after the scheduled minute
    #[default]
    CatchUp,
    /// Fire only on a tick that observes exactly the scheduled minute
    ExactMinute,
}

// ============================================================================
// Request Models
// ============================================================================

/// ScheduleRequest is unvalidated input from a collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub fire_date: String,
    pub fire_time: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// BulkScheduleRequest schedules the same message for many recipients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkScheduleRequest {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub fire_date: String,
    pub fire_time: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Envelope is everything the delivery gateway needs to send one message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Envelope {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            html_body: html_body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_at(date: &str, time: &str) -> ScheduledItem {
        ScheduledItem::new(
            "x@example.com",
            "Hello",
            "<p>Hi</p>",
            parse_fire_date(date).unwrap(),
            time.parse().unwrap(),
            DEFAULT_CATEGORY,
            Vec::new(),
        )
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_fire_time_parse_and_display() {
        let t: FireTime = "09:05".parse().unwrap();
        assert_eq!(t.hour(), 9);
        assert_eq!(t.minute(), 5);
        assert_eq!(t.to_string(), "09:05");
    }

    #[test]
    fn test_fire_time_rejects_malformed() {
        assert!("9:05".parse::<FireTime>().is_err());
        assert!("24:00".parse::<FireTime>().is_err());
        assert!("12:60".parse::<FireTime>().is_err());
        assert!("12-30".parse::<FireTime>().is_err());
        assert!("".parse::<FireTime>().is_err());
    }

    #[test]
    fn test_fire_time_serde_as_string() {
        let t: FireTime = "23:59".parse().unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"23:59\"");
        let back: FireTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_parse_fire_date_accepts_iso_datetime() {
        let d = parse_fire_date("2025-07-06T00:00:00").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 7, 6).unwrap());
        assert!(parse_fire_date("2025-13-01").is_err());
        assert!(parse_fire_date("tomorrow").is_err());
    }

    #[test]
    fn test_item_status_round_trip() {
        for status in [ItemStatus::Pending, ItemStatus::Sent, ItemStatus::Failed] {
            assert_eq!(status.to_string().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_is_due_exact_minute() {
        let item = item_at("2025-07-06", "10:00");
        assert!(item.is_due(at("2025-07-06 10:00:42"), MissedFirePolicy::ExactMinute));
        assert!(!item.is_due(at("2025-07-06 10:01:00"), MissedFirePolicy::ExactMinute));
        assert!(!item.is_due(at("2025-07-06 09:59:59"), MissedFirePolicy::ExactMinute));
    }

    #[test]
    fn test_is_due_catch_up() {
        let item = item_at("2025-07-06", "10:00");
        assert!(item.is_due(at("2025-07-06 10:00:00"), MissedFirePolicy::CatchUp));
        assert!(item.is_due(at("2025-07-07 08:00:00"), MissedFirePolicy::CatchUp));
        assert!(!item.is_due(at("2025-07-06 09:59:59"), MissedFirePolicy::CatchUp));
    }

    #[test]
    fn test_complete_sets_sent_at_once() {
        let mut item = item_at("2025-07-06", "10:00");
        let now = Utc::now();
        assert!(item.complete(ItemStatus::Sent, now));
        assert_eq!(item.sent_at, Some(now));
        assert!(!item.complete(ItemStatus::Failed, Utc::now()));
        assert_eq!(item.status, ItemStatus::Sent);
        assert_eq!(item.sent_at, Some(now));
    }

    #[test]
    fn test_complete_rejects_pending_target() {
        let mut item = item_at("2025-07-06", "10:00");
        assert!(!item.complete(ItemStatus::Pending, Utc::now()));
        assert!(item.sent_at.is_none());
    }

    #[test]
    fn test_attachment_default_content_type() {
        let a: Attachment =
            serde_json::from_str(r#"{"filename":"cert.pdf","data":"aGVsbG8="}"#).unwrap();
        assert_eq!(a.content_type, DEFAULT_ATTACHMENT_CONTENT_TYPE);
    }

    #[test]
    fn test_missed_fire_policy_serde() {
        let p: MissedFirePolicy = serde_json::from_str("\"exact_minute\"").unwrap();
        assert_eq!(p, MissedFirePolicy::ExactMinute);
        assert_eq!(MissedFirePolicy::default(), MissedFirePolicy::CatchUp);
    }
}
