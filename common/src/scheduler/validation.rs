// Boundary checks turning collaborator requests into pending items

use crate::errors::ScheduleError;
use crate::models::{
    parse_fire_date, BulkScheduleRequest, FireTime, ScheduleRequest, ScheduledItem,
    DEFAULT_CATEGORY,
};
use chrono::NaiveDate;

/// Trimmed recipient if it parses as a mail address
pub fn validate_recipient(recipient: &str) -> Result<String, ScheduleError> {
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err(ScheduleError::malformed("recipient", "must not be empty"));
    }
    recipient
        .parse::<lettre::Address>()
        .map_err(|e| ScheduleError::malformed("recipient", format!("'{}': {}", recipient, e)))?;
    Ok(recipient.to_string())
}

fn validate_fire_at(fire_date: &str, fire_time: &str) -> Result<(NaiveDate, FireTime), ScheduleError> {
    let date = parse_fire_date(fire_date)?;
    let time = fire_time
        .parse::<FireTime>()
        .map_err(|reason| ScheduleError::malformed("fire_time", reason))?;
    Ok((date, time))
}

fn category_or_default(category: Option<&str>) -> String {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string()
}

/// Validate a single request and build the pending item for it
///
/// Past dates are accepted; whether they fire is the dispatch policy's call.
pub fn build_item(request: ScheduleRequest) -> Result<ScheduledItem, ScheduleError> {
    let recipient = validate_recipient(&request.recipient)?;
    let (fire_date, fire_time) = validate_fire_at(&request.fire_date, &request.fire_time)?;
    for attachment in &request.attachments {
        if attachment.filename.trim().is_empty() {
            return Err(ScheduleError::malformed(
                "attachments",
                "attachment filename must not be empty",
            ));
        }
    }

    Ok(ScheduledItem::new(
        recipient,
        request.subject,
        request.body,
        fire_date,
        fire_time,
        category_or_default(request.category.as_deref()),
        request.attachments,
    ))
}

/// Validate a bulk request and build one item per recipient
///
/// All-or-nothing: any malformed recipient rejects the whole batch.
pub fn build_bulk_items(request: BulkScheduleRequest) -> Result<Vec<ScheduledItem>, ScheduleError> {
    if request.recipients.is_empty() {
        return Err(ScheduleError::malformed(
            "recipients",
            "at least one recipient is required",
        ));
    }
    let (fire_date, fire_time) = validate_fire_at(&request.fire_date, &request.fire_time)?;
    let category = category_or_default(request.category.as_deref());

    request
        .recipients
        .iter()
        .map(|recipient| {
            validate_recipient(recipient).map(|recipient| {
                ScheduledItem::new(
                    recipient,
                    request.subject.clone(),
                    request.body.clone(),
                    fire_date,
                    fire_time,
                    category.clone(),
                    Vec::new(),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, ItemStatus};

    fn request(recipient: &str, date: &str, time: &str) -> ScheduleRequest {
        ScheduleRequest {
            recipient: recipient.to_string(),
            subject: "Partnership Opportunity".to_string(),
            body: "<p>Hello</p>".to_string(),
            fire_date: date.to_string(),
            fire_time: time.to_string(),
            category: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_build_item_defaults() {
        let item = build_item(request(" x@example.com ", "2025-07-06", "10:00")).unwrap();
        assert_eq!(item.recipient, "x@example.com");
        assert_eq!(item.category, DEFAULT_CATEGORY);
        assert_eq!(item.fire_time.to_string(), "10:00");
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.sent_at.is_none());
    }

    #[test]
    fn test_build_item_rejects_malformed_input() {
        let cases = [
            ("", "2025-07-06", "10:00", "recipient"),
            ("not-an-address", "2025-07-06", "10:00", "recipient"),
            ("x@example.com", "06/07/2025", "10:00", "fire_date"),
            ("x@example.com", "2025-07-06", "10am", "fire_time"),
            ("x@example.com", "2025-07-06", "25:00", "fire_time"),
        ];
        for (recipient, date, time, field) in cases {
            match build_item(request(recipient, date, time)) {
                Err(ScheduleError::MalformedSchedule { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected malformed {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_build_item_accepts_past_dates() {
        assert!(build_item(request("x@example.com", "1999-01-01", "00:00")).is_ok());
    }

    #[test]
    fn test_build_item_rejects_unnamed_attachment() {
        let mut req = request("x@example.com", "2025-07-06", "10:00");
        req.attachments.push(Attachment::new(" ", "application/pdf", "AAAA"));
        assert!(build_item(req).is_err());
    }

    #[test]
    fn test_bulk_is_all_or_nothing() {
        let bulk = BulkScheduleRequest {
            recipients: vec!["a@example.com".to_string(), "broken".to_string()],
            subject: "s".to_string(),
            body: "b".to_string(),
            fire_date: "2025-07-06".to_string(),
            fire_time: "10:00".to_string(),
            category: Some("certificate".to_string()),
        };
        assert!(build_bulk_items(bulk).is_err());
    }

    #[test]
    fn test_bulk_builds_one_item_per_recipient() {
        let bulk = BulkScheduleRequest {
            recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            subject: "s".to_string(),
            body: "b".to_string(),
            fire_date: "2025-07-06".to_string(),
            fire_time: "10:00".to_string(),
            category: Some("certificate".to_string()),
        };
        let items = build_bulk_items(bulk).unwrap();
        assert_eq!(items.len(), 2);
        assert_ne!(items[0].id, items[1].id);
        assert!(items.iter().all(|i| i.category == "certificate"));
    }

    #[test]
    fn test_bulk_requires_recipients() {
        let bulk = BulkScheduleRequest {
            recipients: Vec::new(),
            subject: "s".to_string(),
            body: "b".to_string(),
            fire_date: "2025-07-06".to_string(),
            fire_time: "10:00".to_string(),
            category: None,
        };
        assert!(build_bulk_items(bulk).is_err());
    }
}
