//! Feedback submissions: validation of incoming forms and the anonymised,
//! aggregated view served to the public feedback page.

use crate::db::FeedbackEntry;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"))
}

/// Raw feedback form as posted by the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub is_anonymous: Option<bool>,
    pub user_experience_rating: Option<i64>,
    pub ease_of_use_rating: Option<i64>,
    pub translation_usefulness: Option<i64>,
    pub analysis_usefulness: Option<i64>,
    pub would_recommend: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Yes,
    No,
    Maybe,
}

impl Recommendation {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Yes" => Some(Recommendation::Yes),
            "No" => Some(Recommendation::No),
            "Maybe" => Some(Recommendation::Maybe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Yes => "Yes",
            Recommendation::No => "No",
            Recommendation::Maybe => "Maybe",
        }
    }
}

/// The four optional 1-5 ratings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ratings {
    pub user_experience: Option<i32>,
    pub ease_of_use: Option<i32>,
    pub translation_usefulness: Option<i32>,
    pub analysis_usefulness: Option<i32>,
}

/// A validated submission, ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedback {
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: String,
    pub is_anonymous: bool,
    pub ratings: Ratings,
    pub would_recommend: Option<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl FeedbackSubmission {
    /// Check the submission and normalise it for storage.
    ///
    /// Anonymous submissions never carry a name or email. Empty strings count
    /// as absent for the optional text fields.
    pub fn validate(self) -> Result<NewFeedback, ValidationError> {
        let message = match self.message {
            Some(m) if !m.trim().is_empty() => m,
            _ => return Err(ValidationError("Feedback message is required".into())),
        };

        let is_anonymous = self.is_anonymous.unwrap_or(false);

        if !is_anonymous {
            match self.email.as_deref() {
                Some(email) if !email.trim().is_empty() => {
                    if !email_regex().is_match(email) {
                        return Err(ValidationError("Invalid email format".into()));
                    }
                }
                _ => {
                    return Err(ValidationError(
                        "Email is required when not submitting anonymously".into(),
                    ))
                }
            }
        }

        let rating_errors: Vec<String> = [
            (self.user_experience_rating, "User experience rating"),
            (self.ease_of_use_rating, "Ease of use rating"),
            (self.translation_usefulness, "Translation usefulness"),
            (self.analysis_usefulness, "Analysis usefulness"),
        ]
        .into_iter()
        .filter_map(|(rating, field)| match rating {
            Some(r) if !(1..=5).contains(&r) => Some(format!("{} must be between 1 and 5", field)),
            _ => None,
        })
        .collect();

        if !rating_errors.is_empty() {
            return Err(ValidationError(rating_errors.join(", ")));
        }

        let would_recommend = match self.would_recommend.as_deref() {
            None | Some("") => None,
            Some(value) => Some(Recommendation::parse(value).ok_or_else(|| {
                ValidationError("Would recommend must be Yes, No, or Maybe".into())
            })?),
        };

        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let (name, email) = if is_anonymous {
            (None, None)
        } else {
            (non_empty(self.name), non_empty(self.email))
        };

        // Range-checked above, so the narrowing cannot truncate.
        let narrow = |r: Option<i64>| r.map(|v| v as i32);

        Ok(NewFeedback {
            name,
            email,
            message,
            is_anonymous,
            ratings: Ratings {
                user_experience: narrow(self.user_experience_rating),
                ease_of_use: narrow(self.ease_of_use_rating),
                translation_usefulness: narrow(self.translation_usefulness),
                analysis_usefulness: narrow(self.analysis_usefulness),
            },
            would_recommend,
        })
    }
}

/// A feedback entry with identity fields removed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnonymousFeedback {
    pub id: i32,
    pub message: String,
    pub created_at: String,
}

/// Body of `GET /api/feedback/get`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub success: bool,
    pub feedback: Vec<AnonymousFeedback>,
    pub count: usize,
    pub ratings_count: usize,
    pub average_user_experience_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FeedbackSummary {
    /// Anonymise `entries` (already newest first) and average the
    /// user-experience ratings to one decimal place.
    pub fn from_entries(entries: &[FeedbackEntry]) -> Self {
        let ratings: Vec<i32> = entries
            .iter()
            .filter_map(|e| e.user_experience_rating)
            .collect();

        let average_user_experience_rating = if ratings.is_empty() {
            None
        } else {
            let mean = ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / ratings.len() as f64;
            Some((mean * 10.0).round() / 10.0)
        };

        let feedback: Vec<AnonymousFeedback> = entries
            .iter()
            .map(|e| AnonymousFeedback {
                id: e.id,
                message: e.message.clone(),
                created_at: format_timestamp(e),
            })
            .collect();

        Self {
            success: true,
            count: feedback.len(),
            feedback,
            ratings_count: ratings.len(),
            average_user_experience_rating,
            message: None,
        }
    }

    /// Response used before the feedback table exists
    pub fn empty() -> Self {
        Self {
            success: true,
            feedback: Vec::new(),
            count: 0,
            ratings_count: 0,
            average_user_experience_rating: None,
            message: Some("No feedback yet. Be the first to submit!".to_string()),
        }
    }
}

/// ISO-8601 UTC with milliseconds; rows without a timestamp report "now".
fn format_timestamp(entry: &FeedbackEntry) -> String {
    entry
        .created_at
        .map(|ts| ts.and_utc())
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn submission() -> FeedbackSubmission {
        FeedbackSubmission {
            name: Some("Anna".to_string()),
            email: Some("anna@example.com".to_string()),
            message: Some("Sehr hilfreich!".to_string()),
            ..Default::default()
        }
    }

    fn entry(id: i32, rating: Option<i32>) -> FeedbackEntry {
        FeedbackEntry {
            id,
            name: Some("Anna".to_string()),
            email: Some("anna@example.com".to_string()),
            message: format!("message {}", id),
            is_anonymous: false,
            user_experience_rating: rating,
            ease_of_use_rating: None,
            translation_usefulness: None,
            analysis_usefulness: None,
            would_recommend: None,
            created_at: NaiveDate::from_ymd_opt(2025, 3, 1)
                .and_then(|d| d.and_hms_milli_opt(10, 30, 0, 250)),
        }
    }

    // ==================== Validation ====================

    #[test]
    fn test_valid_submission() {
        let feedback = submission().validate().unwrap();
        assert_eq!(feedback.name.as_deref(), Some("Anna"));
        assert_eq!(feedback.email.as_deref(), Some("anna@example.com"));
        assert_eq!(feedback.message, "Sehr hilfreich!");
        assert!(!feedback.is_anonymous);
        assert_eq!(feedback.ratings, Ratings::default());
        assert_eq!(feedback.would_recommend, None);
    }

    #[test]
    fn test_message_required() {
        for message in [None, Some(String::new()), Some("   ".to_string())] {
            let err = FeedbackSubmission {
                message,
                ..submission()
            }
            .validate()
            .unwrap_err();
            assert_eq!(err.to_string(), "Feedback message is required");
        }
    }

    #[test]
    fn test_email_required_unless_anonymous() {
        let err = FeedbackSubmission {
            email: None,
            ..submission()
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Email is required when not submitting anonymously"
        );

        let err = FeedbackSubmission {
            email: Some("  ".to_string()),
            ..submission()
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Email is required when not submitting anonymously"
        );
    }

    #[test]
    fn test_invalid_email_format() {
        for email in ["anna", "anna@example", "anna @example.com", "@example.com"] {
            let err = FeedbackSubmission {
                email: Some(email.to_string()),
                ..submission()
            }
            .validate()
            .unwrap_err();
            assert_eq!(err.to_string(), "Invalid email format", "email: {}", email);
        }
    }

    #[test]
    fn test_anonymous_drops_identity() {
        let feedback = FeedbackSubmission {
            email: Some("not an email".to_string()),
            is_anonymous: Some(true),
            ..submission()
        }
        .validate()
        .unwrap();

        assert!(feedback.is_anonymous);
        assert_eq!(feedback.name, None);
        assert_eq!(feedback.email, None);
    }

    #[test]
    fn test_empty_name_stored_as_none() {
        let feedback = FeedbackSubmission {
            name: Some(String::new()),
            ..submission()
        }
        .validate()
        .unwrap();
        assert_eq!(feedback.name, None);
    }

    #[test]
    fn test_ratings_in_range() {
        let feedback = FeedbackSubmission {
            user_experience_rating: Some(5),
            ease_of_use_rating: Some(1),
            translation_usefulness: Some(3),
            analysis_usefulness: None,
            ..submission()
        }
        .validate()
        .unwrap();

        assert_eq!(
            feedback.ratings,
            Ratings {
                user_experience: Some(5),
                ease_of_use: Some(1),
                translation_usefulness: Some(3),
                analysis_usefulness: None,
            }
        );
    }

    #[test]
    fn test_rating_errors_are_joined() {
        let err = FeedbackSubmission {
            user_experience_rating: Some(0),
            translation_usefulness: Some(6),
            analysis_usefulness: Some(-1),
            ..submission()
        }
        .validate()
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "User experience rating must be between 1 and 5, \
             Translation usefulness must be between 1 and 5, \
             Analysis usefulness must be between 1 and 5"
        );
    }

    #[test]
    fn test_would_recommend_values() {
        for (raw, expected) in [
            ("Yes", Recommendation::Yes),
            ("No", Recommendation::No),
            ("Maybe", Recommendation::Maybe),
        ] {
            let feedback = FeedbackSubmission {
                would_recommend: Some(raw.to_string()),
                ..submission()
            }
            .validate()
            .unwrap();
            assert_eq!(feedback.would_recommend, Some(expected));
            assert_eq!(expected.as_str(), raw);
        }

        let feedback = FeedbackSubmission {
            would_recommend: Some(String::new()),
            ..submission()
        }
        .validate()
        .unwrap();
        assert_eq!(feedback.would_recommend, None);
    }

    #[test]
    fn test_would_recommend_invalid() {
        let err = FeedbackSubmission {
            would_recommend: Some("yes".to_string()),
            ..submission()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "Would recommend must be Yes, No, or Maybe");
    }

    #[test]
    fn test_submission_deserializes_camel_case() {
        let json = r#"{
            "name": null,
            "email": null,
            "message": "Gut",
            "isAnonymous": true,
            "userExperienceRating": 4,
            "easeOfUseRating": null,
            "wouldRecommend": "Maybe"
        }"#;
        let submission: FeedbackSubmission = serde_json::from_str(json).unwrap();
        assert_eq!(submission.is_anonymous, Some(true));
        assert_eq!(submission.user_experience_rating, Some(4));
        assert_eq!(submission.ease_of_use_rating, None);
        assert_eq!(submission.would_recommend.as_deref(), Some("Maybe"));
    }

    // ==================== Summary ====================

    #[test]
    fn test_summary_of_no_entries() {
        let summary = FeedbackSummary::from_entries(&[]);
        assert!(summary.success);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.ratings_count, 0);
        assert_eq!(summary.average_user_experience_rating, None);
    }

    #[test]
    fn test_summary_average_rounded_to_one_decimal() {
        let entries = vec![entry(3, Some(5)), entry(2, Some(4)), entry(1, Some(4)), entry(0, None)];
        let summary = FeedbackSummary::from_entries(&entries);

        assert_eq!(summary.count, 4);
        assert_eq!(summary.ratings_count, 3);
        assert_eq!(summary.average_user_experience_rating, Some(4.3));
        assert_eq!(
            summary.feedback.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![3, 2, 1, 0]
        );
    }

    #[test]
    fn test_summary_strips_identity_and_formats_timestamp() {
        let summary = FeedbackSummary::from_entries(&[entry(7, None)]);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["feedback"][0]["id"], 7);
        assert_eq!(json["feedback"][0]["message"], "message 7");
        assert_eq!(json["feedback"][0]["created_at"], "2025-03-01T10:30:00.250Z");
        assert!(json["feedback"][0].get("name").is_none());
        assert!(json["feedback"][0].get("email").is_none());
        assert!(json.get("averageUserExperienceRating").unwrap().is_null());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_empty_summary_has_message() {
        let json = serde_json::to_value(FeedbackSummary::empty()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 0);
        assert_eq!(json["ratingsCount"], 0);
        assert_eq!(json["message"], "No feedback yet. Be the first to submit!");
    }
}
