use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_LIMIT, MEDIA_PAGE_LIMIT, RESERVED_FIELDS};

/// Category of file a resource accepts as its attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    /// Any `image/*` content type
    Image,
    /// Any `video/*` content type
    Video,
}

impl MediaCategory {
    fn prefix(self) -> &'static str {
        match self {
            MediaCategory::Image => "image/",
            MediaCategory::Video => "video/",
        }
    }

    /// Whether a client-supplied content type falls in this category
    pub fn accepts(self, mime_type_hint: &str) -> bool {
        let essence = mime_type_hint
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence.len() > self.prefix().len() && essence.starts_with(self.prefix())
    }
}

/// The record field holding a resource's attachment path
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttachmentSpec {
    pub field: String,
    pub media: MediaCategory,
}

/// Descriptor of one entity kind served by the generic repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceSchema {
    /// URL segment and storage key, e.g. `courses`
    pub kind: String,
    /// Fields that must be present and non-empty on create
    #[serde(default)]
    pub required: Vec<String>,
    /// Page size when the caller gives none
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default)]
    pub attachment: Option<AttachmentSpec>,
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

impl ResourceSchema {
    fn new(kind: &str, required: &[&str], default_limit: u64) -> Self {
        ResourceSchema {
            kind: kind.to_string(),
            required: required.iter().map(|s| s.to_string()).collect(),
            default_limit,
            attachment: None,
        }
    }

    fn with_attachment(mut self, field: &str, media: MediaCategory) -> Self {
        self.attachment = Some(AttachmentSpec {
            field: field.to_string(),
            media,
        });
        self
    }

    pub fn attachment_field(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.field.as_str())
    }

    /// Check the descriptor on its own; `max_page_limit` bounds `default_limit`.
    pub fn validate(&self, max_page_limit: u64) -> Result<(), String> {
        let kind_ok = !self.kind.is_empty()
            && self
                .kind
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !kind_ok {
            return Err(format!(
                "resource kind '{}' must be lowercase letters, digits or '-'",
                self.kind
            ));
        }
        if self.kind == "resources" {
            return Err("resource kind 'resources' is reserved".to_string());
        }
        if self.default_limit == 0 || self.default_limit > max_page_limit {
            return Err(format!(
                "resource '{}': default_limit must be between 1 and {}",
                self.kind, max_page_limit
            ));
        }
        if let Some(field) = self.attachment_field() {
            if field.is_empty() || RESERVED_FIELDS.contains(&field) || field == "success" {
                return Err(format!(
                    "resource '{}': '{}' cannot be used as the attachment field",
                    self.kind, field
                ));
            }
        }
        Ok(())
    }
}

/// The site's entity kinds, used when the config lists none
pub fn default_catalogue() -> Vec<ResourceSchema> {
    use MediaCategory::{Image, Video};

    vec![
        ResourceSchema::new("courses", &["title", "description", "image"], DEFAULT_PAGE_LIMIT)
            .with_attachment("image", Image),
        ResourceSchema::new("gallery", &["image"], MEDIA_PAGE_LIMIT).with_attachment("image", Image),
        ResourceSchema::new("hero-slides", &["title", "image"], DEFAULT_PAGE_LIMIT)
            .with_attachment("image", Image),
        ResourceSchema::new(
            "bank-details",
            &["bankName", "accountName", "accountNumber"],
            DEFAULT_PAGE_LIMIT,
        ),
        ResourceSchema::new("faqs", &["question", "answer"], DEFAULT_PAGE_LIMIT),
        ResourceSchema::new("case-studies", &["title", "description"], DEFAULT_PAGE_LIMIT)
            .with_attachment("image", Image),
        ResourceSchema::new("volunteers", &["name", "email"], DEFAULT_PAGE_LIMIT)
            .with_attachment("image", Image),
        ResourceSchema::new("our-story", &["title", "content"], MEDIA_PAGE_LIMIT)
            .with_attachment("video", Video),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_category_matching() {
        assert!(MediaCategory::Image.accepts("image/png"));
        assert!(MediaCategory::Image.accepts("IMAGE/JPEG; charset=binary"));
        assert!(!MediaCategory::Image.accepts("text/plain"));
        assert!(!MediaCategory::Image.accepts("image/"));
        assert!(!MediaCategory::Image.accepts("video/mp4"));
        assert!(MediaCategory::Video.accepts("video/mp4"));
    }

    #[test]
    fn test_default_catalogue_is_valid() {
        let catalogue = default_catalogue();
        for schema in &catalogue {
            schema.validate(100).unwrap();
        }
        let gallery = catalogue.iter().find(|s| s.kind == "gallery").unwrap();
        assert_eq!(gallery.default_limit, 20);
    }

    #[test]
    fn test_validate_rejects_bad_descriptors() {
        let bad_kind = ResourceSchema::new("Courses!", &[], 10);
        assert!(bad_kind.validate(100).is_err());

        let too_big = ResourceSchema::new("faqs", &[], 500);
        assert!(too_big.validate(100).is_err());

        let reserved = ResourceSchema::new("faqs", &[], 10).with_attachment("_id", MediaCategory::Image);
        assert!(reserved.validate(100).is_err());
    }
}
