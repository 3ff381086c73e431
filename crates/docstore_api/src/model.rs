//! Stored entities and API response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A classified advert as stored in the `adverts` index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Advert {
    /// Advert identifier; also the document id and routing key.
    pub id: i64,
    /// Headline.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Revision counter.
    pub version: i16,
    /// Category snapshot embedded in the advert.
    pub category: AdvertCategory,
    /// Author of the first revision.
    pub created_by: String,
    /// Creation timestamp as written by the producer.
    pub creation_date: String,
    /// Author of the latest revision.
    pub modified_by: String,
    /// Last modification timestamp as written by the producer.
    pub last_modified_date: String,
}

/// Category snapshot embedded in an [`Advert`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvertCategory {
    /// Category identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Revision counter.
    pub version: i16,
    /// Author of the first revision.
    pub created_by: String,
    /// Creation timestamp.
    pub creation_date: String,
    /// Author of the latest revision.
    pub modified_by: String,
    /// Last modification timestamp.
    pub last_modified_date: String,
}

/// A category as stored in the `categories` index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Category {
    /// Category identifier; also the document id and routing key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Revision counter.
    pub version: i16,
    /// When the category was last indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    /// Author of the first revision.
    pub created_by: String,
    /// Creation timestamp.
    pub creation_date: String,
    /// Author of the latest revision.
    pub modified_by: String,
    /// Last modification timestamp.
    pub last_modified_date: String,
}

/// Body of `GET /adverts/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertResponse {
    /// Advert identifier.
    pub id: i64,
    /// Headline.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Category summary.
    pub category: AdvertCategoryResponse,
}

/// Category summary inside an [`AdvertResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertCategoryResponse {
    /// Category identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// Body of `GET /categories/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResponse {
    /// Category identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
}

impl From<Advert> for AdvertResponse {
    fn from(advert: Advert) -> Self {
        Self {
            id: advert.id,
            title: advert.title,
            description: advert.description,
            category: AdvertCategoryResponse {
                id: advert.category.id,
                name: advert.category.name,
            },
        }
    }
}

impl From<Category> for CategoryResponse {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
        }
    }
}
