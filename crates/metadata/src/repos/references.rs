//! Storage reference collection.

use crate::error::MetadataResult;
use crate::models::ReferenceRow;
use async_trait::async_trait;

/// A table column that stores URLs pointing into a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceSource {
    /// `visitor_entries.photo_url`, keyed by `entry_id`.
    VisitorPhotos,
    /// `profiles.profile_image`, keyed by `profile_id`.
    ProfileImages,
}

impl ReferenceSource {
    pub fn table(self) -> &'static str {
        match self {
            ReferenceSource::VisitorPhotos => "visitor_entries",
            ReferenceSource::ProfileImages => "profiles",
        }
    }

    pub fn id_column(self) -> &'static str {
        match self {
            ReferenceSource::VisitorPhotos => "entry_id",
            ReferenceSource::ProfileImages => "profile_id",
        }
    }

    pub fn value_column(self) -> &'static str {
        match self {
            ReferenceSource::VisitorPhotos => "photo_url",
            ReferenceSource::ProfileImages => "profile_image",
        }
    }

    /// Select every non-null, non-empty value. Identifiers are static, so the
    /// same text works for both SQLite and PostgreSQL.
    pub(crate) fn select_sql(self) -> String {
        let (table, id, value) = (self.table(), self.id_column(), self.value_column());
        format!(
            "SELECT {id} AS record_id, {value} AS value FROM {table} \
             WHERE {value} IS NOT NULL AND {value} <> '' ORDER BY {id}"
        )
    }
}

#[async_trait]
pub trait ReferenceRepo: Send + Sync {
    /// All rows of `source` that carry a non-empty reference.
    async fn list_references(&self, source: ReferenceSource) -> MetadataResult<Vec<ReferenceRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql_filters_empty_values() {
        let sql = ReferenceSource::VisitorPhotos.select_sql();
        assert!(sql.contains("FROM visitor_entries"));
        assert!(sql.contains("photo_url IS NOT NULL AND photo_url <> ''"));
        assert!(sql.starts_with("SELECT entry_id AS record_id"));

        let sql = ReferenceSource::ProfileImages.select_sql();
        assert!(sql.contains("FROM profiles"));
        assert!(sql.contains("profile_image <> ''"));
    }
}
