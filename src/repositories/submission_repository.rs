use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Document},
    options::IndexOptions,
    Collection, IndexModel,
};

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::Submission,
};

/// Selection over the `submissions` collection: a `createdAt` range, or all
/// documents when both bounds are absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmissionFilter {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl SubmissionFilter {
    pub fn all() -> Self {
        Self::default()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn count(&self, filter: &SubmissionFilter) -> AppResult<u64>;

    /// One page of matching submissions in stable `(createdAt, id)` order.
    async fn find_page(
        &self,
        filter: &SubmissionFilter,
        skip: u64,
        limit: i64,
    ) -> AppResult<Vec<Submission>>;

    /// Persists the recomputed `score` and `answers` of one submission as a
    /// single atomic update. No other field is touched.
    async fn update_grading(&self, submission: &Submission) -> AppResult<()>;
}

pub struct MongoSubmissionRepository {
    collection: Collection<Submission>,
}

impl MongoSubmissionRepository {
    pub fn new(db: &Database, collection_name: &str) -> Self {
        let collection = db.get_collection(collection_name);
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for submissions collection");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        let created_at_index = IndexModel::builder()
            .keys(doc! { "createdAt": 1, "id": 1 })
            .options(
                IndexOptions::builder()
                    .name("created_at_id".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(id_index).await?;
        self.collection.create_index(created_at_index).await?;

        Ok(())
    }

    fn filter_document(filter: &SubmissionFilter) -> AppResult<Document> {
        let mut document = Document::new();
        let mut range = Document::new();

        if let Some(from) = filter.from {
            range.insert("$gte", to_bson(&from)?);
        }
        if let Some(to) = filter.to {
            range.insert("$lt", to_bson(&to)?);
        }
        if !range.is_empty() {
            document.insert("createdAt", range);
        }

        Ok(document)
    }
}

#[async_trait]
impl SubmissionRepository for MongoSubmissionRepository {
    async fn count(&self, filter: &SubmissionFilter) -> AppResult<u64> {
        let count = self
            .collection
            .count_documents(Self::filter_document(filter)?)
            .await?;
        Ok(count)
    }

    async fn find_page(
        &self,
        filter: &SubmissionFilter,
        skip: u64,
        limit: i64,
    ) -> AppResult<Vec<Submission>> {
        let submissions = self
            .collection
            .find(Self::filter_document(filter)?)
            .sort(doc! { "createdAt": 1, "id": 1 })
            .skip(skip)
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        Ok(submissions)
    }

    async fn update_grading(&self, submission: &Submission) -> AppResult<()> {
        let update = doc! {
            "$set": {
                "score": submission.score,
                "answers": to_bson(&submission.answers)?,
            }
        };

        let result = self
            .collection
            .update_one(doc! { "id": &submission.id }, update)
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(format!(
                "submission '{}' disappeared before update",
                submission.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_filter_selects_everything() {
        let document = MongoSubmissionRepository::filter_document(&SubmissionFilter::all())
            .expect("filter should build");
        assert!(document.is_empty());
    }

    #[test]
    fn date_range_filter_targets_created_at() {
        let filter = SubmissionFilter {
            from: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
        };

        let document =
            MongoSubmissionRepository::filter_document(&filter).expect("filter should build");
        let range = document.get_document("createdAt").unwrap();

        assert!(range.contains_key("$gte"));
        assert!(range.contains_key("$lt"));
    }

    #[test]
    fn open_ended_filter_keeps_single_bound() {
        let filter = SubmissionFilter {
            from: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            to: None,
        };

        let document =
            MongoSubmissionRepository::filter_document(&filter).expect("filter should build");
        let range = document.get_document("createdAt").unwrap();

        assert!(range.contains_key("$gte"));
        assert!(!range.contains_key("$lt"));
    }
}
