//! Database repository layer
//!
//! Append and query operations for decisions and reviews.

use crate::analytics::{ClassifiedStall, DecisionStats};
use crate::decision::Decision;
use crate::error::{Error, Result};
use crate::review::{ReviewRecord, ReviewStats};
use crate::types::{Action, StallCategory};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Filter for listing decisions.
#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    pub action: Option<Action>,
    pub category: Option<StallCategory>,
    pub conversation_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Database handle (single connection)
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for concurrent readers
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Decision operations
    // ============================================

    /// Append a decision. Returns `false` if a decision with the same id
    /// was already stored.
    pub fn append_decision(&self, decision: &Decision) -> Result<bool> {
        let record = serde_json::to_string(decision)?;
        let classification = decision.classification();
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            r#"
            INSERT INTO decisions (
                decision_id, conversation_id, decided_at, action,
                category, confidence, origin_prompt, record
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(decision_id) DO NOTHING
            "#,
            params![
                decision.decision_id(),
                decision.conversation_id(),
                decision.decided_at().to_rfc3339(),
                decision.action().as_str(),
                classification.map(|c| c.category.as_str()),
                classification.map(|c| c.confidence),
                decision.origin_prompt(),
                record,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Get a decision by ID
    pub fn get_decision(&self, decision_id: &str) -> Result<Option<Decision>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT record FROM decisions WHERE decision_id = ?",
            [decision_id],
            Self::row_to_decision,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List decisions, newest first
    pub fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT record FROM decisions WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(action) = &filter.action {
            sql.push_str(" AND action = ?");
            params.push(Box::new(action.as_str().to_string()));
        }

        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            params.push(Box::new(category.as_str().to_string()));
        }

        if let Some(conversation_id) = &filter.conversation_id {
            sql.push_str(" AND conversation_id = ?");
            params.push(Box::new(conversation_id.clone()));
        }

        if let Some(since) = &filter.since {
            sql.push_str(" AND decided_at >= ?");
            params.push(Box::new(since.to_rfc3339()));
        }

        sql.push_str(" ORDER BY decided_at DESC, decision_id");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let decisions = stmt
            .query_map(params_refs.as_slice(), Self::row_to_decision)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(decisions)
    }

    /// Every classified decision that has an origin prompt, as input for
    /// friction aggregation.
    pub fn list_classified_stalls(&self) -> Result<Vec<ClassifiedStall>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT conversation_id, origin_prompt, category, confidence
            FROM decisions
            WHERE category IS NOT NULL AND origin_prompt IS NOT NULL
            "#,
        )?;
        let stalls = stmt
            .query_map([], |row| {
                let category_str: String = row.get("category")?;
                let category = category_str.parse::<StallCategory>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
                })?;
                Ok(ClassifiedStall {
                    conversation_id: row.get("conversation_id")?,
                    origin_prompt: row.get("origin_prompt")?,
                    category,
                    confidence: row.get("confidence")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stalls)
    }

    /// Queued decisions nobody has reviewed yet, oldest first
    pub fn review_queue(&self, limit: usize) -> Result<Vec<Decision>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT d.record
            FROM decisions d
            WHERE d.action = ?1
              AND NOT EXISTS (SELECT 1 FROM reviews r WHERE r.decision_id = d.decision_id)
            ORDER BY d.decided_at ASC, d.decision_id
            LIMIT ?2
            "#,
        )?;
        let decisions = stmt
            .query_map(
                params![Action::QueueForReview.as_str(), limit as i64],
                Self::row_to_decision,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(decisions)
    }

    pub fn decision_stats(&self) -> Result<DecisionStats> {
        let decisions = self.list_decisions(&DecisionFilter::default())?;
        Ok(DecisionStats::from_decisions(&decisions))
    }

    fn row_to_decision(row: &Row) -> rusqlite::Result<Decision> {
        let record: String = row.get(0)?;
        serde_json::from_str(&record)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    }

    // ============================================
    // Review operations
    // ============================================

    /// Append a review. The referenced decision must exist.
    pub fn insert_review(&self, review: &ReviewRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM decisions WHERE decision_id = ?)",
            [&review.decision_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound(format!(
                "decision {}",
                review.decision_id
            )));
        }

        conn.execute(
            r#"
            INSERT INTO reviews (
                review_id, decision_id, disposition, edited_text, reviewer, notes, reviewed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                review.review_id,
                review.decision_id,
                review.disposition.as_str(),
                review.edited_text,
                review.reviewer,
                review.notes,
                review.reviewed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Reviews, optionally for one decision, oldest first
    pub fn list_reviews(&self, decision_id: Option<&str>) -> Result<Vec<ReviewRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM reviews
            WHERE ?1 IS NULL OR decision_id = ?1
            ORDER BY reviewed_at ASC, review_id
            "#,
        )?;
        let reviews = stmt
            .query_map([decision_id], Self::row_to_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    pub fn review_stats(&self) -> Result<ReviewStats> {
        let reviews = self.list_reviews(None)?;
        Ok(ReviewStats::from_records(&reviews))
    }

    fn row_to_review(row: &Row) -> rusqlite::Result<ReviewRecord> {
        let disposition_str: String = row.get("disposition")?;
        let reviewed_at_str: String = row.get("reviewed_at")?;

        Ok(ReviewRecord {
            review_id: row.get("review_id")?,
            decision_id: row.get("decision_id")?,
            disposition: disposition_str.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
            })?,
            edited_text: row.get("edited_text")?,
            reviewer: row.get("reviewer")?,
            notes: row.get("notes")?,
            reviewed_at: DateTime::parse_from_rfc3339(&reviewed_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
                })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{emit, DecisionParts};
    use crate::review::ReviewDisposition;
    use crate::types::{BackendStatus, Classification, StatusSnapshot};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn decision(conversation_id: &str, action: Action, category: StallCategory) -> Decision {
        emit(DecisionParts {
            conversation_id: conversation_id.to_string(),
            origin_prompt: Some("I need your VIN".to_string()),
            gate: BackendStatus::observed(conversation_id, StatusSnapshot::default(), Utc::now()),
            classification: Some(Classification::new(category, 0.8, "no VIN").unwrap()),
            classification_error: None,
            action,
            message: None,
            composition_error: None,
        })
        .unwrap()
    }

    #[test]
    fn test_append_and_get_decision() {
        let db = test_db();
        let d = decision("c-1", Action::QueueForReview, StallCategory::HighFriction);
        assert!(db.append_decision(&d).unwrap());

        let loaded = db.get_decision(d.decision_id()).unwrap().unwrap();
        assert_eq!(loaded, d);
        assert!(db.get_decision("missing").unwrap().is_none());
    }

    #[test]
    fn test_append_is_idempotent_on_decision_id() {
        let db = test_db();
        let d = decision("c-1", Action::SkipBenign, StallCategory::Benign);
        assert!(db.append_decision(&d).unwrap());
        assert!(!db.append_decision(&d).unwrap());
        assert_eq!(db.list_decisions(&DecisionFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_list_decisions_filters() {
        let db = test_db();
        db.append_decision(&decision("c-1", Action::QueueForReview, StallCategory::HighFriction))
            .unwrap();
        db.append_decision(&decision("c-2", Action::SkipBenign, StallCategory::Benign))
            .unwrap();

        let queued = db
            .list_decisions(&DecisionFilter {
                action: Some(Action::QueueForReview),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].conversation_id(), "c-1");

        let benign = db
            .list_decisions(&DecisionFilter {
                category: Some(StallCategory::Benign),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(benign.len(), 1);

        let limited = db
            .list_decisions(&DecisionFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_classified_stalls_skip_unclassified() {
        let db = test_db();
        db.append_decision(&decision("c-1", Action::QueueForReview, StallCategory::HighFriction))
            .unwrap();
        let unsafe_decision = emit(DecisionParts {
            conversation_id: "c-2".to_string(),
            origin_prompt: Some("I need your VIN".to_string()),
            gate: BackendStatus::unavailable("c-2", "down", Utc::now()),
            classification: None,
            classification_error: None,
            action: Action::SkipUnsafe,
            message: None,
            composition_error: None,
        })
        .unwrap();
        db.append_decision(&unsafe_decision).unwrap();

        let stalls = db.list_classified_stalls().unwrap();
        assert_eq!(stalls.len(), 1);
        assert_eq!(stalls[0].conversation_id, "c-1");
        assert_eq!(stalls[0].category, StallCategory::HighFriction);
    }

    #[test]
    fn test_review_queue_and_stats() {
        let db = test_db();
        let a = decision("c-1", Action::QueueForReview, StallCategory::HighFriction);
        let b = decision("c-2", Action::QueueForReview, StallCategory::Confusion);
        db.append_decision(&a).unwrap();
        db.append_decision(&b).unwrap();
        db.append_decision(&decision("c-3", Action::SkipBenign, StallCategory::Benign))
            .unwrap();

        assert_eq!(db.review_queue(10).unwrap().len(), 2);

        let review = ReviewRecord::new(&a, ReviewDisposition::Approved, None, None, None).unwrap();
        db.insert_review(&review).unwrap();

        let queue = db.review_queue(10).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].decision_id(), b.decision_id());

        let stats = db.review_stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.approved, 1);

        let reviews = db.list_reviews(Some(a.decision_id())).unwrap();
        assert_eq!(reviews, vec![review]);
    }

    #[test]
    fn test_review_of_unknown_decision_is_not_found() {
        let db = test_db();
        let d = decision("c-1", Action::QueueForReview, StallCategory::HighFriction);
        let review = ReviewRecord::new(&d, ReviewDisposition::Rejected, None, None, None).unwrap();
        assert!(matches!(db.insert_review(&review), Err(Error::NotFound(_))));
    }
}
