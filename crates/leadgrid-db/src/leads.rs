//! Lead storage.
//!
//! The full record is kept as JSON in `data`; a handful of columns are
//! duplicated for querying and export. A checkpoint replaces a job's whole
//! lead set inside one transaction.

use crate::error::Result;
use chrono::Utc;
use leadgrid_core::Lead;
use sqlx::{Pool, Row, Sqlite};

/// Replace every lead of `job_id` with `leads`, preserving their order.
///
/// Returns the number of rows written. A record whose identifier repeats an
/// earlier one is skipped.
pub async fn replace_leads(pool: &Pool<Sqlite>, job_id: &str, leads: &[Lead]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM leads WHERE job_id = ?")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    let mut written = 0usize;
    for (position, lead) in leads.iter().enumerate() {
        let data = serde_json::to_string(lead)?;
        let result = sqlx::query(
            "INSERT INTO leads (job_id, source_id, position, source, name, address, phone, website, primary_email, category, rating, review_count, latitude, longitude, data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(job_id, source_id) DO NOTHING",
        )
        .bind(job_id)
        .bind(&lead.source_id)
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .bind(lead.source_tag())
        .bind(&lead.name)
        .bind(&lead.address)
        .bind(&lead.phone)
        .bind(&lead.website)
        .bind(&lead.primary_email)
        .bind(&lead.category)
        .bind(lead.rating)
        .bind(lead.review_count.map(i64::from))
        .bind(lead.coordinates.map(|c| c.latitude))
        .bind(lead.coordinates.map(|c| c.longitude))
        .bind(data)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                "Skipping lead '{}' for job {}: identifier {} already stored",
                lead.name,
                job_id,
                lead.source_id
            );
        } else {
            written += 1;
        }
    }

    tx.commit().await?;
    tracing::debug!("Checkpointed {} leads for job {}", written, job_id);
    Ok(written)
}

/// All leads of a job in stored order.
pub async fn list_leads(pool: &Pool<Sqlite>, job_id: &str) -> Result<Vec<Lead>> {
    let rows = sqlx::query("SELECT data FROM leads WHERE job_id = ? ORDER BY position")
        .bind(job_id)
        .fetch_all(pool)
        .await?;

    let mut leads = Vec::with_capacity(rows.len());
    for row in rows {
        let data: String = row.try_get("data")?;
        leads.push(serde_json::from_str(&data)?);
    }
    Ok(leads)
}

/// Number of leads stored for a job.
pub async fn count_leads(pool: &Pool<Sqlite>, job_id: &str) -> Result<u32> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE job_id = ?")
        .bind(job_id)
        .fetch_one(pool)
        .await?;
    Ok(crate::jobs::to_u32(count))
}

/// Number of leads of a job that have a primary email.
pub async fn count_with_email(pool: &Pool<Sqlite>, job_id: &str) -> Result<u32> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM leads WHERE job_id = ? AND primary_email IS NOT NULL",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await?;
    Ok(crate::jobs::to_u32(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{create_job, delete_job, LocationType, NewJob};
    use crate::Database;
    use leadgrid_core::{Coordinates, LeadSource};

    async fn setup_test_db() -> (Database, String) {
        let db = Database::in_memory().await.expect("create test database");
        let job = create_job(
            db.pool(),
            &NewJob {
                keyword: "coffee".to_string(),
                location: Some("Austin, TX".to_string()),
                location_type: LocationType::Address,
                coordinates: None,
                radius_km: 2.0,
                batch_id: None,
            },
        )
        .await
        .expect("create job");
        (db, job.id)
    }

    fn lead(id: &str, name: &str) -> Lead {
        let mut lead = Lead::new(id, LeadSource::Playwright, name);
        lead.coordinates = Some(Coordinates::new(30.2672, -97.7431));
        lead.types = vec!["cafe".to_string()];
        lead
    }

    #[tokio::test]
    async fn test_replace_and_list_round_trip() {
        let (db, job_id) = setup_test_db().await;
        let mut first = lead("ChIJb", "Bravo");
        first.sources.insert(LeadSource::SerpApi);
        first.primary_email = Some("hi@bravo.example".to_string());
        let leads = vec![first, lead("ChIJa", "Alpha")];

        let written = replace_leads(db.pool(), &job_id, &leads)
            .await
            .expect("replace");
        assert_eq!(written, 2);

        let stored = list_leads(db.pool(), &job_id).await.expect("list");
        assert_eq!(stored, leads);
        assert_eq!(count_with_email(db.pool(), &job_id).await.expect("count"), 1);

        let tag: String = sqlx::query_scalar("SELECT source FROM leads WHERE source_id = 'ChIJb'")
            .fetch_one(db.pool())
            .await
            .expect("tag");
        assert_eq!(tag, "playwright+serp_api");
    }

    #[tokio::test]
    async fn test_replace_overwrites_previous_set() {
        let (db, job_id) = setup_test_db().await;
        replace_leads(db.pool(), &job_id, &[lead("ChIJa", "Alpha"), lead("ChIJb", "Bravo")])
            .await
            .expect("first checkpoint");
        replace_leads(db.pool(), &job_id, &[lead("ChIJc", "Charlie")])
            .await
            .expect("second checkpoint");

        let stored = list_leads(db.pool(), &job_id).await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].source_id, "ChIJc");
    }

    #[tokio::test]
    async fn test_duplicate_identifier_is_skipped() {
        let (db, job_id) = setup_test_db().await;
        let written = replace_leads(
            db.pool(),
            &job_id,
            &[lead("ChIJa", "Alpha"), lead("ChIJa", "Alpha again")],
        )
        .await
        .expect("replace");

        assert_eq!(written, 1);
        assert_eq!(count_leads(db.pool(), &job_id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_deleting_job_cascades_to_leads() {
        let (db, job_id) = setup_test_db().await;
        replace_leads(db.pool(), &job_id, &[lead("ChIJa", "Alpha")])
            .await
            .expect("replace");

        assert!(delete_job(db.pool(), &job_id).await.expect("delete"));
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(db.pool())
            .await
            .expect("count");
        assert_eq!(remaining, 0);
    }
}
