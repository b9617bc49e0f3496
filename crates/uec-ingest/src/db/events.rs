//! Rows derived from log files, all keyed by the source file's id

use crate::aggregate::{BucketKey, UniqueContact};
use crate::error::Result;
use crate::event_type::EventType;
use crate::validate::centralnotice::CentralNoticeEvent;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::BTreeMap;

/// Rows per multi-row statement, well under the bind parameter limit
const UPSERT_CHUNK: usize = 1000;

pub async fn insert_centralnotice(
    conn: &mut PgConnection,
    file_id: i64,
    event: &CentralNoticeEvent,
    sample_rate: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO centralnotice_events
            (file_id, event_uuid, event_time, banner, campaign, project, language,
             country, sample_rate, testing)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(file_id)
    .bind(&event.uuid)
    .bind(event.time)
    .bind(&event.banner)
    .bind(&event.campaign)
    .bind(&event.project)
    .bind(&event.language)
    .bind(&event.country)
    .bind(sample_rate)
    .bind(event.testing)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Add bucket counts onto existing rows, inserting rows that are new
///
/// Keys within one call must be distinct, which [`crate::aggregate::Batch`]
/// guarantees. Returns the number of rows inserted or updated.
pub async fn upsert_buckets(
    conn: &mut PgConnection,
    file_id: i64,
    buckets: &[(BucketKey, i64)],
) -> Result<u64> {
    let mut written = 0;

    for chunk in buckets.chunks(UPSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO landingpage_buckets \
             (file_id, bucket_time, utm_source, utm_campaign, utm_medium, utm_key, \
              landingpage, project, language, country, event_count) ",
        );
        builder.push_values(chunk, |mut row, (key, count)| {
            row.push_bind(file_id)
                .push_bind(key.bucket_time)
                .push_bind(&key.utm_source)
                .push_bind(&key.utm_campaign)
                .push_bind(&key.utm_medium)
                .push_bind(&key.utm_key)
                .push_bind(&key.landingpage)
                .push_bind(&key.project)
                .push_bind(&key.language)
                .push_bind(&key.country)
                .push_bind(*count);
        });
        builder.push(
            " ON CONFLICT ON CONSTRAINT landingpage_buckets_key DO UPDATE \
             SET event_count = landingpage_buckets.event_count + EXCLUDED.event_count",
        );

        written += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(written)
}

/// Record donor contacts; a contact already seen for that source is kept
pub async fn insert_unique_contacts(
    conn: &mut PgConnection,
    file_id: i64,
    contacts: &[UniqueContact],
) -> Result<u64> {
    let mut inserted = 0;

    for chunk in contacts.chunks(UPSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO donatewiki_unique (file_id, utm_source, contact_id) ");
        builder.push_values(chunk, |mut row, contact| {
            row.push_bind(file_id)
                .push_bind(&contact.utm_source)
                .push_bind(&contact.contact_id);
        });
        builder.push(" ON CONFLICT ON CONSTRAINT donatewiki_unique_key DO NOTHING");

        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(inserted)
}

/// Delete every row attributed to a file, per table
pub async fn delete_for_file(
    conn: &mut PgConnection,
    event_type: EventType,
    file_id: i64,
) -> Result<BTreeMap<&'static str, u64>> {
    let mut deleted = BTreeMap::new();

    for table in event_type.derived_tables() {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE file_id = $1", table))
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        deleted.insert(*table, result.rows_affected());
    }

    Ok(deleted)
}
