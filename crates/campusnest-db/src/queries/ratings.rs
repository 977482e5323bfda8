use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::{NewRating, PropertyRatingRow, RatingStats, Scores, TenantRatingRow};
use crate::{Database, now_timestamp};

const PROPERTY_RATING_SELECT: &str =
    "SELECT r.id, r.rental_id, r.student_id, r.property_id, r.overall, r.cleanliness, r.location,
            r.value_for_money, r.communication, r.comment, r.created_at, u.full_name
     FROM property_ratings r
     JOIN users u ON u.id = r.student_id";

const TENANT_RATING_SELECT: &str =
    "SELECT r.id, r.rental_id, r.landlord_id, r.student_id, r.overall, r.payment_punctuality,
            r.property_care, r.coexistence, r.communication, r.comment, r.created_at, u.full_name
     FROM tenant_ratings r
     JOIN users u ON u.id = r.landlord_id";

impl Database {
    /// Returns None, writing nothing, if this student already rated the rental.
    pub fn insert_property_rating(&self, r: &NewRating<'_>) -> Result<Option<PropertyRatingRow>> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            let [overall, cleanliness, location, value_for_money, communication] = r.scores;
            let inserted = conn.execute(
                "INSERT INTO property_ratings (rental_id, student_id, property_id, overall, cleanliness,
                                               location, value_for_money, communication, comment,
                                               visible, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)
                 ON CONFLICT(rental_id, student_id) DO NOTHING",
                rusqlite::params![
                    r.rental_id,
                    r.author_id,
                    r.subject_id,
                    overall,
                    cleanliness,
                    location,
                    value_for_money,
                    communication,
                    r.comment,
                    created_at
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }

            let sql = format!("{PROPERTY_RATING_SELECT} WHERE r.id = ?1");
            Ok(conn
                .query_row(&sql, [conn.last_insert_rowid()], property_rating_from_row)
                .optional()?)
        })
    }

    /// Visible ratings of a property, newest first.
    pub fn property_ratings(&self, property_id: &str) -> Result<Vec<PropertyRatingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{PROPERTY_RATING_SELECT}
                 WHERE r.property_id = ?1 AND r.visible = 1
                 ORDER BY r.created_at DESC, r.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([property_id], property_rating_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn property_rating_stats(&self, property_id: &str) -> Result<RatingStats> {
        self.with_conn(|conn| {
            stats(
                conn,
                "SELECT COUNT(*), ROUND(AVG(overall), 1), ROUND(AVG(cleanliness), 1),
                        ROUND(AVG(location), 1), ROUND(AVG(value_for_money), 1),
                        ROUND(AVG(communication), 1)
                 FROM property_ratings WHERE property_id = ?1 AND visible = 1",
                property_id,
            )
        })
    }

    /// Returns None, writing nothing, if this landlord already rated the rental.
    pub fn insert_tenant_rating(&self, r: &NewRating<'_>) -> Result<Option<TenantRatingRow>> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            let [overall, punctuality, care, coexistence, communication] = r.scores;
            let inserted = conn.execute(
                "INSERT INTO tenant_ratings (rental_id, landlord_id, student_id, overall,
                                             payment_punctuality, property_care, coexistence,
                                             communication, comment, visible, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)
                 ON CONFLICT(rental_id, landlord_id) DO NOTHING",
                rusqlite::params![
                    r.rental_id,
                    r.author_id,
                    r.subject_id,
                    overall,
                    punctuality,
                    care,
                    coexistence,
                    communication,
                    r.comment,
                    created_at
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }

            let sql = format!("{TENANT_RATING_SELECT} WHERE r.id = ?1");
            Ok(conn
                .query_row(&sql, [conn.last_insert_rowid()], tenant_rating_from_row)
                .optional()?)
        })
    }

    /// Visible ratings of a student as a tenant, newest first.
    pub fn tenant_ratings(&self, student_id: &str) -> Result<Vec<TenantRatingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{TENANT_RATING_SELECT}
                 WHERE r.student_id = ?1 AND r.visible = 1
                 ORDER BY r.created_at DESC, r.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([student_id], tenant_rating_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn tenant_rating_stats(&self, student_id: &str) -> Result<RatingStats> {
        self.with_conn(|conn| {
            stats(
                conn,
                "SELECT COUNT(*), ROUND(AVG(overall), 1), ROUND(AVG(payment_punctuality), 1),
                        ROUND(AVG(property_care), 1), ROUND(AVG(coexistence), 1),
                        ROUND(AVG(communication), 1)
                 FROM tenant_ratings WHERE student_id = ?1 AND visible = 1",
                student_id,
            )
        })
    }
}

/// AVG over no rows is NULL; those averages read as 0.
fn stats(conn: &Connection, sql: &str, subject: &str) -> Result<RatingStats> {
    let stats = conn.query_row(sql, [subject], |row| {
        let total: i64 = row.get(0)?;
        let mut averages = [0.0; 5];
        for (i, avg) in averages.iter_mut().enumerate() {
            *avg = row.get::<_, Option<f64>>(i + 1)?.unwrap_or(0.0);
        }
        Ok(RatingStats {
            total: total.max(0) as u64,
            averages,
        })
    })?;
    Ok(stats)
}

fn scores(row: &Row, first: usize) -> rusqlite::Result<Scores> {
    Ok([
        row.get(first)?,
        row.get(first + 1)?,
        row.get(first + 2)?,
        row.get(first + 3)?,
        row.get(first + 4)?,
    ])
}

fn property_rating_from_row(row: &Row) -> rusqlite::Result<PropertyRatingRow> {
    Ok(PropertyRatingRow {
        id: row.get(0)?,
        rental_id: row.get(1)?,
        student_id: row.get(2)?,
        property_id: row.get(3)?,
        scores: scores(row, 4)?,
        comment: row.get(9)?,
        created_at: row.get(10)?,
        student_name: row.get(11)?,
    })
}

fn tenant_rating_from_row(row: &Row) -> rusqlite::Result<TenantRatingRow> {
    Ok(TenantRatingRow {
        id: row.get(0)?,
        rental_id: row.get(1)?,
        landlord_id: row.get(2)?,
        student_id: row.get(3)?,
        scores: scores(row, 4)?,
        comment: row.get(9)?,
        created_at: row.get(10)?,
        landlord_name: row.get(11)?,
    })
}
