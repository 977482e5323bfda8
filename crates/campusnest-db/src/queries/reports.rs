use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::{NewReport, ReportDetailRow, ReportRow};
use crate::{Database, now_timestamp};

const REPORT_COLUMNS: &str = "r.id, r.landlord_id, r.student_id, r.rental_id, r.problem, r.description,
     r.evidence_urls, r.severity, r.incident_date, r.status, r.admin_verified,
     r.visible_to_landlords, r.created_at";

impl Database {
    /// New reports are pending, unverified and hidden from other landlords.
    pub fn insert_report(&self, r: &NewReport<'_>) -> Result<ReportRow> {
        let created_at = now_timestamp();
        let evidence = serde_json::to_string(r.evidence_urls)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tenant_reports (landlord_id, student_id, rental_id, problem, description,
                                             evidence_urls, severity, incident_date, status,
                                             admin_verified, visible_to_landlords, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, 0, ?9)",
                rusqlite::params![
                    r.landlord_id,
                    r.student_id,
                    r.rental_id,
                    r.problem,
                    r.description,
                    evidence,
                    r.severity,
                    r.incident_date,
                    created_at
                ],
            )?;

            Ok(ReportRow {
                id: conn.last_insert_rowid(),
                landlord_id: r.landlord_id.to_string(),
                student_id: r.student_id.to_string(),
                rental_id: r.rental_id,
                problem: r.problem.to_string(),
                description: r.description.to_string(),
                evidence_urls: r.evidence_urls.to_vec(),
                severity: r.severity.to_string(),
                incident_date: r.incident_date.map(str::to_string),
                status: "pending".into(),
                admin_verified: false,
                visible_to_landlords: false,
                created_at,
            })
        })
    }

    pub fn get_report(&self, id: i64) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    /// Reports filed by one landlord, newest first.
    pub fn reports_by_landlord(&self, landlord_id: &str) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REPORT_COLUMNS} FROM tenant_reports r
                 WHERE r.landlord_id = ?1
                 ORDER BY r.created_at DESC, r.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([landlord_id], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Reports about a student that were verified and released to other
    /// landlords, newest first.
    pub fn published_reports_about(&self, student_id: &str) -> Result<Vec<ReportDetailRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REPORT_COLUMNS}, s.full_name, s.email, l.full_name
                 FROM tenant_reports r
                 JOIN users s ON s.id = r.student_id
                 JOIN users l ON l.id = r.landlord_id
                 WHERE r.student_id = ?1 AND r.admin_verified = 1 AND r.visible_to_landlords = 1
                 ORDER BY r.created_at DESC, r.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([student_id], |row| {
                    Ok(ReportDetailRow {
                        report: report_from_row(row)?,
                        student_name: row.get(13)?,
                        student_email: row.get(14)?,
                        landlord_name: row.get(15)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Applies the provided moderation fields and returns the refreshed row.
    pub fn update_report(
        &self,
        id: i64,
        status: Option<&str>,
        admin_verified: Option<bool>,
        visible_to_landlords: Option<bool>,
    ) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tenant_reports SET
                    status = COALESCE(?2, status),
                    admin_verified = COALESCE(?3, admin_verified),
                    visible_to_landlords = COALESCE(?4, visible_to_landlords)
                 WHERE id = ?1",
                rusqlite::params![id, status, admin_verified, visible_to_landlords],
            )?;
            query_report(conn, id)
        })
    }
}

fn query_report(conn: &Connection, id: i64) -> Result<Option<ReportRow>> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM tenant_reports r WHERE r.id = ?1");
    Ok(conn.query_row(&sql, [id], report_from_row).optional()?)
}

fn report_from_row(row: &Row) -> rusqlite::Result<ReportRow> {
    let evidence: String = row.get(6)?;
    let evidence_urls = serde_json::from_str(&evidence)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(ReportRow {
        id: row.get(0)?,
        landlord_id: row.get(1)?,
        student_id: row.get(2)?,
        rental_id: row.get(3)?,
        problem: row.get(4)?,
        description: row.get(5)?,
        evidence_urls,
        severity: row.get(7)?,
        incident_date: row.get(8)?,
        status: row.get(9)?,
        admin_verified: row.get(10)?,
        visible_to_landlords: row.get(11)?,
        created_at: row.get(12)?,
    })
}
