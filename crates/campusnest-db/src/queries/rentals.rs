use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::{NewRental, RentalRow};
use crate::{Database, now_timestamp};

const RENTAL_COLUMNS: &str =
    "id, property_id, student_id, landlord_id, start_date, end_date, agreed_price, status, created_at";

impl Database {
    /// New rentals start out `active`.
    pub fn insert_rental(&self, r: &NewRental<'_>) -> Result<RentalRow> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rentals (property_id, student_id, landlord_id, start_date, end_date,
                                      agreed_price, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)",
                rusqlite::params![
                    r.property_id,
                    r.student_id,
                    r.landlord_id,
                    r.start_date,
                    r.end_date,
                    r.agreed_price,
                    created_at
                ],
            )?;

            Ok(RentalRow {
                id: conn.last_insert_rowid(),
                property_id: r.property_id.to_string(),
                student_id: r.student_id.to_string(),
                landlord_id: r.landlord_id.to_string(),
                start_date: r.start_date.to_string(),
                end_date: r.end_date.map(str::to_string),
                agreed_price: r.agreed_price,
                status: "active".into(),
                created_at,
            })
        })
    }

    pub fn get_rental(&self, id: i64) -> Result<Option<RentalRow>> {
        self.with_conn(|conn| query_rental(conn, id))
    }

    /// Rentals where the user is either side, newest first.
    pub fn rentals_for_user(&self, user_id: &str, status: Option<&str>) -> Result<Vec<RentalRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RENTAL_COLUMNS} FROM rentals
                 WHERE (landlord_id = ?1 OR student_id = ?1)
                   AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, status], rental_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Applies the provided fields and returns the refreshed row.
    pub fn update_rental(
        &self,
        id: i64,
        end_date: Option<&str>,
        status: Option<&str>,
    ) -> Result<Option<RentalRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE rentals SET
                    end_date = COALESCE(?2, end_date),
                    status = COALESCE(?3, status)
                 WHERE id = ?1",
                rusqlite::params![id, end_date, status],
            )?;
            query_rental(conn, id)
        })
    }
}

fn query_rental(conn: &Connection, id: i64) -> Result<Option<RentalRow>> {
    let sql = format!("SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], rental_from_row).optional()?)
}

fn rental_from_row(row: &Row) -> rusqlite::Result<RentalRow> {
    Ok(RentalRow {
        id: row.get(0)?,
        property_id: row.get(1)?,
        student_id: row.get(2)?,
        landlord_id: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        agreed_price: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::queries::properties::tests::listing;
    use crate::test_support;

    /// Landlord, student and an active rental between them.
    pub(crate) fn rental(db: &Database) -> (String, String, RentalRow) {
        let landlord = test_support::user(db, "Luis", "landlord");
        let student = test_support::user(db, "Ana", "student");
        let property = listing(&landlord, "cuarto", 1500.0, "Puebla");
        db.insert_property(&property).unwrap();

        let row = db
            .insert_rental(&NewRental {
                property_id: &property.id,
                student_id: &student,
                landlord_id: &landlord,
                start_date: "2025-01-15",
                end_date: None,
                agreed_price: 1450.0,
            })
            .unwrap();
        (landlord, student, row)
    }

    #[test]
    fn both_sides_see_the_rental() {
        let db = test_support::db();
        let (landlord, student, row) = rental(&db);
        let stranger = test_support::user(&db, "Carla", "student");

        assert_eq!(row.status, "active");
        assert_eq!(db.rentals_for_user(&landlord, None).unwrap().len(), 1);
        assert_eq!(db.rentals_for_user(&student, None).unwrap()[0].id, row.id);
        assert!(db.rentals_for_user(&student, Some("finished")).unwrap().is_empty());
        assert!(db.rentals_for_user(&stranger, None).unwrap().is_empty());
    }

    #[test]
    fn update_keeps_absent_fields() {
        let db = test_support::db();
        let (_, student, row) = rental(&db);

        let ended = db
            .update_rental(row.id, Some("2025-06-30"), None)
            .unwrap()
            .unwrap();
        assert_eq!(ended.end_date.as_deref(), Some("2025-06-30"));
        assert_eq!(ended.status, "active");

        let finished = db.update_rental(row.id, None, Some("finished")).unwrap().unwrap();
        assert_eq!(finished.end_date.as_deref(), Some("2025-06-30"));
        assert_eq!(db.rentals_for_user(&student, Some("finished")).unwrap().len(), 1);

        assert!(db.update_rental(9999, None, Some("finished")).unwrap().is_none());
    }
}
