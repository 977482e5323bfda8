use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::{NewUser, UserRow};
use crate::{Database, now_timestamp};

const USER_COLUMNS: &str =
    "id, email, password, kind, full_name, phone, photo_url, verified, active, created_at";

impl Database {
    /// Returns false, writing nothing, when the email is already registered.
    /// The uniqueness check and the insert are one statement.
    pub fn create_user(&self, user: &NewUser) -> Result<bool> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password, kind, full_name, phone, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![
                    user.id,
                    user.email,
                    user.password_hash,
                    user.kind,
                    user.full_name,
                    user.phone,
                    created_at
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Applies the provided fields and returns the refreshed row.
    pub fn update_profile(
        &self,
        id: &str,
        full_name: Option<&str>,
        phone: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET
                    full_name = COALESCE(?2, full_name),
                    phone = COALESCE(?3, phone),
                    photo_url = COALESCE(?4, photo_url)
                 WHERE id = ?1",
                rusqlite::params![id, full_name, phone, photo_url],
            )?;
            query_user(conn, "id", id)
        })
    }

    pub fn set_user_active(&self, id: &str, active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET active = ?2 WHERE id = ?1",
                rusqlite::params![id, active],
            )?;
            Ok(changed > 0)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always a literal from this module
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        kind: row.get(3)?,
        full_name: row.get(4)?,
        phone: row.get(5)?,
        photo_url: row.get(6)?,
        verified: row.get(7)?,
        active: row.get(8)?,
        created_at: row.get(9)?,
    })
}
