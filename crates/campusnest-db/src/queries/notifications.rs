use anyhow::Result;
use rusqlite::{OptionalExtension, Row};

use crate::models::{NewNotification, NotificationRow, NotificationSettingsRow};
use crate::{Database, now_timestamp};

impl Database {
    pub fn insert_notification(&self, n: &NewNotification<'_>) -> Result<NotificationRow> {
        let created_at = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, kind, title, body, read, related_id, action_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)",
                rusqlite::params![
                    n.user_id,
                    n.kind,
                    n.title,
                    n.body,
                    n.related_id,
                    n.action_url,
                    created_at
                ],
            )?;

            Ok(NotificationRow {
                id: conn.last_insert_rowid(),
                user_id: n.user_id.to_string(),
                kind: n.kind.to_string(),
                title: n.title.to_string(),
                body: n.body.to_string(),
                read: false,
                related_id: n.related_id.map(str::to_string),
                action_url: n.action_url.map(str::to_string),
                created_at,
            })
        })
    }

    pub fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, title, body, read, related_id, action_url, created_at
                 FROM notifications
                 WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4",
            )?;

            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, unread_only, limit, offset],
                    notification_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_unread_notifications(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    pub fn mark_notification_read(&self, id: i64, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let matched = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id],
            )?;
            Ok(matched > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id],
            )?)
        })
    }

    pub fn delete_notification(&self, id: i64, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id, user_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn delete_all_notifications(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM notifications WHERE user_id = ?1", [user_id])?))
    }

    /// Stored preferences, or the all-enabled default if none were saved.
    pub fn notification_settings(&self, user_id: &str) -> Result<NotificationSettingsRow> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT email_rentals, email_ratings, push_rentals, push_ratings
                     FROM notification_settings WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(NotificationSettingsRow {
                            email_rentals: row.get(0)?,
                            email_ratings: row.get(1)?,
                            push_rentals: row.get(2)?,
                            push_ratings: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row.unwrap_or_default())
        })
    }

    pub fn save_notification_settings(&self, user_id: &str, s: &NotificationSettingsRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_settings
                    (user_id, email_rentals, email_ratings, push_rentals, push_ratings)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    email_rentals = excluded.email_rentals,
                    email_ratings = excluded.email_ratings,
                    push_rentals = excluded.push_rentals,
                    push_ratings = excluded.push_ratings",
                rusqlite::params![user_id, s.email_rentals, s.email_ratings, s.push_rentals, s.push_ratings],
            )?;
            Ok(())
        })
    }
}

fn notification_from_row(row: &Row) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        read: row.get(5)?,
        related_id: row.get(6)?,
        action_url: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::models::{NewNotification, NotificationSettingsRow};
    use crate::test_support;

    fn notify(db: &crate::Database, user: &str, title: &str) -> i64 {
        db.insert_notification(&NewNotification {
            user_id: user,
            kind: "favorite_updated",
            title,
            body: "body",
            related_id: None,
            action_url: None,
        })
        .unwrap()
        .id
    }

    #[test]
    fn unread_filter_and_counts() {
        let db = test_support::db();
        let u = test_support::user(&db, "Ana", "student");
        let first = notify(&db, &u, "one");
        notify(&db, &u, "two");
        notify(&db, &u, "three");

        assert_eq!(db.count_unread_notifications(&u).unwrap(), 3);
        assert!(db.mark_notification_read(first, &u).unwrap());
        assert_eq!(db.count_unread_notifications(&u).unwrap(), 2);

        let unread = db.list_notifications(&u, true, 50, 0).unwrap();
        assert_eq!(unread.len(), 2);
        assert_eq!(unread[0].title, "three");

        let all = db.list_notifications(&u, false, 50, 0).unwrap();
        assert_eq!(all.len(), 3);

        assert_eq!(db.mark_all_notifications_read(&u).unwrap(), 2);
        assert_eq!(db.count_unread_notifications(&u).unwrap(), 0);
    }

    #[test]
    fn ownership_is_enforced() {
        let db = test_support::db();
        let owner = test_support::user(&db, "Ana", "student");
        let other = test_support::user(&db, "Beto", "student");
        let id = notify(&db, &owner, "mine");

        assert!(!db.mark_notification_read(id, &other).unwrap());
        assert!(!db.delete_notification(id, &other).unwrap());
        assert!(db.delete_notification(id, &owner).unwrap());
        assert!(db.list_notifications(&owner, false, 50, 0).unwrap().is_empty());
    }

    #[test]
    fn delete_all_only_touches_the_owner() {
        let db = test_support::db();
        let owner = test_support::user(&db, "Ana", "student");
        let other = test_support::user(&db, "Beto", "student");
        notify(&db, &owner, "one");
        notify(&db, &owner, "two");
        notify(&db, &other, "keep");

        assert_eq!(db.delete_all_notifications(&owner).unwrap(), 2);
        assert!(db.list_notifications(&owner, false, 50, 0).unwrap().is_empty());
        assert_eq!(db.list_notifications(&other, false, 50, 0).unwrap().len(), 1);
    }

    #[test]
    fn settings_default_then_upsert() {
        let db = test_support::db();
        let u = test_support::user(&db, "Ana", "student");

        let defaults = db.notification_settings(&u).unwrap();
        assert!(defaults.push_rentals && defaults.push_ratings);

        let quiet = NotificationSettingsRow {
            push_ratings: false,
            ..Default::default()
        };
        db.save_notification_settings(&u, &quiet).unwrap();
        db.save_notification_settings(&u, &quiet).unwrap();

        let stored = db.notification_settings(&u).unwrap();
        assert!(!stored.push_ratings);
        assert!(stored.push_rentals && stored.email_ratings);
    }
}
