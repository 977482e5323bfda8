use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::models::{ConversationMessageRow, MessageRow};
use crate::{Database, now_timestamp};

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, body, read, property_id, created_at";

impl Database {
    /// Single-row insert; returns the stored message with its assigned id.
    /// The timestamp is taken under the connection lock, so `created_at`
    /// never decreases as ids increase.
    pub fn insert_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
        property_id: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let created_at = now_timestamp();
            conn.execute(
                "INSERT INTO messages (sender_id, recipient_id, body, read, property_id, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5)",
                rusqlite::params![sender_id, recipient_id, body, property_id, created_at],
            )?;

            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                sender_id: sender_id.to_string(),
                recipient_id: recipient_id.to_string(),
                body: body.to_string(),
                read: false,
                property_id: property_id.map(str::to_string),
                created_at,
            })
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], message_from_row).optional()?)
        })
    }

    /// Every message the user sent or received, joined with the other party.
    pub fn messages_for_user(&self, user_id: &str) -> Result<Vec<ConversationMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, m.recipient_id, m.body, m.read, m.property_id, m.created_at,
                        u.id, u.full_name, u.photo_url
                 FROM messages m
                 JOIN users u ON u.id = CASE WHEN m.sender_id = ?1 THEN m.recipient_id ELSE m.sender_id END
                 WHERE m.sender_id = ?1 OR m.recipient_id = ?1",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationMessageRow {
                        message: message_from_row(row)?,
                        counterpart_id: row.get(7)?,
                        counterpart_name: row.get(8)?,
                        counterpart_photo: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Unread messages addressed to `user_id`, counted per sender.
    pub fn unread_counts_by_sender(&self, user_id: &str) -> Result<Vec<(String, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE recipient_id = ?1 AND read = 0
                 GROUP BY sender_id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    let count: i64 = row.get(1)?;
                    Ok((row.get(0)?, count.max(0) as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Acknowledge everything `counterpart_id` sent to `user_id`, then return
    /// one page of the conversation, newest first. Both steps share a
    /// transaction so the page reflects the new read flags.
    pub fn read_conversation(
        &self,
        user_id: &str,
        counterpart_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(usize, Vec<MessageRow>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let marked = mark_pair_read(&tx, user_id, counterpart_id)?;
            let page = query_conversation(&tx, user_id, counterpart_id, limit, offset)?;
            tx.commit()?;
            Ok((marked, page))
        })
    }

    pub fn mark_conversation_read(&self, user_id: &str, counterpart_id: &str) -> Result<usize> {
        self.with_conn(|conn| mark_pair_read(conn, user_id, counterpart_id))
    }

    /// Returns false when no message with that id is addressed to `recipient_id`.
    /// Marking an already-read message still returns true.
    pub fn mark_message_read(&self, id: i64, recipient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let matched = conn.execute(
                "UPDATE messages SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                rusqlite::params![id, recipient_id],
            )?;
            Ok(matched > 0)
        })
    }

    /// Hard delete, only when `sender_id` authored the message.
    pub fn delete_message(&self, id: i64, sender_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND sender_id = ?2",
                rusqlite::params![id, sender_id],
            )?;
            Ok(deleted > 0)
        })
    }
}

fn mark_pair_read(conn: &Connection, user_id: &str, counterpart_id: &str) -> Result<usize> {
    let marked = conn.execute(
        "UPDATE messages SET read = 1
         WHERE sender_id = ?1 AND recipient_id = ?2 AND read = 0",
        rusqlite::params![counterpart_id, user_id],
    )?;
    Ok(marked)
}

fn query_conversation(
    conn: &Connection,
    user_id: &str,
    counterpart_id: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE (sender_id = ?1 AND recipient_id = ?2)
            OR (sender_id = ?2 AND recipient_id = ?1)
         ORDER BY created_at DESC, id DESC
         LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(
            rusqlite::params![user_id, counterpart_id, limit, offset],
            message_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_from_row(row: &Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        body: row.get(3)?,
        read: row.get(4)?,
        property_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support;

    #[test]
    fn insert_assigns_increasing_ids() {
        let db = test_support::db();
        let a = test_support::user(&db, "Ana", "student");
        let b = test_support::user(&db, "Beto", "landlord");

        let first = db.insert_message(&a, &b, "hi", None).unwrap();
        let second = db.insert_message(&a, &b, "again", None).unwrap();

        assert!(second.id > first.id);
        assert!(!first.read);
        let stored = db.get_message(first.id).unwrap().unwrap();
        assert_eq!(stored.body, "hi");
    }

    #[test]
    fn timestamps_follow_id_order() {
        let db = std::sync::Arc::new(test_support::db());
        let a = test_support::user(&db, "Ana", "student");
        let b = test_support::user(&db, "Beto", "landlord");

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let (db, a, b) = (db.clone(), a.clone(), b.clone());
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        db.insert_message(&a, &b, "x", None).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let mut rows: Vec<_> = db.messages_for_user(&a).unwrap().into_iter().map(|r| r.message).collect();
        rows.sort_by_key(|m| m.id);
        assert_eq!(rows.len(), 200);
        assert!(rows.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn self_message_violates_check() {
        let db = test_support::db();
        let a = test_support::user(&db, "Ana", "student");
        assert!(db.insert_message(&a, &a, "me", None).is_err());
    }

    #[test]
    fn read_conversation_marks_only_incoming() {
        let db = test_support::db();
        let a = test_support::user(&db, "Ana", "student");
        let b = test_support::user(&db, "Beto", "landlord");

        db.insert_message(&a, &b, "to beto", None).unwrap();
        db.insert_message(&b, &a, "to ana 1", None).unwrap();
        db.insert_message(&b, &a, "to ana 2", None).unwrap();

        let (marked, page) = db.read_conversation(&a, &b, 50, 0).unwrap();
        assert_eq!(marked, 2);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].body, "to ana 2");
        assert!(page.iter().filter(|m| m.recipient_id == a).all(|m| m.read));
        // Ana's own outgoing message is untouched
        assert!(page.iter().filter(|m| m.sender_id == a).all(|m| !m.read));

        let (marked_again, _) = db.read_conversation(&a, &b, 50, 0).unwrap();
        assert_eq!(marked_again, 0);
    }

    #[test]
    fn history_pagination_is_newest_first() {
        let db = test_support::db();
        let a = test_support::user(&db, "Ana", "student");
        let b = test_support::user(&db, "Beto", "landlord");

        for i in 0..5 {
            db.insert_message(&a, &b, &format!("m{}", i), None).unwrap();
        }

        let (_, page) = db.read_conversation(&b, &a, 2, 1).unwrap();
        let bodies: Vec<_> = page.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["m3", "m2"]);
    }

    #[test]
    fn unread_counts_group_by_sender() {
        let db = test_support::db();
        let u = test_support::user(&db, "Ana", "student");
        let c1 = test_support::user(&db, "Beto", "landlord");
        let c2 = test_support::user(&db, "Carla", "landlord");

        for _ in 0..3 {
            db.insert_message(&c1, &u, "x", None).unwrap();
        }
        db.insert_message(&c2, &u, "y", None).unwrap();
        db.insert_message(&u, &c2, "z", None).unwrap();

        let mut counts = db.unread_counts_by_sender(&u).unwrap();
        counts.sort();
        let mut expected = vec![(c1.clone(), 3), (c2.clone(), 1)];
        expected.sort();
        assert_eq!(counts, expected);
    }

    #[test]
    fn mark_and_delete_respect_ownership() {
        let db = test_support::db();
        let a = test_support::user(&db, "Ana", "student");
        let b = test_support::user(&db, "Beto", "landlord");
        let msg = db.insert_message(&a, &b, "hi", None).unwrap();

        // Only the recipient may mark read
        assert!(!db.mark_message_read(msg.id, &a).unwrap());
        assert!(db.mark_message_read(msg.id, &b).unwrap());
        assert!(db.mark_message_read(msg.id, &b).unwrap());

        // Only the sender may delete
        assert!(!db.delete_message(msg.id, &b).unwrap());
        assert!(db.delete_message(msg.id, &a).unwrap());
        assert!(db.get_message(msg.id).unwrap().is_none());
    }

    #[test]
    fn messages_for_user_resolves_counterpart() {
        let db = test_support::db();
        let a = test_support::user(&db, "Ana", "student");
        let b = test_support::user(&db, "Beto", "landlord");
        db.insert_message(&a, &b, "out", None).unwrap();
        db.insert_message(&b, &a, "in", None).unwrap();

        let rows = db.messages_for_user(&a).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.counterpart_id == b && r.counterpart_name == "Beto"));
    }
}
