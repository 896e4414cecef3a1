//! Per-counterpart unseen aggregation.
//!
//! Pure read: recomputed on every call from the message log, never
//! cached.  Cost is proportional to the message volume touching the
//! requesting user, which is fine for a 1:1 chat model.

use std::collections::HashMap;

use rusqlite::params;

use colloquy_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::messages::row_to_message;
use crate::models::CounterpartSummary;
use crate::users::parse_user_id;

impl Database {
    /// For every counterpart the requester has exchanged messages with:
    /// the number of that counterpart's messages the requester has not
    /// seen, plus the most recent message in either direction.
    ///
    /// Counterparts with no message history are absent from the result.
    pub fn unseen_summary(
        &self,
        requester: UserId,
    ) -> Result<HashMap<UserId, CounterpartSummary>> {
        let mut summaries: HashMap<UserId, CounterpartSummary> = HashMap::new();

        // Pending counts, grouped by author.
        let mut stmt = self.conn().prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND seen = 0
             GROUP BY sender_id",
        )?;
        let rows = stmt.query_map(params![requester.to_string()], |row| {
            let sender_str: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            Ok((parse_user_id(&sender_str, 0)?, count))
        })?;
        for row in rows {
            let (counterpart_id, unseen_count) = row?;
            summaries.insert(
                counterpart_id,
                CounterpartSummary {
                    counterpart_id,
                    unseen_count,
                    last_message: None,
                },
            );
        }

        // Latest message per counterpart, regardless of direction or
        // seen-state.  Newest-first scan, keeping the first hit per
        // counterpart.
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, text, image_url, seen, seen_at, created_at
             FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![requester.to_string()], row_to_message)?;
        for row in rows {
            let message = row?;
            let counterpart_id = if message.sender_id == requester {
                message.receiver_id
            } else {
                message.sender_id
            };

            let entry = summaries
                .entry(counterpart_id)
                .or_insert_with(|| CounterpartSummary {
                    counterpart_id,
                    unseen_count: 0,
                    last_message: None,
                });
            if entry.last_message.is_none() {
                entry.last_message = Some(message);
            }
        }

        Ok(summaries)
    }
}
