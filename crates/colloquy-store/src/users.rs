use chrono::{DateTime, Utc};
use rusqlite::params;

use colloquy_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ProfileUpdate, User};

impl Database {
    /// Insert a new account.  The password must already be hashed.
    ///
    /// Fails with [`StoreError::Validation`] if the email is taken.
    pub fn create_user(
        &self,
        full_name: &str,
        email: &str,
        password_hash: &str,
        bio: &str,
    ) -> Result<User> {
        let user = User {
            id: UserId::new(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            bio: bio.to_string(),
            avatar_url: None,
            last_seen: Utc::now(),
            created_at: Utc::now(),
        };

        let inserted = self.conn().execute(
            "INSERT INTO users (id, full_name, email, password_hash, bio, avatar_url, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id.to_string(),
                user.full_name,
                user.email,
                user.password_hash,
                user.bio,
                user.avatar_url,
                user.last_seen.to_rfc3339(),
                user.created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Validation("Email already in use".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn user_by_id(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, full_name, email, password_hash, bio, avatar_url, last_seen, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("User"),
                other => StoreError::Sqlite(other),
            })
    }

    pub fn user_by_email(&self, email: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, full_name, email, password_hash, bio, avatar_url, last_seen, created_at
                 FROM users WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("User"),
                other => StoreError::Sqlite(other),
            })
    }

    /// True if the user exists.  Cheaper than [`Database::user_by_id`]
    /// when the caller only needs to validate a reference.
    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every known user except the requesting one, most recently seen
    /// first.  Drives the sidebar listing.
    pub fn list_users_except(&self, id: UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, full_name, email, password_hash, bio, avatar_url, last_seen, created_at
             FROM users WHERE id != ?1 ORDER BY last_seen DESC",
        )?;

        let rows = stmt.query_map(params![id.to_string()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Apply a partial profile update and return the fresh row.
    pub fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET
                 full_name  = COALESCE(?2, full_name),
                 bio        = COALESCE(?3, bio),
                 avatar_url = COALESCE(?4, avatar_url)
             WHERE id = ?1",
            params![
                id.to_string(),
                update.full_name,
                update.bio,
                update.profile_pic,
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound("User"));
        }
        self.user_by_id(id)
    }

    /// Bump `last_seen` for the given users (both ends of a send).
    pub fn touch_last_seen(&self, ids: &[UserId], at: DateTime<Utc>) -> Result<()> {
        for id in ids {
            self.conn().execute(
                "UPDATE users SET last_seen = ?2 WHERE id = ?1",
                params![id.to_string(), at.to_rfc3339()],
            )?;
        }
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let last_seen_str: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;

    Ok(User {
        id: parse_user_id(&id_str, 0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        last_seen: parse_timestamp(&last_seen_str, 6)?,
        created_at: parse_timestamp(&created_at_str, 7)?,
    })
}

pub(crate) fn parse_user_id(s: &str, col: usize) -> rusqlite::Result<UserId> {
    UserId::parse(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn create_and_fetch_user() {
        let db = db();
        let user = db
            .create_user("Alice", "alice@example.com", "$argon2$fake", "hi")
            .unwrap();

        let fetched = db.user_by_id(user.id).unwrap();
        assert_eq!(fetched, user);

        let by_email = db.user_by_email("alice@example.com").unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = db();
        db.create_user("Alice", "alice@example.com", "h", "").unwrap();
        let err = db
            .create_user("Other Alice", "alice@example.com", "h", "")
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let db = db();
        let err = db.user_by_id(UserId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!db.user_exists(UserId::new()).unwrap());
    }

    #[test]
    fn list_excludes_requester() {
        let db = db();
        let alice = db.create_user("Alice", "a@example.com", "h", "").unwrap();
        let bob = db.create_user("Bob", "b@example.com", "h", "").unwrap();

        let users = db.list_users_except(alice.id).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, bob.id);
    }

    #[test]
    fn partial_profile_update() {
        let db = db();
        let alice = db.create_user("Alice", "a@example.com", "h", "old bio").unwrap();

        let updated = db
            .update_profile(
                alice.id,
                &ProfileUpdate {
                    bio: Some("new bio".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.full_name, "Alice");
        assert_eq!(updated.bio, "new bio");
    }
}
