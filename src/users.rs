use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::schema::users;

#[derive(Queryable, Clone, Debug)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("a user named \"{0}\" already exists")]
    Duplicate(String),
}

pub fn create_user(
    conn: &mut SqliteConnection,
    username: &str,
    email: &str,
) -> Result<User, UserError> {
    let taken: i64 = users::table
        .filter(users::username.eq(username))
        .count()
        .get_result(conn)
        .unwrap();
    if taken > 0 {
        return Err(UserError::Duplicate(username.to_string()));
    }

    let id = Uuid::now_v7().to_string();
    diesel::insert_into(users::table)
        .values((
            users::id.eq(&id),
            users::username.eq(username),
            users::email.eq(email),
            users::created_at.eq(Utc::now().naive_utc()),
            users::last_login.eq(None::<NaiveDateTime>),
        ))
        .execute(conn)
        .unwrap();
    tracing::info!(username, "created user");

    Ok(users::table
        .filter(users::id.eq(id))
        .first(conn)
        .unwrap())
}

pub fn load_user(conn: &mut SqliteConnection, user_id: &str) -> Option<User> {
    users::table
        .filter(users::id.eq(user_id))
        .first(conn)
        .optional()
        .expect("failed to load user")
}

pub fn touch_last_login(conn: &mut SqliteConnection, user_id: &str) {
    diesel::update(users::table.filter(users::id.eq(user_id)))
        .set(users::last_login.eq(Utc::now().naive_utc()))
        .execute(conn)
        .unwrap();
}

/// Users who logged in within the configured activity window. Feeds the
/// "active annotators" line of the status snapshots.
pub fn active_users(
    conn: &mut SqliteConnection,
    active_window_days: i64,
) -> Vec<User> {
    let cutoff = Utc::now().naive_utc() - Duration::days(active_window_days);
    users::table
        .filter(users::last_login.ge(cutoff))
        .load(conn)
        .expect("failed to load active users")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_unique() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();

        create_user(&mut conn, "ann", "ann@example.com").unwrap();
        assert!(matches!(
            create_user(&mut conn, "ann", "other@example.com"),
            Err(UserError::Duplicate(_))
        ));
    }

    #[test]
    fn login_touch_marks_user_active() {
        let pool = crate::test::pool();
        let mut conn = pool.get().unwrap();

        let user = create_user(&mut conn, "ann", "ann@example.com").unwrap();
        assert!(active_users(&mut conn, 90).is_empty());

        touch_last_login(&mut conn, &user.id);
        let active = active_users(&mut conn, 90);
        assert_eq!(active.len(), 1);
        assert!(active[0].last_login.is_some());
    }
}
