use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool},
};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Opens a connection pool against the given database URL. In-memory
/// databases are capped at a single connection so that every handle sees
/// the same data.
pub fn open_pool(db_url: &str) -> DbPool {
    Pool::builder()
        .max_size(if db_url == ":memory:" { 1 } else { 10 })
        .build(ConnectionManager::<SqliteConnection>::new(db_url))
        .unwrap()
}
