use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub fn conn(database_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(database_path)?;
    conn.busy_timeout(Duration::from_secs(30))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}
