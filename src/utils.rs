use diesel::prelude::*;
use diesel::sql_types::Integer;
use tower_sessions::Session;

pub async fn set_user_session(session: &Session, user_id: i32, email: &str) -> Result<(), tower_sessions::session::Error> {
    session.insert("logged_in", true).await?;
    session.insert("user_id", user_id).await?;
    session.insert("user_email", email).await?;
    Ok(())
}

pub async fn is_logged_in(session: &Session) -> bool {
    session.get::<i32>("user_id").await.unwrap_or(None).is_some()
}

/// The verified identity for the current request. The quiz/grading services
/// trust this id completely.
pub async fn get_current_user_id(session: &Session) -> Option<i32> {
    if !is_logged_in(session).await {
        return None;
    }

    match session.get::<i32>("user_id").await {
        Ok(Some(user_id)) => Some(user_id),
        Ok(None) => {
            log::warn!("Session has logged_in=true but no user_id");
            None
        }
        Err(e) => {
            log::error!("Failed to get user_id from session: {}", e);
            None
        }
    }
}

/// Id of the row inserted last on this connection, read inside the same
/// transaction as the insert.
pub fn last_insert_rowid(conn: &mut SqliteConnection) -> QueryResult<i32> {
    diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()")).get_result::<i32>(conn)
}

/// Elapsed seconds rendered as MM:SS by floor division.
pub fn format_passed_time(seconds: i32) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passed_time_formats_as_minutes_and_seconds() {
        assert_eq!(format_passed_time(0), "00:00");
        assert_eq!(format_passed_time(59), "00:59");
        assert_eq!(format_passed_time(60), "01:00");
        assert_eq!(format_passed_time(754), "12:34");
        assert_eq!(format_passed_time(-5), "00:00");
    }
}
