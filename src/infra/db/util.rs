use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request")
                || db.message().contains("statement timeout") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::Database(db)
            if db.message().contains("invalid input syntax")
                || db.message().contains("out of range") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        other => RepoError::from_persistence(other),
    }
}
