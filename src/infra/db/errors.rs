use crate::application::repos::RepoError;

const QUERY_CANCELED: &str = "57014";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::PoolTimedOut => RepoError::Timeout,
            sqlx::Error::Database(db) => {
                let code = db.code();
                if code.as_deref() == Some(QUERY_CANCELED) {
                    RepoError::Timeout
                } else if db.is_foreign_key_violation()
                    || db.is_check_violation()
                    || code.as_deref() == Some(INVALID_TEXT_REPRESENTATION)
                {
                    RepoError::invalid_input(db.message())
                } else {
                    RepoError::from_persistence(db)
                }
            }
            other => RepoError::from_persistence(other),
        }
    }
}

/// `COUNT(*)` comes back as `BIGINT`; negative values never happen but are not representable.
pub(super) fn row_count(value: i64) -> Result<u64, RepoError> {
    u64::try_from(value).map_err(|_| RepoError::from_persistence(format!("invalid row count {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_row_is_not_found() {
        assert!(matches!(
            RepoError::from(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
    }

    #[test]
    fn exhausted_pool_is_a_timeout() {
        assert!(matches!(
            RepoError::from(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn other_failures_are_persistence_errors() {
        let err = RepoError::from(sqlx::Error::PoolClosed);
        assert!(matches!(err, RepoError::Persistence(_)));
    }

    #[test]
    fn negative_row_count_is_rejected() {
        assert!(row_count(-1).is_err());
        assert_eq!(row_count(12).expect("count"), 12);
    }
}
