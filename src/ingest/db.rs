use crate::recorder::Recorder;
use serde_json::{json, Map, Value};
use std::error::Error;
use std::future::Future;
use std::time::Instant;

/// Time a query future and record it
///
/// A failed query is also recorded as an exception carrying the statement.
/// The query's own result is returned unchanged.
///
/// # Example
///
/// ```ignore
/// let user = observe_query(&recorder, "main", "select * from users where id = ?", &[json!(id)],
///     sqlx::query_as::<_, User>("select * from users where id = ?").bind(id).fetch_one(&pool),
/// ).await?;
/// ```
pub async fn observe_query<F, T, E>(
    recorder: &Recorder,
    connection: &str,
    sql: &str,
    bindings: &[Value],
    fut: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Error,
{
    let started = Instant::now();
    let result = fut.await;
    let elapsed = started.elapsed();

    recorder.queries().record_query(connection, sql, bindings, elapsed);

    if let Err(e) = &result {
        let mut context = Map::new();
        context.insert("connection".to_string(), json!(connection));
        context.insert("sql".to_string(), json!(sql));
        recorder.exceptions().record_exception(e, context, false);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::recorder::{EntryQuery, EntryType};

    #[derive(Debug)]
    struct Timeout;

    impl std::fmt::Display for Timeout {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "statement timeout")
        }
    }

    impl Error for Timeout {}

    #[tokio::test]
    async fn test_observe_query_records_failures() {
        let recorder = Recorder::new(&RecorderConfig::default()).unwrap();
        recorder.initialize(Some("memory")).await.unwrap();

        let ok: Result<u32, Timeout> =
            observe_query(&recorder, "main", "select 1", &[], async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        let failed: Result<u32, Timeout> =
            observe_query(&recorder, "main", "select pg_sleep(10)", &[], async { Err(Timeout) })
                .await;
        assert!(failed.is_err());

        recorder.flush().await;
        let queries = recorder
            .get_entries(&EntryQuery::default().of_type(EntryType::Query))
            .await
            .unwrap();
        assert_eq!(queries.len(), 2);

        let exceptions = recorder
            .get_entries(&EntryQuery::default().of_type(EntryType::Exception))
            .await
            .unwrap();
        assert_eq!(exceptions.len(), 1);
        assert!(exceptions[0].has_tag("class:Timeout"));
    }
}
