use async_trait::async_trait;
use time::Date;
use tracing::{debug, warn};

use crate::error::MarketError;

/// Conflicts tolerated before allocation gives up.
pub const MAX_ID_ATTEMPTS: u32 = 64;

/// `CROP-YYMMDD`, shared by every batch of that crop created on `date`.
pub fn batch_prefix(crop_name: &str, date: Date) -> Result<String, MarketError> {
    let crop_code: String = crop_name.trim().chars().take(4).collect::<String>().to_uppercase();
    if crop_code.is_empty() {
        return Err(MarketError::InvalidInput("crop name must not be empty".into()));
    }
    Ok(format!(
        "{crop_code}-{:02}{:02}{:02}",
        date.year().rem_euclid(100),
        u8::from(date.month()),
        date.day()
    ))
}

pub fn format_batch_code(prefix: &str, sequence: u32) -> String {
    format!("{prefix}-{sequence:03}")
}

/// Sequence part of `code` if it belongs to `prefix`.
pub fn parse_sequence(code: &str, prefix: &str) -> Option<u32> {
    code.strip_prefix(prefix)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Code for the batch following `existing` batches with the same prefix.
pub fn generate_batch_code(
    crop_name: &str,
    date: Date,
    existing: u32,
) -> Result<String, MarketError> {
    let prefix = batch_prefix(crop_name, date)?;
    Ok(format_batch_code(&prefix, existing + 1))
}

pub enum InsertOutcome<T> {
    Inserted(T),
    /// The code is already taken.
    Conflict,
}

/// Storage that batch codes are allocated against.
#[async_trait]
pub trait BatchIdSink: Send + Sync {
    type Record: Send;

    /// Highest sequence already stored under `prefix`, 0 when there is none.
    async fn highest_sequence(&self, prefix: &str) -> anyhow::Result<u32>;

    async fn try_insert(&self, code: &str) -> anyhow::Result<InsertOutcome<Self::Record>>;
}

/// Inserts a record under a fresh code, retrying on conflicts.
pub async fn insert_with_fresh_code<S: BatchIdSink>(
    sink: &S,
    crop_name: &str,
    date: Date,
) -> Result<(String, S::Record), MarketError> {
    let prefix = batch_prefix(crop_name, date)?;
    let mut last_tried = 0;

    for attempt in 1..=MAX_ID_ATTEMPTS {
        let highest = sink.highest_sequence(&prefix).await?;
        let sequence = highest.max(last_tried) + 1;
        let code = format_batch_code(&prefix, sequence);

        match sink.try_insert(&code).await? {
            InsertOutcome::Inserted(record) => {
                debug!(%code, attempt, "batch code allocated");
                return Ok((code, record));
            }
            InsertOutcome::Conflict => {
                debug!(%code, attempt, "batch code taken; retrying");
                last_tried = sequence;
            }
        }
    }

    warn!(%prefix, attempts = MAX_ID_ATTEMPTS, "batch code allocation exhausted");
    Err(MarketError::ExhaustedRetries {
        prefix,
        attempts: MAX_ID_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use time::macros::date;

    #[derive(Default)]
    struct MemorySink {
        codes: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl BatchIdSink for MemorySink {
        type Record = ();

        async fn highest_sequence(&self, prefix: &str) -> anyhow::Result<u32> {
            let codes = self.codes.lock().unwrap();
            Ok(codes
                .iter()
                .filter_map(|c| parse_sequence(c, prefix))
                .max()
                .unwrap_or(0))
        }

        async fn try_insert(&self, code: &str) -> anyhow::Result<InsertOutcome<()>> {
            // let other tasks run between the read and the write
            tokio::task::yield_now().await;
            let mut codes = self.codes.lock().unwrap();
            if codes.insert(code.to_string()) {
                Ok(InsertOutcome::Inserted(()))
            } else {
                Ok(InsertOutcome::Conflict)
            }
        }
    }

    struct AlwaysTaken;

    #[async_trait]
    impl BatchIdSink for AlwaysTaken {
        type Record = ();

        async fn highest_sequence(&self, _prefix: &str) -> anyhow::Result<u32> {
            Ok(0)
        }

        async fn try_insert(&self, _code: &str) -> anyhow::Result<InsertOutcome<()>> {
            Ok(InsertOutcome::Conflict)
        }
    }

    #[test]
    fn formats_first_batch_of_the_day() {
        let code = generate_batch_code("Tomatoes", date!(2025 - 09 - 15), 0).unwrap();
        assert_eq!(code, "TOMA-250915-001");
    }

    #[test]
    fn uppercases_short_and_lowercase_names() {
        assert_eq!(
            generate_batch_code("pea", date!(2026 - 01 - 02), 41).unwrap(),
            "PEA-260102-042"
        );
        assert_eq!(
            generate_batch_code("  sukuma wiki", date!(2026 - 01 - 02), 0).unwrap(),
            "SUKU-260102-001"
        );
    }

    #[test]
    fn sequence_grows_past_three_digits() {
        let code = generate_batch_code("Maize", date!(2026 - 03 - 09), 999).unwrap();
        assert_eq!(code, "MAIZ-260309-1000");
    }

    #[test]
    fn empty_crop_name_is_invalid() {
        assert!(matches!(
            generate_batch_code("   ", date!(2026 - 03 - 09), 0),
            Err(MarketError::InvalidInput(_))
        ));
    }

    #[test]
    fn parses_only_matching_prefix() {
        assert_eq!(parse_sequence("TOMA-250915-007", "TOMA-250915"), Some(7));
        assert_eq!(parse_sequence("TOMA-250916-007", "TOMA-250915"), None);
        assert_eq!(parse_sequence("TOMA-250915-x", "TOMA-250915"), None);
    }

    #[tokio::test]
    async fn sequential_inserts_count_up() {
        let sink = MemorySink::default();
        let day = date!(2025 - 09 - 15);
        let (first, _) = insert_with_fresh_code(&sink, "Onions", day).await.unwrap();
        let (second, _) = insert_with_fresh_code(&sink, "Onions", day).await.unwrap();
        let (other, _) = insert_with_fresh_code(&sink, "Beans", day).await.unwrap();
        assert_eq!(first, "ONIO-250915-001");
        assert_eq!(second, "ONIO-250915-002");
        assert_eq!(other, "BEAN-250915-001");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_get_distinct_codes() {
        let sink = Arc::new(MemorySink::default());
        let day = date!(2025 - 09 - 15);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move { insert_with_fresh_code(sink.as_ref(), "Tomatoes", day).await })
            })
            .collect();

        let mut codes = HashSet::new();
        for handle in handles {
            let (code, _) = handle.await.unwrap().unwrap();
            assert!(codes.insert(code));
        }
        let expected: HashSet<String> = (1..=50)
            .map(|n| format_batch_code("TOMA-250915", n))
            .collect();
        assert_eq!(codes, expected);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let err = insert_with_fresh_code(&AlwaysTaken, "Rice", date!(2025 - 09 - 15))
            .await
            .unwrap_err();
        match err {
            MarketError::ExhaustedRetries { prefix, attempts } => {
                assert_eq!(prefix, "RICE-250915");
                assert_eq!(attempts, MAX_ID_ATTEMPTS);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
