// Sequence allocator - per (year, type) protocol counters
//
// The counter row is the only piece of shared state in the registry. Every
// allocation runs inside the caller's transaction and holds the row lock until
// that transaction ends, so concurrent filings for the same key serialize and
// a rollback returns the number to the pool.

use sqlx::{Postgres, Transaction};
use std::time::Duration;

use crate::config::{CounterSeed, RegistryConfig};
use crate::registry::error::{is_lock_timeout, FilingError};
use crate::registry::number::ProtocolNumber;
use crate::types::ProtocolType;

#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    org_code: String,
    seeds: Vec<CounterSeed>,
    lock_timeout: Duration,
}

impl SequenceAllocator {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            org_code: config.org_code.clone(),
            seeds: config.counter_seeds.clone(),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn org_code(&self) -> &str {
        &self.org_code
    }

    /// Starting value used when the (year, type) counter is created
    pub fn seed_for(&self, year: i32, protocol_type: ProtocolType) -> i32 {
        self.seeds
            .iter()
            .find(|s| s.year == year && s.protocol_type == protocol_type)
            .map(|s| s.start)
            .unwrap_or(0)
    }

    /// Issue the next protocol number for (year, type).
    ///
    /// The increment is only durable once `tx` commits.
    pub async fn allocate(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        year: i32,
        protocol_type: ProtocolType,
    ) -> Result<ProtocolNumber, FilingError> {
        let map_err = |e: sqlx::Error| {
            if is_lock_timeout(&e) {
                FilingError::LockTimeout { year, protocol_type }
            } else {
                FilingError::Persistence(e)
            }
        };

        // SET does not take bind parameters
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout)
            .execute(&mut **tx)
            .await
            .map_err(map_err)?;

        // Lazily create the row; a concurrent creator makes this a no-op
        sqlx::query(
            "INSERT INTO counters (year, protocol_type, last_seq) VALUES ($1, $2, $3)
             ON CONFLICT (year, protocol_type) DO NOTHING",
        )
        .bind(year)
        .bind(protocol_type.code())
        .bind(self.seed_for(year, protocol_type))
        .execute(&mut **tx)
        .await
        .map_err(map_err)?;

        let (last,): (i32,) = sqlx::query_as(
            "SELECT last_seq FROM counters WHERE year = $1 AND protocol_type = $2 FOR UPDATE",
        )
        .bind(year)
        .bind(protocol_type.code())
        .fetch_one(&mut **tx)
        .await
        .map_err(map_err)?;

        let next = next_sequence(last).ok_or(FilingError::CounterExhausted { year, protocol_type })?;

        sqlx::query(
            "UPDATE counters SET last_seq = $1, updated_at = NOW()
             WHERE year = $2 AND protocol_type = $3",
        )
        .bind(next)
        .bind(year)
        .bind(protocol_type.code())
        .execute(&mut **tx)
        .await
        .map_err(map_err)?;

        let number = ProtocolNumber::new(year, next, self.org_code.clone(), protocol_type);
        tracing::info!(protocol_number = %number, "Allocated protocol number");
        Ok(number)
    }
}

/// Sequence following `last`, if the counter has room for one
fn next_sequence(last: i32) -> Option<i32> {
    last.checked_add(1)
}
