//! Search-mode page walking and sequence-id assignment.
//!
//! Pages `0..page_count` are requested in order. Every record that is
//! successfully written receives the next sequence id, in the order the API
//! returned it. Ids are handed out only after a write succeeds, so a failed
//! write or a dropped record never consumes one. The starting point is
//! recovered from the store: `max(sequence_id) + 1`, or `0` when empty.

use crate::models::FetchUnit;

#[derive(Debug, Clone)]
pub struct PageWalker {
    page_count: u32,
    next_sequence: i64,
}

impl PageWalker {
    pub fn new(page_count: u32, max_stored_sequence: Option<i64>) -> Self {
        Self {
            page_count,
            next_sequence: max_stored_sequence.map_or(0, |max| max + 1),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn units(&self) -> Vec<FetchUnit> {
        (0..self.page_count).map(FetchUnit::Page).collect()
    }

    /// The id the next written record will receive.
    pub fn peek_sequence(&self) -> i64 {
        self.next_sequence
    }

    /// Runs `write` with the next id and advances only if it succeeds.
    pub async fn assign<T, E, F, Fut>(&mut self, write: F) -> Result<T, E>
    where
        F: FnOnce(i64) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let seq = self.next_sequence;
        let out = write(seq).await?;
        self.next_sequence = seq + 1;
        Ok(out)
    }
}
