//! Shared per-token book store.
//!
//! Each book has a single writer (the market stream task). Readers take
//! the lock only long enough to copy the top of book or clone one book,
//! so the quote engine never computes under the lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::orderbook::{Book, PriceLevel, TopOfBook};

#[derive(Default)]
pub struct BookStore {
    books: RwLock<HashMap<String, Book>>,
}

pub type SharedBooks = Arc<BookStore>;

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a token's book from a full snapshot.
    pub fn apply_snapshot(&self, token_id: &str, bids: &[PriceLevel], asks: &[PriceLevel]) {
        let mut books = self.books.write();
        books
            .entry(token_id.to_string())
            .or_insert_with(|| Book::new(token_id.to_string()))
            .apply_snapshot(bids, asks);
    }

    /// Apply one delta; size "0" deletes the level. Deltas for tokens we
    /// have never snapshotted still build a book, matching stream order.
    pub fn apply_delta(&self, token_id: &str, side: &str, price: &str, size: &str) {
        let mut books = self.books.write();
        books
            .entry(token_id.to_string())
            .or_insert_with(|| Book::new(token_id.to_string()))
            .apply_delta(side, price, size);
    }

    /// Consistent top-of-book copy; `None` until the first event arrives.
    pub fn top(&self, token_id: &str) -> Option<TopOfBook> {
        self.books.read().get(token_id).map(|b| b.top())
    }

    /// Clone a full book for depth-aware callers.
    pub fn snapshot(&self, token_id: &str) -> Option<Book> {
        self.books.read().get(token_id).cloned()
    }

    /// Drop books for tokens no longer in the subscription set.
    pub fn retain_tokens(&self, keep: &std::collections::HashSet<String>) {
        self.books.write().retain(|token, _| keep.contains(token));
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }
}
