use crate::bloom::BloomFilter;
use crate::matcher::ScopeClass;
use std::collections::{HashSet, VecDeque};

/// A discovered URL waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: usize,
    pub discovered_from: Option<String>,
    pub scope_class: ScopeClass,
}

impl FrontierEntry {
    pub fn seed(url: String) -> Self {
        Self {
            url,
            depth: 0,
            discovered_from: None,
            scope_class: ScopeClass::Seed,
        }
    }
}

/// Membership index for every URL the crawl has accepted.
pub struct DedupIndex {
    bloom: BloomFilter,
    exact: HashSet<String>,
}

impl DedupIndex {
    pub fn with_capacity(expected: usize) -> Self {
        Self {
            bloom: BloomFilter::with_capacity(expected),
            exact: HashSet::with_capacity(expected.min(4096)),
        }
    }

    /// Marks `url` as seen. Returns `false` if it already was.
    pub fn check_and_insert(&mut self, url: &str) -> bool {
        if self.bloom.insert(url.as_bytes()) {
            self.exact.insert(url.to_string());
            return true;
        }
        self.exact.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.bloom.might_contain(url.as_bytes()) && self.exact.contains(url)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

/// Outcome of offering a URL to the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    Duplicate,
    CapReached,
}

/// Work queue plus dedup index. Always accessed under the crawl's single
/// state lock, so every method here is plain `&mut self`.
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    seen: DedupIndex,
    accepted: usize,
    in_flight: usize,
    max_urls: usize,
}

impl Frontier {
    pub fn new(max_urls: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: DedupIndex::with_capacity(max_urls.max(1)),
            accepted: 0,
            in_flight: 0,
            max_urls,
        }
    }

    pub fn push(&mut self, entry: FrontierEntry) -> PushOutcome {
        if self.seen.contains(&entry.url) {
            return PushOutcome::Duplicate;
        }
        if self.accepted >= self.max_urls {
            return PushOutcome::CapReached;
        }
        if !self.seen.check_and_insert(&entry.url) {
            return PushOutcome::Duplicate;
        }
        self.accepted += 1;
        self.queue.push_back(entry);
        PushOutcome::Queued
    }

    pub fn pop(&mut self) -> Option<FrontierEntry> {
        let entry = self.queue.pop_front()?;
        self.in_flight += 1;
        Some(entry)
    }

    /// Settles one entry previously handed out by [`Frontier::pop`].
    pub fn complete(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }

    pub fn has_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn cap_reached(&self) -> bool {
        self.accepted >= self.max_urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, depth: usize) -> FrontierEntry {
        FrontierEntry {
            url: url.to_string(),
            depth,
            discovered_from: Some("https://docs.example.com/".to_string()),
            scope_class: ScopeClass::Internal,
        }
    }

    #[test]
    fn test_push_rejects_duplicates() {
        let mut frontier = Frontier::new(100);
        assert_eq!(frontier.push(entry("https://docs.example.com/a", 1)), PushOutcome::Queued);
        assert_eq!(frontier.push(entry("https://docs.example.com/a", 2)), PushOutcome::Duplicate);
        assert_eq!(frontier.queued(), 1);
    }

    #[test]
    fn test_duplicate_after_pop_is_still_rejected() {
        let mut frontier = Frontier::new(100);
        frontier.push(entry("https://docs.example.com/a", 1));
        let popped = frontier.pop().unwrap();
        frontier.complete();
        assert_eq!(popped.url, "https://docs.example.com/a");
        assert_eq!(frontier.push(entry("https://docs.example.com/a", 1)), PushOutcome::Duplicate);
    }

    #[test]
    fn test_cap_stops_new_work() {
        let mut frontier = Frontier::new(2);
        assert_eq!(frontier.push(entry("https://docs.example.com/a", 1)), PushOutcome::Queued);
        assert_eq!(frontier.push(entry("https://docs.example.com/b", 1)), PushOutcome::Queued);
        assert_eq!(frontier.push(entry("https://docs.example.com/c", 1)), PushOutcome::CapReached);
        assert!(frontier.cap_reached());
        // A duplicate is still reported as such once the cap is hit.
        assert_eq!(frontier.push(entry("https://docs.example.com/a", 1)), PushOutcome::Duplicate);
    }

    #[test]
    fn test_drained_waits_for_in_flight_work() {
        let mut frontier = Frontier::new(10);
        frontier.push(FrontierEntry::seed("https://docs.example.com/".to_string()));
        assert!(!frontier.is_drained());

        frontier.pop();
        assert!(!frontier.is_drained(), "in-flight entry keeps the crawl alive");

        frontier.complete();
        assert!(frontier.is_drained());
    }

    #[test]
    fn test_dedup_index_tracks_len() {
        let mut index = DedupIndex::with_capacity(10);
        assert!(index.is_empty());
        assert!(index.check_and_insert("https://docs.example.com/a"));
        assert!(!index.check_and_insert("https://docs.example.com/a"));
        assert!(index.contains("https://docs.example.com/a"));
        assert!(!index.contains("https://docs.example.com/b"));
        assert_eq!(index.len(), 1);
    }
}
