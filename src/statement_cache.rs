//! Per-connection LRU cache of prepared statements, keyed by SQL text.
//!
//! Connection identity is implicit: each [`crate::conn::Connection`] owns its
//! own cache, so a cache hit never crosses connections. Eviction sends
//! `COM_STMT_CLOSE` for the evicted statement id on a best-effort basis.

use lru_cache::LruCache;

use crate::PreparedStatement;

pub struct StatementCache {
    entries: LruCache<String, PreparedStatement>,
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(capacity.max(1)),
        }
    }

    pub fn get(&mut self, sql: &str) -> Option<&mut PreparedStatement> {
        self.entries.get_mut(sql)
    }

    /// Inserts a freshly-prepared statement, evicting the least-recently-used
    /// entry first if the cache is already full. Returns the evicted
    /// statement's id, if any, so the caller can fire a `COM_STMT_CLOSE`.
    pub fn insert(&mut self, sql: String, stmt: PreparedStatement) -> Option<u32> {
        let evicted_id = if self.entries.len() >= self.entries.capacity() && !self.entries.contains_key(&sql) {
            self.entries
                .iter()
                .next()
                .map(|(k, v)| (k.clone(), v.id()))
        } else {
            None
        };

        if let Some((victim_sql, victim_id)) = evicted_id {
            self.entries.remove(&victim_sql);
            self.entries.insert(sql, stmt);
            Some(victim_id)
        } else {
            self.entries.insert(sql, stmt);
            None
        }
    }

    /// Drains every cached statement id, for use when the owning connection
    /// is closed or reset; the caller must not attempt `COM_STMT_CLOSE` on
    /// these, since the connection they belong to is already gone.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_return_same_statement() {
        let mut cache = StatementCache::new(2);
        cache.insert("SELECT 1".into(), PreparedStatement::new(1, 0, 1, 42));
        assert_eq!(cache.get("SELECT 1").map(|s| s.id()), Some(1));
    }

    #[test]
    fn evicts_least_recently_used_past_capacity() {
        let mut cache = StatementCache::new(2);
        assert_eq!(
            cache.insert("SELECT 1".into(), PreparedStatement::new(1, 0, 1, 42)),
            None
        );
        assert_eq!(
            cache.insert("SELECT 2".into(), PreparedStatement::new(2, 0, 1, 42)),
            None
        );
        // Touch "SELECT 1" so "SELECT 2" becomes the LRU entry.
        assert!(cache.get("SELECT 1").is_some());
        let evicted = cache.insert("SELECT 3".into(), PreparedStatement::new(3, 0, 1, 42));
        assert_eq!(evicted, Some(2));
        assert!(cache.get("SELECT 2").is_none());
        assert!(cache.get("SELECT 1").is_some());
        assert!(cache.get("SELECT 3").is_some());
    }
}
