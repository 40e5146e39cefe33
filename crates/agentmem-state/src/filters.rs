//! Query descriptors shared by every `MemoryRepository` backend.
//!
//! Filters are plain data. The matching, ordering and pagination helpers live
//! here so the in-memory fake and the SurrealDB store agree on semantics:
//! tag filters use non-empty intersection, time windows apply to `created_at`
//! and are inclusive on both ends.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{LongtermMemory, SnapshotType, StateSnapshot, WorkingMemory};

/// Field to order listings by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    /// `accessed_at` for working memory, `last_accessed` for long-term
    AccessedAt,
    AccessCount,
    Key,
    /// Long-term only; working memory falls back to `created_at`
    Importance,
    Version,
}

/// Filters for listing working memory and searching long-term memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFilters {
    /// Match entries carrying at least one of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Long-term only
    pub category: Option<String>,
    /// Long-term only
    pub min_importance: Option<u8>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    /// `None` keeps the default ordering of the tier
    pub sort_by: Option<SortField>,
    #[serde(default)]
    pub sort_desc: bool,
}

impl MemoryFilters {
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_min_importance(mut self, importance: u8) -> Self {
        self.min_importance = Some(importance);
        self
    }

    pub fn with_window(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.after = after;
        self.before = before;
        self
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    pub fn sorted_by(mut self, field: SortField, desc: bool) -> Self {
        self.sort_by = Some(field);
        self.sort_desc = desc;
        self
    }

    fn in_window(&self, created_at: DateTime<Utc>) -> bool {
        self.after.map_or(true, |after| created_at >= after)
            && self.before.map_or(true, |before| created_at <= before)
    }

    fn tags_intersect<'a>(&self, mut tags: impl Iterator<Item = &'a str>) -> bool {
        self.tags.is_empty() || tags.any(|t| self.tags.iter().any(|want| want == t))
    }

    pub fn matches_working(&self, mem: &WorkingMemory) -> bool {
        self.in_window(mem.created_at) && self.tags_intersect(mem.tags().into_iter())
    }

    pub fn matches_longterm(&self, mem: &LongtermMemory) -> bool {
        if let Some(category) = &self.category {
            if !category.is_empty() && &mem.category != category {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if mem.metadata.importance < min {
                return false;
            }
        }
        self.in_window(mem.created_at)
            && self.tags_intersect(mem.metadata.tags.iter().map(String::as_str))
    }

    /// Filter, order and paginate working memory entries.
    pub fn apply_working(&self, entries: Vec<WorkingMemory>) -> Vec<WorkingMemory> {
        let mut out: Vec<WorkingMemory> =
            entries.into_iter().filter(|m| self.matches_working(m)).collect();
        match self.sort_by {
            None => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            Some(field) => out.sort_by(|a, b| {
                let ord = working_cmp(field, a, b);
                if self.sort_desc {
                    ord.reverse()
                } else {
                    ord
                }
            }),
        }
        paginate(out, self.offset, self.limit)
    }

    /// Filter, order and paginate long-term entries.
    pub fn apply_longterm(&self, entries: Vec<LongtermMemory>) -> Vec<LongtermMemory> {
        let mut out: Vec<LongtermMemory> =
            entries.into_iter().filter(|m| self.matches_longterm(m)).collect();
        match self.sort_by {
            None => out.sort_by(|a, b| {
                b.metadata
                    .importance
                    .cmp(&a.metadata.importance)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
            Some(field) => out.sort_by(|a, b| {
                let ord = longterm_cmp(field, a, b);
                if self.sort_desc {
                    ord.reverse()
                } else {
                    ord
                }
            }),
        }
        paginate(out, self.offset, self.limit)
    }
}

fn working_cmp(field: SortField, a: &WorkingMemory, b: &WorkingMemory) -> Ordering {
    match field {
        SortField::CreatedAt | SortField::Importance => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::AccessedAt => a.accessed_at.cmp(&b.accessed_at),
        SortField::AccessCount => a.access_count.cmp(&b.access_count),
        SortField::Key => a.key.cmp(&b.key),
        SortField::Version => a.version.cmp(&b.version),
    }
}

fn longterm_cmp(field: SortField, a: &LongtermMemory, b: &LongtermMemory) -> Ordering {
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::AccessedAt => a.last_accessed.cmp(&b.last_accessed),
        SortField::AccessCount => a.access_count.cmp(&b.access_count),
        SortField::Key => a.key.cmp(&b.key),
        SortField::Importance => a.metadata.importance.cmp(&b.metadata.importance),
        SortField::Version => a.version.cmp(&b.version),
    }
}

fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) if limit > 0 => iter.take(limit).collect(),
        _ => iter.collect(),
    }
}

/// Long-term search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Case-insensitive substring matched against the key or the JSON value.
    /// Empty means "filters only".
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub filters: MemoryFilters,
}

impl MemoryQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filters: MemoryFilters::default(),
        }
    }

    pub fn with_filters(mut self, filters: MemoryFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn matches_text(&self, mem: &LongtermMemory) -> bool {
        let needle = self.text.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        mem.key.to_lowercase().contains(&needle)
            || mem.value.to_string().to_lowercase().contains(&needle)
    }

    /// Text match, then the usual filter/sort/page pipeline.
    pub fn apply(&self, entries: Vec<LongtermMemory>) -> Vec<LongtermMemory> {
        let hits = entries.into_iter().filter(|m| self.matches_text(m)).collect();
        self.filters.apply_longterm(hits)
    }
}

/// Filters for snapshot listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFilters {
    pub snapshot_type: Option<SnapshotType>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl SnapshotFilters {
    pub fn of_type(snapshot_type: SnapshotType) -> Self {
        Self {
            snapshot_type: Some(snapshot_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, snap: &StateSnapshot) -> bool {
        self.snapshot_type.map_or(true, |t| snap.snapshot_type == t)
            && self.after.map_or(true, |after| snap.created_at >= after)
            && self.before.map_or(true, |before| snap.created_at <= before)
    }

    /// Filter, order newest-first and paginate.
    pub fn apply(&self, snapshots: Vec<StateSnapshot>) -> Vec<StateSnapshot> {
        let mut out: Vec<StateSnapshot> =
            snapshots.into_iter().filter(|s| self.matches(s)).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        paginate(out, self.offset, self.limit)
    }
}

/// Rules deciding which long-term memories are archived.
///
/// Every supplied bound must hold for an entry to be eligible; ceilings are
/// inclusive. An empty criteria set makes every entry eligible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveCriteria {
    /// Created at least this long ago
    pub older_than: Option<std::time::Duration>,
    pub max_access_count: Option<u64>,
    pub max_importance: Option<u8>,
    /// Restrict to these categories (empty = any)
    #[serde(default)]
    pub categories: Vec<String>,
    /// Report without deleting
    #[serde(default)]
    pub dry_run: bool,
}

impl ArchiveCriteria {
    pub fn is_eligible(&self, mem: &LongtermMemory, now: DateTime<Utc>) -> bool {
        if let Some(age) = self.older_than {
            let cutoff = chrono::Duration::from_std(age)
                .ok()
                .and_then(|age| now.checked_sub_signed(age));
            match cutoff {
                Some(cutoff) if mem.created_at <= cutoff => {}
                _ => return false,
            }
        }
        if let Some(max) = self.max_access_count {
            if mem.access_count > max {
                return false;
            }
        }
        if let Some(max) = self.max_importance {
            if mem.metadata.importance > max {
                return false;
            }
        }
        self.categories.is_empty() || self.categories.iter().any(|c| c == &mem.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metadata, MemoryMetadata};
    use chrono::Duration;
    use serde_json::json;

    fn working(key: &str, tags: &[&str], created_at: DateTime<Utc>) -> WorkingMemory {
        let mut meta = Metadata::new();
        meta.insert("tags".into(), json!(tags));
        let mut mem = WorkingMemory::new("a", key, json!(key), std::time::Duration::from_secs(60))
            .with_metadata(meta);
        mem.created_at = created_at;
        mem
    }

    fn longterm(key: &str, importance: u8, created_at: DateTime<Utc>) -> LongtermMemory {
        let meta = MemoryMetadata {
            importance,
            ..Default::default()
        };
        let mut mem = LongtermMemory::new("a", key, json!({"note": key}), "general", meta);
        mem.created_at = created_at;
        mem
    }

    #[test]
    fn working_default_order_is_newest_first() {
        let t0 = Utc::now();
        let entries = vec![
            working("old", &[], t0 - Duration::seconds(10)),
            working("new", &[], t0),
            working("mid", &[], t0 - Duration::seconds(5)),
        ];
        let keys: Vec<_> = MemoryFilters::default()
            .apply_working(entries)
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["new", "mid", "old"]);
    }

    #[test]
    fn tag_filter_is_intersection() {
        let t0 = Utc::now();
        let entries = vec![
            working("a", &["x", "y"], t0),
            working("b", &["z"], t0),
            working("c", &[], t0),
        ];
        let keys: Vec<_> = MemoryFilters::default()
            .with_tags(["y", "q"])
            .apply_working(entries)
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["a"]);
    }

    #[test]
    fn time_window_is_inclusive() {
        let t0 = Utc::now();
        let entries = vec![
            working("before", &[], t0 - Duration::seconds(1)),
            working("edge", &[], t0),
            working("after", &[], t0 + Duration::seconds(1)),
        ];
        let hits = MemoryFilters::default()
            .with_window(Some(t0), Some(t0))
            .apply_working(entries);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "edge");
    }

    #[test]
    fn longterm_default_order_importance_then_recency() {
        let t0 = Utc::now();
        let entries = vec![
            longterm("low", 2, t0),
            longterm("high-old", 9, t0 - Duration::seconds(5)),
            longterm("high-new", 9, t0),
        ];
        let keys: Vec<_> = MemoryFilters::default()
            .apply_longterm(entries)
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["high-new", "high-old", "low"]);
    }

    #[test]
    fn pagination_skips_then_limits() {
        let t0 = Utc::now();
        let entries: Vec<_> = (0..5)
            .map(|i| working(&format!("k{i}"), &[], t0 - Duration::seconds(i)))
            .collect();
        let keys: Vec<_> = MemoryFilters::default()
            .with_page(2, 1)
            .apply_working(entries)
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec!["k1", "k2"]);
    }

    #[test]
    fn text_query_matches_key_or_value() {
        let t0 = Utc::now();
        let entries = vec![longterm("Deploy-Notes", 5, t0), longterm("other", 5, t0)];
        assert_eq!(MemoryQuery::text("deploy").apply(entries.clone()).len(), 1);
        // value is {"note": "other"}
        assert_eq!(MemoryQuery::text("OTHER").apply(entries.clone()).len(), 1);
        assert_eq!(MemoryQuery::default().apply(entries).len(), 2);
    }

    #[test]
    fn archive_bounds_must_all_hold() {
        let now = Utc::now();
        let old = longterm("old", 2, now - Duration::days(10));
        let fresh = longterm("fresh", 2, now);

        let criteria = ArchiveCriteria {
            older_than: Some(std::time::Duration::from_secs(86_400)),
            max_importance: Some(3),
            ..Default::default()
        };
        assert!(criteria.is_eligible(&old, now));
        assert!(!criteria.is_eligible(&fresh, now));

        let by_category = ArchiveCriteria {
            categories: vec!["facts".into()],
            ..Default::default()
        };
        assert!(!by_category.is_eligible(&old, now));
    }
}
