use sqlx::FromRow;

/// Reports partitioned by whether moderators have acted on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ReportCounts {
    pub resolved: i64,
    pub unresolved: i64,
}

/// Local account counts. Every field except `suspended` only counts
/// unsuspended accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromRow)]
pub struct AccountCounts {
    pub unsuspended: i64,
    pub bots: i64,
    pub groups: i64,
    pub people: i64,
    pub suspended: i64,
}

impl AccountCounts {
    /// `(type label, count)` pairs in exposition order.
    pub fn by_type(&self) -> [(&'static str, i64); 5] {
        [
            ("unsuspended", self.unsuspended),
            ("bots", self.bots),
            ("groups", self.groups),
            ("people", self.people),
            ("suspended", self.suspended),
        ]
    }
}
