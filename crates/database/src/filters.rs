//! Composable WHERE clauses for message listings.

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

/// Criteria applied to message queries. Every field narrows the result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    /// Restrict to conversations the given user participates in.
    pub visible_to: Option<i64>,
    pub sender: Option<i64>,
    /// Messages delivered to this user: they participate in the conversation
    /// and did not send the message.
    pub receiver: Option<i64>,
    pub conversation: Option<i64>,
    /// Inclusive lower bound on `created_at`.
    pub sent_after: Option<String>,
    /// Exclusive upper bound on `created_at`.
    pub sent_before: Option<String>,
    /// Case-insensitive substring of the message body.
    pub search: Option<String>,
}

impl MessageFilter {
    pub fn visible_to(user_id: i64) -> Self {
        Self {
            visible_to: Some(user_id),
            ..Self::default()
        }
    }

    pub fn from_date(mut self, date: NaiveDate) -> Self {
        self.sent_after = Some(day_start(date));
        self
    }

    /// Include the whole of `date`. `NaiveDate::MAX` has no following day,
    /// so it leaves the upper bound open.
    pub fn until_date(mut self, date: NaiveDate) -> Self {
        self.sent_before = date.succ_opt().map(day_start);
        self
    }

    pub(crate) fn push_where<'a>(&'a self, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE 1 = 1");

        if let Some(user_id) = self.visible_to {
            qb.push(
                " AND m.conversation_id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ",
            )
            .push_bind(user_id)
            .push(")");
        }

        if let Some(sender) = self.sender {
            qb.push(" AND m.sender_id = ").push_bind(sender);
        }

        if let Some(receiver) = self.receiver {
            qb.push(
                " AND m.conversation_id IN (SELECT conversation_id FROM conversation_participants WHERE user_id = ",
            )
            .push_bind(receiver)
            .push(") AND m.sender_id <> ")
            .push_bind(receiver);
        }

        if let Some(conversation) = self.conversation {
            qb.push(" AND m.conversation_id = ").push_bind(conversation);
        }

        if let Some(after) = &self.sent_after {
            qb.push(" AND m.created_at >= ").push_bind(after.as_str());
        }

        if let Some(before) = &self.sent_before {
            qb.push(" AND m.created_at < ").push_bind(before.as_str());
        }

        if let Some(search) = &self.search {
            qb.push(" AND LOWER(m.content) LIKE ")
                .push_bind(like_pattern(search))
                .push(" ESCAPE '\\'");
        }
    }
}

fn day_start(date: NaiveDate) -> String {
    format!("{}T00:00:00.000000Z", date.format("%Y-%m-%d"))
}

/// `%term%` with LIKE metacharacters escaped, lowercased.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Hi"), "%hi%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn date_bounds_cover_the_whole_day() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        let filter = MessageFilter::default().from_date(date).until_date(date);

        assert_eq!(filter.sent_after.as_deref(), Some("2024-02-29T00:00:00.000000Z"));
        assert_eq!(filter.sent_before.as_deref(), Some("2024-03-01T00:00:00.000000Z"));
    }

    #[test]
    fn last_representable_day_has_no_upper_bound() {
        let filter = MessageFilter::default().until_date(NaiveDate::MAX);
        assert_eq!(filter.sent_before, None);
    }

    #[test]
    fn filters_render_into_where_clause() {
        let filter = MessageFilter {
            sender: Some(3),
            search: Some("hello".into()),
            ..MessageFilter::visible_to(7)
        };
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages m");
        filter.push_where(&mut qb);
        let sql = qb.sql();

        assert!(sql.contains("conversation_participants WHERE user_id = ?"));
        assert!(sql.contains("m.sender_id = ?"));
        assert!(sql.contains("LOWER(m.content) LIKE ?"));
        assert!(!sql.contains("m.created_at >="));
    }
}
