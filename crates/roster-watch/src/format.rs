//! Notification text for detected roster changes.
//!
//! Pure mapping from a [`ChangeSet`] to chat messages. Nothing here touches
//! the network or the clock; callers pass the timestamp in.

use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::types::{ChangeSet, Message, Snapshot, TIMESTAMP_FORMAT};

const SUMMARY_HEADER: &str = "**Current Faction Members Tractari Summary:**";
const NO_MEMBERS: &str = "No member data available. Check the scraping configuration.";
const BOOTSTRAP_FAILED: &str =
    "Failed to get initial faction data. Please check the script configuration.";

/// Renders change sets into ordered chat messages.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    mention: Option<String>,
}

impl Formatter {
    /// `mention` is attached to every unit notification.
    pub fn new(mention: Option<String>) -> Self {
        Self { mention }
    }

    /// Map a change set into messages.
    ///
    /// Order: joins, leaves, the roster summary (when anyone joined or left,
    /// or when `bootstrap` is set), one message per towed vehicle, then status
    /// changes.
    pub fn format(
        &self,
        changes: &ChangeSet,
        current: &Snapshot,
        now: NaiveDateTime,
        bootstrap: bool,
    ) -> Vec<Message> {
        let mut out = Vec::with_capacity(
            changes.joined.len()
                + changes.left.len()
                + changes.status_changes.len()
                + changes.unit_events() as usize
                + 1,
        );

        for name in &changes.joined {
            out.push(Message::new(format!("🆕 **New member joined**: {name}")));
        }
        for name in &changes.left {
            out.push(Message::new(format!("👋 **Member left**: {name}")));
        }

        if bootstrap || changes.membership_changed() {
            out.push(self.summary(current, now));
        }

        for inc in &changes.counter_increases {
            for count in inc.from + 1..=inc.to {
                out.push(
                    Message::new(format!(
                        "{} a tractat un vehicul, vehicule tractate: {count}",
                        inc.name
                    ))
                    .with_mention(self.mention.as_deref()),
                );
            }
        }

        for change in &changes.status_changes {
            out.push(Message::new(format!(
                "🚦 **Status changed**: {} {} → {}",
                change.name, change.from, change.to
            )));
        }

        out
    }

    /// Full roster summary, or a diagnostic when the snapshot is empty.
    pub fn summary(&self, current: &Snapshot, now: NaiveDateTime) -> Message {
        if current.is_empty() {
            return Message::new(NO_MEMBERS);
        }

        let mut text = String::from(SUMMARY_HEADER);
        text.push('\n');
        for record in current.leaderboard() {
            let _ = writeln!(
                text,
                "• **{}**: {} vehicule tractate",
                record.name, record.towed_count
            );
        }
        let _ = write!(text, "\n**Total tractari**: {}", current.total_towed());
        let _ = write!(text, "\n*Last updated: {}*", now.format(TIMESTAMP_FORMAT));

        Message::new(text)
    }

    /// Notice sent when the first fetch after start-up fails.
    pub fn bootstrap_failure(&self) -> Message {
        Message::new(BOOTSTRAP_FAILED)
    }

    /// Alert sent once after several cycles in a row failed to fetch.
    pub fn fetch_failure_alert(&self, consecutive: u32, error: &str) -> Message {
        Message::new(format!(
            "⚠️ **Script Error**: {consecutive} consecutive fetch failures, last error: {error}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compute_changes;
    use crate::types::{MemberRecord, MemberStatus};

    fn at() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-04-16 12:30:05", TIMESTAMP_FORMAT).unwrap()
    }

    fn member(name: &str, towed: u32) -> MemberRecord {
        MemberRecord::new(name, at()).with_counts(towed, 0, 0)
    }

    fn snapshot(records: Vec<MemberRecord>) -> Snapshot {
        records.into_iter().collect()
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_unit_messages_carry_running_totals() {
        let fmt = Formatter::new(Some("<@7>".into()));
        let prev = snapshot(vec![member("x", 3)]);
        let cur = snapshot(vec![member("x", 5)]);

        let msgs = fmt.format(&compute_changes(&prev, &cur), &cur, at(), false);
        assert_eq!(
            texts(&msgs),
            vec![
                "x a tractat un vehicul, vehicule tractate: 4",
                "x a tractat un vehicul, vehicule tractate: 5",
            ]
        );
        assert!(msgs.iter().all(|m| m.mention.as_deref() == Some("<@7>")));
    }

    #[test]
    fn test_decrease_emits_nothing() {
        let fmt = Formatter::default();
        let prev = snapshot(vec![member("x", 5)]);
        let cur = snapshot(vec![member("x", 3)]);

        let msgs = fmt.format(&compute_changes(&prev, &cur), &cur, at(), false);
        assert!(msgs.is_empty());
    }

    #[test]
    fn test_status_change_message() {
        let fmt = Formatter::default();
        let prev = snapshot(vec![member("x", 0).with_status(MemberStatus::Green)]);
        let cur = snapshot(vec![member("x", 0).with_status(MemberStatus::Red)]);

        let msgs = fmt.format(&compute_changes(&prev, &cur), &cur, at(), false);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].text.contains("green"));
        assert!(msgs[0].text.contains("red"));
        assert!(msgs[0].mention.is_none());
    }

    #[test]
    fn test_membership_change_order_and_summary() {
        let fmt = Formatter::default();
        let prev = snapshot(vec![member("A", 1), member("B", 2)]);
        let cur = snapshot(vec![member("B", 3), member("C", 0)]);

        let msgs = fmt.format(&compute_changes(&prev, &cur), &cur, at(), false);
        assert_eq!(msgs[0].text, "🆕 **New member joined**: C");
        assert_eq!(msgs[1].text, "👋 **Member left**: A");
        assert!(msgs[2].text.starts_with(SUMMARY_HEADER));
        assert_eq!(msgs[3].text, "B a tractat un vehicul, vehicule tractate: 3");
        assert_eq!(msgs.len(), 4);
    }

    #[test]
    fn test_summary_text() {
        let fmt = Formatter::default();
        let cur = snapshot(vec![member("bob", 2), member("amy", 2), member("cid", 7)]);

        let summary = fmt.summary(&cur, at());
        assert_eq!(
            summary.text,
            "**Current Faction Members Tractari Summary:**\n\
             • **cid**: 7 vehicule tractate\n\
             • **amy**: 2 vehicule tractate\n\
             • **bob**: 2 vehicule tractate\n\
             \n**Total tractari**: 11\n\
             *Last updated: 2025-04-16 12:30:05*"
        );
    }

    #[test]
    fn test_bootstrap_forces_summary() {
        let fmt = Formatter::default();
        let cur = snapshot(vec![member("x", 1)]);

        let msgs = fmt.format(&compute_changes(&cur, &cur), &cur, at(), true);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].text.starts_with(SUMMARY_HEADER));

        assert!(fmt.format(&compute_changes(&cur, &cur), &cur, at(), false).is_empty());
    }

    #[test]
    fn test_empty_current_yields_diagnostic() {
        let fmt = Formatter::default();
        let prev = snapshot(vec![member("gone", 4)]);
        let cur = Snapshot::new();

        let msgs = fmt.format(&compute_changes(&prev, &cur), &cur, at(), false);
        assert_eq!(texts(&msgs), vec!["👋 **Member left**: gone", NO_MEMBERS]);
    }
}
