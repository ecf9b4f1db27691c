//! Roster table extraction from the faction members page.
//!
//! Synchronous on purpose: `scraper::Html` is `!Send`, so the document must
//! never be held across an `.await`.

use chrono::NaiveDateTime;
use roster_watch::{MemberRecord, MemberStatus, Snapshot};
use scraper::{ElementRef, Html, Selector};

use crate::error::{FetchError, FetchResult, ParseError};

/// Members parsed from one page, plus the rows that had to be skipped.
#[derive(Debug, Clone)]
pub struct RosterPage {
    pub snapshot: Snapshot,
    pub skipped: Vec<ParseError>,
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// Parse the member roster out of a full HTML document.
///
/// The table is looked up by its striped/hover classes first, then as the
/// first table inside a `.table-responsive` wrapper. Counter spans are read
/// in page order (towed, repaired, refill); any that are missing count as 0.
pub fn parse_roster(html: &str, observed_at: NaiveDateTime) -> FetchResult<RosterPage> {
    let document = Html::parse_document(html);
    let table = find_table(&document).ok_or(FetchError::TableNotFound)?;

    let row_sel = selector("tbody tr");
    let link_sel = selector("a");
    let span_sel = selector("span");
    let class_sel = selector("[class]");

    let mut snapshot = Snapshot::new();
    let mut skipped = Vec::new();
    let mut rows = 0usize;

    for row in table.select(&row_sel) {
        rows += 1;
        // Header and spacer rows carry no member link.
        let Some(link) = row.select(&link_sel).next() else {
            continue;
        };

        match parse_row(row, link, &span_sel, &class_sel, observed_at) {
            Ok(record) => {
                if let Some(prev) = snapshot.insert(record) {
                    tracing::warn!("Duplicate roster row for {}, keeping the later one", prev.name);
                }
            }
            Err(e) => {
                tracing::warn!("Skipping roster row: {e}");
                skipped.push(e);
            }
        }
    }

    tracing::debug!(
        "Roster table: {rows} rows, {} members, {} skipped",
        snapshot.len(),
        skipped.len()
    );

    if snapshot.is_empty() {
        return Err(FetchError::EmptyRoster);
    }

    Ok(RosterPage { snapshot, skipped })
}

fn find_table(document: &Html) -> Option<ElementRef<'_>> {
    document
        .select(&selector("table.table.table-striped.table-hover"))
        .next()
        .or_else(|| {
            document
                .select(&selector("div.table-responsive table"))
                .next()
        })
}

fn parse_row(
    row: ElementRef<'_>,
    link: ElementRef<'_>,
    span_sel: &Selector,
    class_sel: &Selector,
    observed_at: NaiveDateTime,
) -> Result<MemberRecord, ParseError> {
    let name = element_text(link);

    let player_id = link
        .value()
        .attr("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ParseError::MissingPlayerId { name: name.clone() })?;

    if player_id.chars().any(char::is_whitespace) {
        return Err(ParseError::InvalidPlayerId {
            name,
            id: player_id.to_string(),
        });
    }

    // Counter spans are matched on the exact class, so ids that are not
    // valid CSS identifiers still line up with their spans.
    let points_class = format!("points-{player_id}");
    let spans = row
        .select(span_sel)
        .filter(|span| span.value().classes().any(|c| c == points_class));

    let mut counts = [0u32; 3];
    for (slot, span) in counts.iter_mut().zip(spans) {
        let raw = element_text(span);
        *slot = raw.parse().map_err(|_| ParseError::InvalidCount {
            name: name.clone(),
            value: raw.clone(),
        })?;
    }

    let status = infer_status(row, class_sel);

    Ok(MemberRecord::new(name, observed_at)
        .with_counts(counts[0], counts[1], counts[2])
        .with_status(status))
}

/// First colour class on the row itself or any element inside it.
fn infer_status(row: ElementRef<'_>, class_sel: &Selector) -> MemberStatus {
    std::iter::once(row)
        .chain(row.select(class_sel))
        .flat_map(|el| el.value().classes())
        .map(MemberStatus::from_class)
        .find(|status| status.is_known())
        .unwrap_or_default()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_watch::TIMESTAMP_FORMAT;

    fn at() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-04-16 09:15:00", TIMESTAMP_FORMAT).unwrap()
    }

    fn page(table: &str) -> String {
        format!("<html><head><title>Members</title></head><body>{table}</body></html>")
    }

    const FULL_TABLE: &str = r#"
        <table class="table table-striped table-hover">
          <thead><tr><th>Name</th><th>Tractate</th><th>Reparate</th><th>Umplute</th></tr></thead>
          <tbody>
            <tr>
              <td><i class="fa fa-circle text-success"></i> <a id="195032" href="/profile/195032"> Ion_Popescu </a></td>
              <td><span class="points-195032">12</span></td>
              <td><span class="points-195032">3</span></td>
              <td><span class="points-195032">7</span></td>
            </tr>
            <tr>
              <td><i class="fa fa-circle text-danger"></i> <a id="200111" href="/profile/200111">Maria</a></td>
              <td><span class="points-200111">0</span></td>
            </tr>
            <tr>
              <td><a id="300222" href="/profile/300222">Vlad</a></td>
            </tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_parse_full_table() {
        let parsed = parse_roster(&page(FULL_TABLE), at()).unwrap();
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.snapshot.len(), 3);

        let ion = parsed.snapshot.get("Ion_Popescu").unwrap();
        assert_eq!((ion.towed_count, ion.repaired_count, ion.refill_count), (12, 3, 7));
        assert_eq!(ion.status, MemberStatus::Green);
        assert_eq!(ion.observed_at, at());

        let maria = parsed.snapshot.get("Maria").unwrap();
        assert_eq!((maria.towed_count, maria.repaired_count, maria.refill_count), (0, 0, 0));
        assert_eq!(maria.status, MemberStatus::Red);

        let vlad = parsed.snapshot.get("Vlad").unwrap();
        assert_eq!(vlad.towed_count, 0);
        assert_eq!(vlad.status, MemberStatus::Unknown);
    }

    #[test]
    fn test_table_nested_in_responsive_container() {
        let html = page(
            r#"<div class="table-responsive"><table class="members">
                 <tbody><tr><td><a id="1">Ana</a></td><td><span class="points-1">4</span></td></tr></tbody>
               </table></div>"#,
        );
        let parsed = parse_roster(&html, at()).unwrap();
        assert_eq!(parsed.snapshot.get("Ana").unwrap().towed_count, 4);
    }

    #[test]
    fn test_table_without_tbody_markup() {
        let html = page(
            r#"<table class="table table-striped table-hover">
                 <tr><td><a id="5">Dan</a></td><td><span class="points-5">2</span></td></tr>
               </table>"#,
        );
        let parsed = parse_roster(&html, at()).unwrap();
        assert_eq!(parsed.snapshot.get("Dan").unwrap().towed_count, 2);
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let html = page(
            r#"<table class="table table-striped table-hover"><tbody>
                 <tr><td><a href="/x">NoId</a></td></tr>
                 <tr><td><a id="8">Broken</a></td><td><span class="points-8">n/a</span></td></tr>
                 <tr><td><a id="9">Good</a></td><td><span class="points-9">1</span></td></tr>
               </tbody></table>"#,
        );
        let parsed = parse_roster(&html, at()).unwrap();
        assert_eq!(parsed.snapshot.len(), 1);
        assert!(parsed.snapshot.contains("Good"));
        assert_eq!(
            parsed.skipped,
            vec![
                ParseError::MissingPlayerId {
                    name: "NoId".into()
                },
                ParseError::InvalidCount {
                    name: "Broken".into(),
                    value: "n/a".into()
                },
            ]
        );
    }

    #[test]
    fn test_spans_of_other_players_are_ignored() {
        let html = page(
            r#"<table class="table table-striped table-hover"><tbody>
                 <tr><td><a id="1">One</a></td><td><span class="points-2">99</span><span class="points-1">3</span></td></tr>
               </tbody></table>"#,
        );
        let parsed = parse_roster(&html, at()).unwrap();
        assert_eq!(parsed.snapshot.get("One").unwrap().towed_count, 3);
    }

    #[test]
    fn test_two_counters_leave_refill_at_zero() {
        let html = page(
            r#"<table class="table table-striped table-hover"><tbody>
                 <tr><td><a id="4">Eva</a></td><td><span class="points-4">6</span></td><td><span class="points-4">2</span></td></tr>
               </tbody></table>"#,
        );
        let parsed = parse_roster(&html, at()).unwrap();
        let eva = parsed.snapshot.get("Eva").unwrap();
        assert_eq!((eva.towed_count, eva.repaired_count, eva.refill_count), (6, 2, 0));
    }

    #[test]
    fn test_ids_outside_css_identifier_syntax() {
        let html = page(
            r#"<table class="table table-striped table-hover"><tbody>
                 <tr><td><a id="12.5">Dot</a></td><td><span class="points-12.5">9</span></td></tr>
                 <tr><td><a id="7 b">Sp</a></td><td><span class="points-7">4</span></td></tr>
                 <tr><td><a id="3">Tre</a></td><td><span class="points-3 text-bold">5</span></td></tr>
               </tbody></table>"#,
        );
        let parsed = parse_roster(&html, at()).unwrap();
        assert_eq!(parsed.snapshot.get("Dot").unwrap().towed_count, 9);
        assert_eq!(parsed.snapshot.get("Tre").unwrap().towed_count, 5);
        assert!(!parsed.snapshot.contains("Sp"));
        assert_eq!(
            parsed.skipped,
            vec![ParseError::InvalidPlayerId {
                name: "Sp".into(),
                id: "7 b".into()
            }]
        );
    }

    #[test]
    fn test_missing_table() {
        let html = page("<p>Just a moment...</p>");
        assert!(matches!(
            parse_roster(&html, at()),
            Err(FetchError::TableNotFound)
        ));
    }

    #[test]
    fn test_table_without_members() {
        let html = page(
            r#"<table class="table table-striped table-hover"><tbody><tr><td>No members</td></tr></tbody></table>"#,
        );
        assert!(matches!(
            parse_roster(&html, at()),
            Err(FetchError::EmptyRoster)
        ));
    }
}
