//! Card tracker: how long the current sprint's cards spent in each column.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::info;

use crate::calendar::days_old;
use crate::domain::board::{entered_list_at, Card};
use crate::domain::records::CardTrackerRow;
use crate::errors::WorkflowError;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

const CSV_HEADER: &str =
    "Card ID,Card Title,Points,Card URL,List,Started in Working,Days,Started in PR,Days,Entered Done,Owners\n";

/// Dwell times above this many days are left blank in the CSV.
const MAX_REPORTED_DAYS: u32 = 30;

impl Workflows {
    /// Reloads the card tracker table with the current sprint's cards.
    pub async fn card_play(&self, team: &TeamConfig) -> Result<Vec<CardTrackerRow>, WorkflowError> {
        let rows = self.tracker_rows(team).await?;
        self.store.reset_card_tracker().await?;
        self.store.record_card_tracker(&rows).await?;
        info!(
            event_name = "workflow.tracker.loaded",
            team = %team.team_id,
            cards = rows.len(),
            "card movement data gathering complete, database updated"
        );
        Ok(rows)
    }

    /// The same rows as [`Workflows::card_play`] rendered as CSV, without touching the store.
    pub async fn card_report_csv(&self, team: &TeamConfig) -> Result<String, WorkflowError> {
        let rows = self.tracker_rows(team).await?;
        Ok(render_csv(&rows, self.now(), self.settings.local_offset))
    }

    async fn tracker_rows(&self, team: &TeamConfig) -> Result<Vec<CardTrackerRow>, WorkflowError> {
        let sprint = self.current_sprint(team).await?;
        let cards = self.read_board(team).await?;
        let list_names: HashMap<String, String> = self
            .trello
            .board_lists(&team.board_id)
            .await
            .map_err(WorkflowError::BoardRead)?
            .into_iter()
            .map(|list| (list.id, list.name))
            .collect();

        let tracked = [
            &team.ready_for_work_list,
            &team.working_list,
            &team.review_list,
            &team.done_list,
        ];
        let mut rows = Vec::new();
        for card in cards.iter().filter(|card| {
            tracked.contains(&&card.id_list) && card.field(&team.sprint_field) == Some(sprint.sprint_name.as_str())
        }) {
            rows.push(self.tracker_row(team, card, &list_names).await);
        }
        Ok(rows)
    }

    async fn tracker_row(
        &self,
        team: &TeamConfig,
        card: &Card,
        list_names: &HashMap<String, String>,
    ) -> CardTrackerRow {
        let history = match self.trello.card_actions(&card.id, "updateCard:idList").await {
            Ok(history) => history,
            Err(error) => {
                self.trap(&format!("could not read history of {}", card.short_link()), &error).await;
                Vec::new()
            }
        };
        let owners = match self.trello.card_members(&card.id).await {
            Ok(members) => {
                members.into_iter().map(|member| member.full_name).collect::<Vec<_>>().join("|")
            }
            Err(error) => {
                self.trap(&format!("could not read members of {}", card.short_link()), &error).await;
                String::new()
            }
        };

        CardTrackerRow {
            card_id: card.id.clone(),
            title: card.name.clone(),
            points: self.card_points(card).await,
            url: card.short_url.clone(),
            list_name: list_names.get(&card.id_list).cloned().unwrap_or_default(),
            started_working: entered_list_at(&history, &team.working_list),
            started_review: entered_list_at(&history, &team.review_list),
            entered_done: entered_list_at(&history, &team.done_list),
            owners,
            team_id: team.team_id.clone(),
        }
    }
}

/// CSV export of tracker rows. Days count up to the next column, or to `now` while the
/// card is still there.
pub fn render_csv(rows: &[CardTrackerRow], now: DateTime<Utc>, offset: FixedOffset) -> String {
    let stamp = |at: Option<DateTime<Utc>>| {
        at.map(|at| at.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    };
    let dwell = |from: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>| match from {
        Some(from) => {
            let days = days_old(until.unwrap_or(now), from);
            if days > MAX_REPORTED_DAYS {
                String::new()
            } else {
                days.to_string()
            }
        }
        None => String::new(),
    };

    let mut output = String::from(CSV_HEADER);
    for row in rows {
        let fields = [
            row.card_id.clone(),
            csv_field(&row.title),
            row.points.to_string(),
            row.url.clone(),
            csv_field(&row.list_name),
            stamp(row.started_working),
            dwell(row.started_working, row.started_review),
            stamp(row.started_review),
            dwell(row.started_review, row.entered_done),
            stamp(row.entered_done),
            csv_field(&row.owners),
        ];
        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone, Utc};

    use super::render_csv;
    use crate::domain::board::{ActionData, ActionList, BoardList, CardAction, Member};
    use crate::domain::records::{CardTrackerRow, SprintRecord};
    use crate::team::fixtures;
    use crate::workflows::testing::{card, text, with_field, Harness};

    #[tokio::test]
    async fn tracker_reloads_rows_for_current_sprint() {
        let now = Utc.with_ymd_and_hms(2026, 4, 10, 12, 0, 0).single().expect("ts");
        let harness = Harness::new(now);
        let team = fixtures::team();
        harness.store.with(|state| {
            state.sprints.push(SprintRecord {
                team_id: "mcboard".into(),
                sprint_name: "MC 2026-04-06".into(),
                started_at: now - Duration::days(4),
                duration_days: 14,
                working_days: 10,
                retro_board_id: String::new(),
            });
            state.tracker.push(CardTrackerRow { card_id: "stale-row".into(), ..CardTrackerRow::default() });
        });

        let mut current = with_field(card("c1", "Ship it", "l-review"), "cf-sprint", text("MC 2026-04-06"));
        current.id_members = vec!["m1".into(), "m2".into()];
        harness.trello.add_card(current, Some(5));
        harness.trello.add_card(
            with_field(card("c2", "Old work", "l-working"), "cf-sprint", text("MC 2026-03-23")),
            Some(3),
        );
        harness.trello.with(|board| {
            board.lists.insert(
                "board1".into(),
                vec![BoardList { id: "l-review".into(), name: "Ready for Review".into(), closed: false }],
            );
            for (id, name) in [("m1", "Ana Lee"), ("m2", "Bo Chan")] {
                board.members.insert(
                    id.into(),
                    Member { id: id.into(), username: id.into(), full_name: name.into() },
                );
            }
            board.actions.insert(
                "c1".into(),
                vec![CardAction {
                    date: Some(now - Duration::days(1)),
                    data: ActionData {
                        list_after: Some(ActionList { id: "l-review".into(), name: String::new() }),
                        ..ActionData::default()
                    },
                    ..CardAction::default()
                }],
            );
        });

        let rows = harness.workflows.card_play(&team).await.expect("tracker");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].owners, "Ana Lee|Bo Chan");
        assert_eq!(rows[0].points, 5);
        assert_eq!(rows[0].list_name, "Ready for Review");
        assert_eq!(rows[0].started_review, Some(now - Duration::days(1)));
        assert_eq!(rows[0].started_working, None);
        let stored = harness.store.with(|state| state.tracker.clone());
        assert_eq!(stored, rows);
    }

    #[test]
    fn csv_leaves_unknown_and_long_dwell_blank() {
        let now = Utc.with_ymd_and_hms(2026, 4, 10, 12, 0, 0).single().expect("ts");
        let row = CardTrackerRow {
            card_id: "c1".into(),
            title: "Parse, then render".into(),
            points: 3,
            url: "https://trello.com/c/c1".into(),
            list_name: "Done".into(),
            started_working: Some(now - Duration::days(40)),
            started_review: Some(now - Duration::days(3)),
            entered_done: Some(now - Duration::days(1)),
            owners: "Ana Lee".into(),
            team_id: "mcboard".into(),
        };

        let csv = render_csv(&[row], now, FixedOffset::east_opt(0).expect("utc"));
        let line = csv.lines().nth(1).expect("row");

        assert_eq!(
            line,
            "c1,\"Parse, then render\",3,https://trello.com/c/c1,Done,2026-03-01 12:00:00,,2026-04-07 12:00:00,2,2026-04-09 12:00:00,Ana Lee"
        );
    }
}
