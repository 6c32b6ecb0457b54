//! Point reconciliation and burndown snapshots.

use tracing::{debug, info};

use crate::domain::board::{entered_list_at, Card, FieldUpdate};
use crate::domain::records::{BurndownEntry, SprintRecord};
use crate::domain::tally::CategoryTally;
use crate::errors::WorkflowError;
use crate::ports::Notice;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

const CHANGE_ALERT_COLOR: &str = "#ff0000";

/// Burndown snapshot for one sprint. `valid` is false when no points were found, in which
/// case nothing was recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct PointsReport {
    pub valid: bool,
    pub header: String,
    pub message: String,
    pub entry: Option<BurndownEntry>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ListPoints {
    ready_for_work: u32,
    working: u32,
    review: u32,
    done: u32,
    cards: u32,
}

impl ListPoints {
    fn total(&self) -> u32 {
        self.ready_for_work + self.working + self.review + self.done
    }
}

impl Workflows {
    /// Mirrors power-up points into the points custom field for every card of `list_id` and
    /// back-fills the sprint field on in-flight cards. Returns one change-alert line per card
    /// whose previously recorded, non-zero points changed while in flight.
    pub async fn sync_points(
        &self,
        team: &TeamConfig,
        list_id: &str,
    ) -> Result<String, WorkflowError> {
        let sprint = self.current_sprint(team).await?;
        let cards = self.read_list(list_id).await?;
        let in_flight = [
            team.ready_for_work_list.as_str(),
            team.working_list.as_str(),
            team.review_list.as_str(),
        ];

        let mut alerts = String::new();
        for card in cards.iter().filter(|card| card.id_list == list_id) {
            let points = self.card_points(card).await.to_string();
            let existing = card.field(&team.points_field).unwrap_or_default().to_string();
            let tracked = in_flight.contains(&card.id_list.as_str());

            if tracked && card.field(&team.sprint_field) != Some(sprint.sprint_name.as_str()) {
                let update = FieldUpdate::Text(sprint.sprint_name.clone());
                if let Err(error) =
                    self.trello.set_custom_field(&card.id, &team.sprint_field, update).await
                {
                    self.trap("could not update the sprint name field", &error).await;
                }
            }

            if existing == points {
                continue;
            }
            if tracked && !existing.is_empty() && existing != "0" {
                alerts.push_str(&format!(
                    "Points on card {} have changed from {existing} to {points}\n",
                    card.link()
                ));
            }
            let update = FieldUpdate::Number(points.clone());
            if let Err(error) =
                self.trello.set_custom_field(&card.id, &team.points_field, update).await
            {
                self.trap("could not sync the points field", &error).await;
            }
        }
        Ok(alerts)
    }

    /// Runs [`Workflows::sync_points`] over the four sprint lists and posts any point changes
    /// to the complaint channel.
    pub async fn point_cleanup(&self, team: &TeamConfig) -> Result<String, WorkflowError> {
        let mut alerts = String::new();
        for (name, list_id) in team.sprint_lists() {
            debug!(
                event_name = "workflow.points.sync_list",
                team = %team.team_id,
                list = name,
                "syncing points"
            );
            alerts.push_str(&self.sync_points(team, list_id).await?);
        }

        if !alerts.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "<!here> Points have been changed on these cards that are in the *current sprint*.",
                CHANGE_ALERT_COLOR,
                alerts.clone(),
            ))
            .await;
        }
        info!(
            event_name = "workflow.points.synced",
            team = %team.team_id,
            changed = alerts.lines().count(),
            "point cleanup finished"
        );
        Ok(alerts)
    }

    /// Sums the points of `sprint` per list and records a burndown row. A zero total is
    /// reported as invalid and not recorded.
    pub async fn get_all_points(
        &self,
        team: &TeamConfig,
        sprint: &SprintRecord,
    ) -> Result<PointsReport, WorkflowError> {
        let cards = self.read_board(team).await?;
        let mut points = ListPoints::default();

        for card in &cards {
            let list = card.id_list.as_str();
            if list == team.ready_for_work_list {
                points.ready_for_work += self.card_points(card).await;
                points.cards += 1;
            } else if list == team.working_list {
                points.working += self.card_points(card).await;
                points.cards += 1;
            } else if list == team.review_list {
                points.review += self.card_points(card).await;
                points.cards += 1;
            } else if list == team.done_list {
                let sprint_name = card.field(&team.sprint_field).unwrap_or_default();
                if sprint_name.is_empty() {
                    if self.entered_done_during(team, card, sprint).await {
                        points.done += self.card_points(card).await;
                    }
                } else if sprint_name == sprint.sprint_name {
                    points.done += self.card_points(card).await;
                    points.cards += 1;
                }
            }
        }

        let total = points.total();
        if total == 0 {
            self.trap(
                &format!(
                    "Trying to add points for {} sprint and Zero Points were found, somethings awry!",
                    team.team_name
                ),
                &"zero points",
            )
            .await;
            return Ok(PointsReport {
                valid: false,
                header: String::new(),
                message: "Invalid points.".into(),
                entry: None,
            });
        }

        let entry = BurndownEntry {
            recorded_at: self.now(),
            team_id: sprint.team_id.clone(),
            total,
            ready_for_work: points.ready_for_work,
            working: points.working,
            review: points.review,
            done: points.done,
            cards: points.cards,
        };
        if let Err(error) = self.store.record_burndown(&entry).await {
            self.trap("could not record the burndown row", &error).await;
        }

        let average =
            if points.cards == 0 { 0.0 } else { f64::from(total) / f64::from(points.cards) };
        let header = format!(
            "Recording today's sprint points for *{}* off this <https://trello.com/b/{}|Trello Board>",
            team.team_name, team.board_id
        );
        let message = format!(
            "Points in Ready For Work: {}\nPoints in Working: {}\nPoints in PR: {}\n\
             Points in Done: {}\nTotal Points in Sprint: {total}\nTotal Cards in Sprint: {}\n\
             Avg Points Per Card: {average:.2}",
            points.ready_for_work, points.working, points.review, points.done, points.cards
        );
        Ok(PointsReport { valid: true, header, message, entry: Some(entry) })
    }

    /// Per-squad points of every card in the sprint lists whose sprint field names `sprint_name`.
    pub async fn sprint_squad_points(
        &self,
        team: &TeamConfig,
        sprint_name: &str,
    ) -> Result<CategoryTally, WorkflowError> {
        let squads = self.store.squads(&team.board_id).await?;
        let mut tally = CategoryTally::new(&squads);
        let lists = team.sprint_lists().map(|(_, id)| id);

        for card in self.read_board(team).await? {
            if !lists.contains(&card.id_list.as_str())
                || card.field(&team.sprint_field) != Some(sprint_name)
            {
                continue;
            }
            let points = self.card_points(&card).await;
            tally.add(&card.label_ids(), points);
        }
        Ok(tally)
    }

    async fn entered_done_during(
        &self,
        team: &TeamConfig,
        card: &Card,
        sprint: &SprintRecord,
    ) -> bool {
        match self.trello.card_actions(&card.id, "updateCard:idList").await {
            Ok(actions) => entered_list_at(&actions, &team.done_list)
                .is_some_and(|entered| entered > sprint.started_at),
            Err(error) => {
                self.trap(&format!("could not read history of {}", card.short_link()), &error)
                    .await;
                false
            }
        }
    }
}
