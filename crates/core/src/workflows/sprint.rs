//! Sprint rollover.

use chrono::{Datelike, Duration, NaiveDate};
use tracing::{info, warn};

use crate::calendar::working_days;
use crate::domain::board::FieldUpdate;
use crate::domain::records::{SprintRecord, SquadPointsEntry};
use crate::domain::tally::CategoryTally;
use crate::errors::WorkflowError;
use crate::ports::Notice;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

/// Retro board columns, in creation order. Trello prepends new lists, so the board shows
/// them reversed.
pub const RETRO_LISTS: [&str; 7] = [
    "Completed",
    "Action Items",
    "Vent",
    "Stop Doing",
    "Start Doing",
    "What Needs Improvement",
    "What Went Well",
];

pub const NON_SQUAD: &str = "Non-Squad";

const ALERT_COLOR: &str = "#ff0000";
const THEME_WARNING: &str =
    "*WARNING*! The following cards do *not* have appropriate Theme Labels on them: ";

#[derive(Clone, Debug, PartialEq)]
pub struct SprintSummary {
    pub sprint_name: String,
    pub rolled_over: u32,
    pub moved_to_backlog: u32,
    pub ready_for_work: u32,
    pub total_points: u32,
    pub squads: CategoryTally,
    pub retro_board_id: Option<String>,
    pub working_days: u32,
    pub message: String,
}

pub fn sprint_name(prefix: &str, date: NaiveDate) -> String {
    format!("{prefix}-{}", date.format("%m-%d-%Y"))
}

/// Archive table for a sprint's card tracker, restricted to `[a-z0-9_]`.
pub fn archive_table_name(table_prefix: &str, sprint_name: &str) -> String {
    format!("{table_prefix}_{sprint_name}")
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Squad history rows, closing with the points no squad claimed.
pub fn squad_history(sprint_name: &str, tally: &CategoryTally) -> Vec<SquadPointsEntry> {
    tally
        .buckets
        .iter()
        .map(|bucket| SquadPointsEntry {
            sprint_name: sprint_name.to_string(),
            squad_name: bucket.name.clone(),
            points: bucket.total,
        })
        .chain(std::iter::once(SquadPointsEntry {
            sprint_name: sprint_name.to_string(),
            squad_name: NON_SQUAD.into(),
            points: tally.unassigned,
        }))
        .collect()
}

impl Workflows {
    /// Closes the active sprint and opens the next one.
    ///
    /// Board reads abort the rollover; individual card, board and store writes are trapped
    /// and skipped so a partial failure still leaves every in-flight card out of the sprint
    /// lists.
    pub async fn start_sprint(
        &self,
        team: &TeamConfig,
        suppress_retro: bool,
    ) -> Result<SprintSummary, WorkflowError> {
        info!(event_name = "workflow.sprint.start", team = %team.team_id, "executing sprint setup");

        self.close_sprint(team).await?;

        let today = self.today();
        let new_sprint = sprint_name(&team.sprint_prefix, today);
        let squads = self.store.squads(&team.board_id).await?;

        let themes = self.check_themes(team, &team.next_sprint_list).await?;
        if !themes.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                THEME_WARNING,
                ALERT_COLOR,
                themes,
            ))
            .await;
        }

        let (rolled_over, moved_to_backlog) = self.clear_sprint_lists(team).await?;

        let mut tally = CategoryTally::new(&squads);
        let mut total_points = 0;
        let mut ready_for_work = 0;
        for card in self.read_list(&team.next_sprint_list).await? {
            if let Some(previous) = card.field(&team.sprint_field) {
                let comment = format!("Renaming sprint field from ({previous}) to {new_sprint}\n");
                if let Err(error) = self.trello.add_comment(&card.id, &comment).await {
                    self.trap("could not comment the sprint rename", &error).await;
                }
            }
            let update = FieldUpdate::Text(new_sprint.clone());
            if let Err(error) =
                self.trello.set_custom_field(&card.id, &team.sprint_field, update).await
            {
                self.trap("could not write the new sprint name", &error).await;
            }

            let points = self.card_points(&card).await;
            total_points += points;
            let update = FieldUpdate::Number(points.to_string());
            if let Err(error) =
                self.trello.set_custom_field(&card.id, &team.points_field, update).await
            {
                self.trap("could not write the burndown points field", &error).await;
            }
            tally.add(&card.label_ids(), points);

            let hushed = card.has_label(&team.silence_label);
            if !hushed {
                for member in &card.id_members {
                    if let Err(error) = self.trello.remove_member(&card.id, member).await {
                        self.trap(&format!("could not remove {member} from {}", card.name), &error)
                            .await;
                    }
                }
                if points > team.max_points {
                    let body = format!(
                        "Card #{} contains _*{points}*_ points!\nPlease address it. - {}",
                        card.id_short,
                        card.short_link()
                    );
                    self.notify(Notice::with_attachment(
                        &team.sprint_channel,
                        "<!here> *WARNING!* High Point Card Found!",
                        ALERT_COLOR,
                        body,
                    ))
                    .await;
                    continue;
                }
                if points == 0 && !card.is_spike() {
                    let body = format!("Card {} contains _*NO*_ points!\n", card.short_link());
                    self.notify(Notice::with_attachment(
                        &team.sprint_channel,
                        "<!here> *WARNING!* Card with No Points!",
                        ALERT_COLOR,
                        body,
                    ))
                    .await;
                    continue;
                }
            }
            match self.trello.move_card(&card.id, &team.ready_for_work_list).await {
                Ok(()) => ready_for_work += 1,
                Err(error) => {
                    self.trap(&format!("could not move {} to Ready for Work", card.name), &error)
                        .await
                }
            }
        }

        let retro_board_id =
            if suppress_retro { None } else { self.create_retro_board(team, &new_sprint).await };

        if !team.demo_board.is_empty() {
            let list_name = format!("DEMO: Sprint {new_sprint}");
            if let Err(error) = self.trello.create_list(&team.demo_board, &list_name).await {
                self.trap(&format!("could not add `{list_name}` to the demo board"), &error).await;
            }
        }

        let working_days = self.sprint_working_days(today, team.sprint_duration).await;
        let record = SprintRecord {
            team_id: team.team_id.clone(),
            sprint_name: new_sprint.clone(),
            started_at: self.now(),
            duration_days: team.sprint_duration,
            working_days,
            retro_board_id: retro_board_id.clone().unwrap_or_default(),
        };
        if let Err(error) = self.store.record_sprint(&record).await {
            self.trap("could not record the new sprint", &error).await;
        }

        self.get_all_points(team, &record).await?;

        let mut body = format!(
            "Total cards moved from current sprint to next sprint: {rolled_over}\n\
             Total cards moved to Backlog: {moved_to_backlog}\n\
             Total cards in Next Sprint: {ready_for_work}\n\n"
        );
        for bucket in &tally.buckets {
            body.push_str(&format!("Total `{}` Points: {}\n", bucket.name, bucket.total));
        }
        body.push_str(&format!("Total points added for this Sprint: {total_points}\n"));
        self.notify(Notice::with_attachment(
            &team.sprint_channel,
            format!(
                "*New Sprint Active* - (<https://trello.com/b/{}|{new_sprint}>)",
                team.board_id
            ),
            "#00ba2b",
            body,
        ))
        .await;

        info!(
            event_name = "workflow.sprint.completed",
            team = %team.team_id,
            sprint = %new_sprint,
            rolled_over,
            moved_to_backlog,
            ready_for_work,
            total_points,
            "sprint setup finished"
        );
        Ok(SprintSummary {
            sprint_name: new_sprint,
            rolled_over,
            moved_to_backlog,
            ready_for_work,
            total_points,
            squads: tally,
            retro_board_id,
            working_days,
            message: format!("Done Executing Sprint Setup for `{}` board\n", team.team_name),
        })
    }

    /// Snapshots the closing sprint: burndown, squad history and a card tracker archive.
    async fn close_sprint(&self, team: &TeamConfig) -> Result<(), WorkflowError> {
        let Some(closing) = self.store.latest_sprint(&team.team_id).await? else {
            warn!(
                event_name = "workflow.sprint.no_previous",
                team = %team.team_id,
                "no recorded sprint to close"
            );
            return Ok(());
        };

        self.get_all_points(team, &closing).await?;

        let squads = self.sprint_squad_points(team, &closing.sprint_name).await?;
        let history = squad_history(&closing.sprint_name, &squads);
        if let Err(error) = self.store.record_squad_points(&history).await {
            self.trap("could not record squad points for the closing sprint", &error).await;
        }

        let table = archive_table_name(&self.settings.table_prefix, &closing.sprint_name);
        if let Err(error) = self.store.archive_card_tracker(&table).await {
            self.trap(&format!("could not archive the card tracker to {table}"), &error).await;
        }
        Ok(())
    }

    /// Sends every in-flight card to Next Sprint (roll-over label) or back to the Backlog.
    async fn clear_sprint_lists(&self, team: &TeamConfig) -> Result<(u32, u32), WorkflowError> {
        let in_flight = [
            team.ready_for_work_list.as_str(),
            team.working_list.as_str(),
            team.review_list.as_str(),
        ];
        let cards = self.read_board(team).await?;
        let mut rolled_over = 0;
        let mut moved_to_backlog = 0;

        for card in cards.iter().filter(|card| in_flight.contains(&card.id_list.as_str())) {
            if card.has_label(&team.rollover_label) {
                if let Err(error) = self.trello.move_card(&card.id, &team.next_sprint_list).await {
                    self.trap(&format!("could not move {} to Next Sprint", card.id), &error).await;
                    continue;
                }
                rolled_over += 1;
                let mut comment =
                    String::from("Moving incomplete card from current sprint, per WDW/planning discussions.\n");
                match self.trello.move_card_to_top(&card.id).await {
                    Ok(()) => comment.push_str("Moving to top of list in priority per SDLC\n"),
                    Err(error) => self.trap("could not move card to top of list", &error).await,
                }
                match self.trello.remove_label(&card.id, &team.rollover_label).await {
                    Ok(()) => comment.push_str("Removed ROLL-OVER label\n"),
                    Err(error) => self.trap("could not remove the roll-over label", &error).await,
                }
                if let Err(error) = self.trello.add_comment(&card.id, &comment).await {
                    self.trap("could not comment the roll-over", &error).await;
                }
            } else {
                if let Err(error) = self.trello.move_card(&card.id, &team.backlog_list).await {
                    self.trap(&format!("could not move {} to Backlog", card.id), &error).await;
                    continue;
                }
                moved_to_backlog += 1;
                let blank = FieldUpdate::Text(" ".into());
                if let Err(error) =
                    self.trello.set_custom_field(&card.id, &team.sprint_field, blank).await
                {
                    self.trap("could not blank the sprint field", &error).await;
                }
                if let Err(error) = self
                    .trello
                    .add_comment(
                        &card.id,
                        "Moving card to backlog from current sprint per WDW planning discussion.",
                    )
                    .await
                {
                    self.trap("could not comment the backlog move", &error).await;
                }
            }
        }
        Ok((rolled_over, moved_to_backlog))
    }

    async fn create_retro_board(&self, team: &TeamConfig, sprint: &str) -> Option<String> {
        let board_name = format!("Retro: {sprint}");
        let board = match self.trello.create_board(&board_name, &team.trello_org).await {
            Ok(board) => board,
            Err(error) => {
                self.trap(&format!("could not create retro board {board_name}"), &error).await;
                return None;
            }
        };

        for list in RETRO_LISTS {
            if let Err(error) = self.trello.create_list(&board.id, list).await {
                self.trap(&format!("could not create retro list {list}"), &error).await;
            }
        }
        if !team.retro_collection.is_empty() {
            if let Err(error) =
                self.trello.add_board_to_collection(&board.id, &team.retro_collection).await
            {
                self.trap("could not add the retro board to its collection", &error).await;
            }
        }

        match self.store.users().await {
            Ok(users) => {
                for user in users.iter().filter(|user| !user.trello.is_empty()) {
                    if let Err(error) = self.trello.add_board_member(&board.id, &user.trello).await
                    {
                        self.trap(&format!("could not add {} to the retro board", user.name), &error)
                            .await;
                    }
                }
            }
            Err(error) => self.trap("could not load users for the retro board", &error).await,
        }

        self.notify(Notice::with_attachment(
            &team.retro_channel,
            "*Notice!*",
            "#00aaff",
            format!(
                "I created this sprints Retro board and its called {board_name}!\n https://trello.com/b/{}/",
                board.id
            ),
        ))
        .await;
        Some(board.id)
    }

    async fn sprint_working_days(&self, start: NaiveDate, duration: u32) -> u32 {
        let end = start + Duration::days(i64::from(duration));
        let mut holidays = Vec::new();
        for year in start.year()..=end.year() {
            match self.store.holidays_in_year(year).await {
                Ok(found) => holidays.extend(found.into_iter().map(|holiday| holiday.date)),
                Err(error) => self.trap("could not load holidays", &error).await,
            }
        }
        working_days(start, duration, &holidays)
    }
}
