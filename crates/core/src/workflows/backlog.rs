//! Backlog and Done list maintenance.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::calendar::days_old;
use crate::domain::board::{entered_list_at, FieldUpdate};
use crate::errors::WorkflowError;
use crate::ports::Notice;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

const CLEAN_COLOR: &str = "#00ff00";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BacklogCleanup {
    pub cards: u32,
    pub members_removed: u32,
    pub ancient: u32,
    pub fields_cleared: u32,
    pub squad_labels: u32,
}

impl BacklogCleanup {
    pub fn render(&self, backlog_days: u32) -> String {
        let mut message = if self.members_removed > 0 {
            format!("I removed {} faces of off cards.\n", self.members_removed)
        } else {
            "I didn't find any faces on cards to remove though!\n".to_string()
        };
        if self.ancient > 0 {
            message.push_str(&format!(
                "I found {} ancient old cards and logged them. \n",
                self.ancient
            ));
        } else {
            message.push_str(&format!(
                "I did not find any cards older then {backlog_days} days old to complain about.\n"
            ));
        }
        if self.fields_cleared > 0 {
            message.push_str(&format!("Cleaned up {} custom card fields.\n", self.fields_cleared));
        } else {
            message.push_str("I didn't find any custom card fields I had to cleanup!!\n");
        }
        if self.squad_labels > 0 {
            message.push_str(&format!("I removed {} squad labels from cards.\n", self.squad_labels));
        } else {
            message.push_str("I didn't find any old squad labels to remove.\n");
        }
        message.push_str(&format!(
            "There is a total of {} cards in the backlog currently.\n",
            self.cards
        ));
        message
    }
}

impl Workflows {
    /// Strips squad labels, members and sprint bookkeeping from backlog cards. Cards older
    /// than `BackLogDays` are only counted and logged here.
    pub async fn clean_backlog(&self, team: &TeamConfig) -> Result<BacklogCleanup, WorkflowError> {
        let squads: HashSet<String> = self
            .store
            .squads(&team.board_id)
            .await?
            .into_iter()
            .map(|squad| squad.label_id)
            .collect();
        let cards = self.read_list(&team.backlog_list).await?;
        let now = self.now();
        let mut report = BacklogCleanup::default();

        for card in &cards {
            report.cards += 1;

            for label in card.label_ids().into_iter().filter(|id| squads.contains(*id)) {
                if let Err(error) = self.trello.remove_label(&card.id, label).await {
                    self.trap("could not remove a squad label from a backlog card", &error).await;
                }
                report.squad_labels += 1;
            }

            for member in &card.id_members {
                if let Err(error) = self.trello.remove_member(&card.id, member).await {
                    self.trap("could not remove a member from a backlog card", &error).await;
                }
                report.members_removed += 1;
            }

            if card.field(&team.points_field).is_some_and(|points| points != "0") {
                let zero = FieldUpdate::Number("0".into());
                if let Err(error) =
                    self.trello.set_custom_field(&card.id, &team.points_field, zero).await
                {
                    self.trap("could not zero the points field", &error).await;
                }
                report.fields_cleared += 1;
            }
            if card.field(&team.sprint_field).is_some_and(|sprint| !sprint.trim().is_empty()) {
                let blank = FieldUpdate::Text(String::new());
                if let Err(error) =
                    self.trello.set_custom_field(&card.id, &team.sprint_field, blank).await
                {
                    self.trap("could not blank the sprint field", &error).await;
                }
                report.fields_cleared += 1;
            }

            if let Some(created) = card.created_at() {
                let age = days_old(now, created);
                if age > team.backlog_days {
                    report.ancient += 1;
                    info!(
                        event_name = "workflow.backlog.ancient_card",
                        team = %team.team_id,
                        card = %card.id,
                        days = age,
                        "card in backlog is older than {} days",
                        team.backlog_days
                    );
                }
            }
        }

        self.notify(Notice::with_attachment(
            &team.complaint_channel,
            "Team, I just troll'd the backlog for clean up. :sweep:",
            CLEAN_COLOR,
            report.render(team.backlog_days),
        ))
        .await;
        Ok(report)
    }

    /// Archives backlog cards created more than `BackLogDays` ago, sparing hushed and
    /// template cards. Returns the number archived.
    pub async fn archive_backlog(&self, team: &TeamConfig) -> Result<u32, WorkflowError> {
        let cards = self.read_list(&team.backlog_list).await?;
        let now = self.now();
        let mut archived = 0;
        let mut listing = String::new();

        for card in &cards {
            if card.has_label(&team.silence_label) || card.has_label(&team.template_label) {
                debug!(
                    event_name = "workflow.backlog.archive_skipped",
                    card = %card.id,
                    "hushed or template card kept"
                );
                continue;
            }
            let Some(created) = card.created_at() else {
                self.trap(&format!("could not read the creation date of {}", card.short_link()), &"bad card id")
                    .await;
                continue;
            };
            let age = days_old(now, created);
            if age <= team.backlog_days {
                continue;
            }
            match self.trello.archive_card(&card.id).await {
                Ok(()) => {
                    archived += 1;
                    listing.push_str(&format!("{} is {age} days old.\n", card.short_link()));
                }
                Err(error) => {
                    self.trap(&format!("could not archive {}", card.short_link()), &error).await
                }
            }
        }

        self.notify(Notice::with_attachment(
            &team.complaint_channel,
            format!(
                "I archived {archived} card(s) in the `BackLog` that were greater then {} old.  Here's the list:\n",
                team.backlog_days
            ),
            CLEAN_COLOR,
            listing,
        ))
        .await;
        Ok(archived)
    }

    /// Archives Done cards that entered Done more than `ArchiveDoneDays` ago.
    pub async fn clean_done(&self, team: &TeamConfig) -> Result<u32, WorkflowError> {
        let cards = self.read_list(&team.done_list).await?;
        let now = self.now();
        let mut archived = 0;

        for card in &cards {
            let actions = match self.trello.card_actions(&card.id, "updateCard:idList").await {
                Ok(actions) => actions,
                Err(error) => {
                    self.trap(&format!("could not read history of {}", card.short_link()), &error)
                        .await;
                    continue;
                }
            };
            let Some(entered) = entered_list_at(&actions, &team.done_list) else {
                continue;
            };
            if days_old(now, entered) <= team.archive_done_days {
                continue;
            }
            match self.trello.archive_card(&card.id).await {
                Ok(()) => archived += 1,
                Err(error) => {
                    self.trap(&format!("could not archive {}", card.short_link()), &error).await
                }
            }
        }

        let message = if archived == 0 {
            format!(
                "Hey team, I just checked for archivable cards on {} board and found zero older than {} days, so I'm not doing any clean-up today. :beach_with_umbrella:",
                team.team_name, team.archive_done_days
            )
        } else {
            format!(
                "Hey team, I just archived {archived} cards in the `Done` list because they were more than {} days old.",
                team.archive_done_days
            )
        };
        self.notify(Notice::text(&team.complaint_channel, message)).await;
        Ok(archived)
    }

    /// Returns template cards to the top of the Backlog. Returns how many were repositioned.
    pub async fn template_card(&self, team: &TeamConfig) -> Result<u32, WorkflowError> {
        let cards = self.read_board(team).await?;
        let mut placed = 0;
        for card in cards.iter().filter(|card| card.has_label(&team.template_label)) {
            if card.id_list != team.backlog_list {
                if let Err(error) = self.trello.move_card(&card.id, &team.backlog_list).await {
                    self.trap(&format!("could not move template {} to Backlog", card.name), &error)
                        .await;
                    continue;
                }
            }
            match self.trello.move_card_to_top(&card.id).await {
                Ok(()) => placed += 1,
                Err(error) => self.trap("could not move template card to top", &error).await,
            }
        }
        Ok(placed)
    }
}
