//! Label driven aggregation: themes, squads, chapters and epic links.

use std::collections::HashSet;

use tracing::info;

use crate::domain::board::{Card, Label};
use crate::domain::records::{ChapterCardsEntry, SquadPointsEntry, ThemeCountEntry};
use crate::domain::tally::CategoryTally;
use crate::errors::WorkflowError;
use crate::ports::Notice;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

/// `Total `Squad` Points: N` lines followed by the unassigned total.
pub fn render_squad_totals(tally: &CategoryTally) -> String {
    let mut output: String = tally
        .buckets
        .iter()
        .map(|bucket| format!("Total `{}` Points: {}\n", bucket.name, bucket.total))
        .collect();
    output.push_str(&format!("Total Points not assigned to a squad: {}\n", tally.unassigned));
    output
}

fn link_lines<'a>(cards: impl IntoIterator<Item = &'a Card>) -> String {
    cards.into_iter().map(|card| format!("{}\n", card.link())).collect()
}

/// `true` when the url points at a Trello board or card.
fn is_trello_link(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.split('/').next().is_some_and(|host| host.eq_ignore_ascii_case("trello.com"))
}

impl Workflows {
    async fn theme_labels(&self, team: &TeamConfig) -> Result<Vec<Label>, WorkflowError> {
        let ignored: HashSet<String> =
            self.store.ignored_labels(&team.board_id).await?.into_iter().collect();
        let labels =
            self.trello.board_labels(&team.board_id).await.map_err(WorkflowError::BoardRead)?;
        Ok(labels.into_iter().filter(|label| !ignored.contains(&label.id)).collect())
    }

    async fn cards_in(
        &self,
        team: &TeamConfig,
        lists: &[&str],
    ) -> Result<Vec<Card>, WorkflowError> {
        let cards = self.read_board(team).await?;
        Ok(cards.into_iter().filter(|card| lists.contains(&card.id_list.as_str())).collect())
    }

    /// Cards of `list_id` carrying no theme label, one link per line. Ignored labels do not
    /// count as themes.
    pub async fn check_themes(
        &self,
        team: &TeamConfig,
        list_id: &str,
    ) -> Result<String, WorkflowError> {
        let ignored: HashSet<String> =
            self.store.ignored_labels(&team.board_id).await?.into_iter().collect();
        let cards = self.cards_in(team, &[list_id]).await?;
        Ok(link_lines(
            cards
                .iter()
                .filter(|card| card.label_ids().iter().all(|id| ignored.contains(*id))),
        ))
    }

    /// Counts themed cards in Upcoming and Scoped and records the counts against the
    /// current sprint. Each card counts once.
    pub async fn count_cards(&self, team: &TeamConfig) -> Result<CategoryTally, WorkflowError> {
        let sprint = self.current_sprint(team).await?;
        let labels = self.theme_labels(team).await?;
        let mut tally = CategoryTally::from_labels(
            labels.iter().map(|label| (label.id.as_str(), label.name.as_str())),
        );
        let lists = [team.upcoming_list.as_str(), team.scoped_list.as_str()];
        for card in self.cards_in(team, &lists).await? {
            tally.add(&card.label_ids(), 1);
        }

        let counted_at = self.now();
        let entries: Vec<ThemeCountEntry> = tally
            .buckets
            .iter()
            .map(|bucket| ThemeCountEntry {
                counted_at,
                team_id: team.team_id.clone(),
                sprint_name: sprint.sprint_name.clone(),
                label_name: bucket.name.clone(),
                quantity: bucket.total,
            })
            .collect();
        self.store.record_theme_counts(&entries).await?;
        info!(
            event_name = "workflow.tally.themes_counted",
            team = %team.team_id,
            themes = entries.len(),
            "theme counts recorded"
        );
        Ok(tally)
    }

    /// Points per theme in one list, highest first. A card with several themes counts
    /// once, under the first board theme it carries.
    pub async fn theme_points(
        &self,
        team: &TeamConfig,
        list_id: &str,
    ) -> Result<CategoryTally, WorkflowError> {
        let labels = self.theme_labels(team).await?;
        let mut tally = CategoryTally::from_labels(
            labels.iter().map(|label| (label.id.as_str(), label.name.as_str())),
        );
        for card in self.cards_in(team, &[list_id]).await? {
            let points = self.card_points(&card).await;
            tally.add(&card.label_ids(), points);
        }
        tally.buckets.sort_by(|a, b| b.total.cmp(&a.total));
        Ok(tally)
    }

    pub async fn squad_points(
        &self,
        team: &TeamConfig,
        list_id: &str,
    ) -> Result<CategoryTally, WorkflowError> {
        let squads = self.store.squads(&team.board_id).await?;
        let mut tally = CategoryTally::new(&squads);
        for card in self.cards_in(team, &[list_id]).await? {
            let points = self.card_points(&card).await;
            tally.add(&card.label_ids(), points);
        }
        Ok(tally)
    }

    /// Cards per chapter in one list; cards without a chapter land in `unassigned`.
    pub async fn chapter_count(
        &self,
        team: &TeamConfig,
        list_id: &str,
    ) -> Result<CategoryTally, WorkflowError> {
        let chapters = self.store.chapters(&team.board_id).await?;
        let mut tally = CategoryTally::new(&chapters);
        for card in self.cards_in(team, &[list_id]).await? {
            tally.add(&card.label_ids(), 1);
        }
        Ok(tally)
    }

    pub async fn chapter_point(
        &self,
        team: &TeamConfig,
        list_id: &str,
    ) -> Result<CategoryTally, WorkflowError> {
        let chapters = self.store.chapters(&team.board_id).await?;
        let mut tally = CategoryTally::new(&chapters);
        for card in self.cards_in(team, &[list_id]).await? {
            let points = self.card_points(&card).await;
            tally.add(&card.label_ids(), points);
        }
        Ok(tally)
    }

    /// Counts chapters in the list named by `column` and stores one row per chapter.
    pub async fn record_chapters(
        &self,
        team: &TeamConfig,
        column: &str,
    ) -> Result<CategoryTally, WorkflowError> {
        let (list_id, list_name) = team.column(column);
        let tally = self.chapter_count(team, list_id).await?;
        let recorded_at = self.now();
        let entries: Vec<ChapterCardsEntry> = tally
            .buckets
            .iter()
            .map(|bucket| ChapterCardsEntry {
                recorded_at,
                chapter_name: bucket.name.clone(),
                list_name: list_name.to_string(),
                cards: bucket.total,
                team_id: team.team_id.clone(),
            })
            .collect();
        self.store.record_chapter_cards(&entries).await?;
        Ok(tally)
    }

    /// Squad history recorded for a past sprint.
    pub async fn previous_sprint_points(
        &self,
        sprint_name: &str,
    ) -> Result<Vec<SquadPointsEntry>, WorkflowError> {
        Ok(self.store.squad_points_for(&sprint_name.to_ascii_lowercase()).await?)
    }

    /// Excludes the board label named `label_name` from theme checks. Returns the label,
    /// or `None` when the board has no label by that name.
    pub async fn ignore_label(
        &self,
        team: &TeamConfig,
        label_name: &str,
    ) -> Result<Option<Label>, WorkflowError> {
        let labels =
            self.trello.board_labels(&team.board_id).await.map_err(WorkflowError::BoardRead)?;
        let wanted = label_name.trim();
        let Some(label) = labels.into_iter().find(|label| label.name.eq_ignore_ascii_case(wanted))
        else {
            return Ok(None);
        };
        self.store.ignore_label(&team.board_id, &label.id).await?;
        Ok(Some(label))
    }

    /// Flags `feature` cards that are not linked to an epic card or board.
    pub async fn epic_link(&self, team: &TeamConfig) -> Result<String, WorkflowError> {
        let lists = [
            team.upcoming_list.as_str(),
            team.scoped_list.as_str(),
            team.ready_for_work_list.as_str(),
            team.working_list.as_str(),
        ];
        let mut missing = String::new();
        for card in self.cards_in(team, &lists).await? {
            if card.has_label(&team.silence_label) {
                continue;
            }
            let is_feature = card.labels.iter().any(|label| label.name.eq_ignore_ascii_case("feature"));
            if !is_feature {
                continue;
            }
            match self.trello.card_attachments(&card.id).await {
                Ok(attachments) => {
                    let linked = attachments
                        .iter()
                        .any(|attachment| !attachment.is_upload && is_trello_link(&attachment.url));
                    if !linked {
                        missing.push_str(&format!("{}\n", card.link()));
                    }
                }
                Err(error) => {
                    self.trap(&format!("could not read attachments of {}", card.id), &error).await
                }
            }
        }

        if !missing.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "The following `Feature` cards do not have Epic links!",
                "#ff0000",
                missing.clone(),
            ))
            .await;
        }
        Ok(missing)
    }
}
