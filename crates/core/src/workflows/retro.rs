//! Retro boards: stale action items and cards added from chat.

use tracing::info;

use crate::calendar::days_old;
use crate::domain::board::Board;
use crate::domain::records::UserRecord;
use crate::errors::WorkflowError;
use crate::ports::Notice;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

const ACTION_ITEMS: &str = "action items";

/// Column a chat-submitted retro card lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetroKind {
    Well,
    Vent,
    Improve,
}

impl RetroKind {
    /// Reads the kind word typed before `retro card`.
    pub fn parse(word: &str) -> Option<Self> {
        let word = word.trim().to_ascii_lowercase();
        if word.contains("well") || word.contains("good") {
            Some(Self::Well)
        } else if word.contains("vent") {
            Some(Self::Vent)
        } else if ["wrong", "bad", "improve"].iter().any(|kind| word.contains(kind)) {
            Some(Self::Improve)
        } else {
            None
        }
    }

    pub fn list_name(self) -> &'static str {
        match self {
            Self::Well => "What Went Well",
            Self::Vent => "Vent",
            Self::Improve => "What Needs Improvement",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetroCardOutcome {
    Created { title: String, list_name: &'static str, board: Board },
    MissingList { list_name: &'static str, board: Board },
    NoRetroBoard,
}

impl RetroCardOutcome {
    pub fn reply(&self) -> String {
        match self {
            Self::Created { title, list_name, board } => format!(
                "I created your card `{title}` on list `{list_name}` in <{}|{}>",
                board.short_url, board.name
            ),
            Self::MissingList { list_name, .. } => format!(
                "Sorry somethings wrong with that trello board I can't find the `{list_name}` column!"
            ),
            Self::NoRetroBoard => "Sorry I couldn't find what you were asking for! - ".to_string(),
        }
    }
}

impl Workflows {
    /// Messages owners of retro action items that saw no activity for `RetroActionDays`.
    /// Returns how many messages went out.
    pub async fn retro_check(&self, team: &TeamConfig, board_id: &str) -> Result<u32, WorkflowError> {
        let users = self.store.users().await?;
        let cards = self.trello.board_cards(board_id).await.map_err(WorkflowError::BoardRead)?;
        let lists = self.trello.board_lists(board_id).await.map_err(WorkflowError::BoardRead)?;

        let Some(actions) = lists.iter().find(|list| list.name.eq_ignore_ascii_case(ACTION_ITEMS))
        else {
            info!(
                event_name = "workflow.retro.no_action_list",
                board = %board_id,
                "retro board has no action items list, skipping"
            );
            return Ok(0);
        };

        let now = self.now();
        let mut sent = 0;
        for card in cards.iter().filter(|card| card.id_list == actions.id && !card.closed) {
            let Some(activity) = card.date_last_activity else {
                continue;
            };
            if days_old(now, activity) < team.retro_action_days || card.id_members.is_empty() {
                continue;
            }
            let members = match self.trello.card_members(&card.id).await {
                Ok(members) => members,
                Err(error) => {
                    self.trap(&format!("could not read members of retro card {}", card.id), &error)
                        .await;
                    continue;
                }
            };
            for member in members {
                let Some(user) = registered(&users, &member.username) else {
                    continue;
                };
                info!(
                    event_name = "workflow.retro.action_reminder",
                    trello = %user.trello,
                    card = %card.name,
                    days = team.retro_action_days,
                    "reminding owner of an idle retro action card"
                );
                let text = format!(
                    "*Warning!* You have a Retro Action Item that is still not complete and has no activity in the past {} days.\n{}",
                    team.retro_action_days,
                    card.link()
                );
                if self.direct(&user.slack_id, Notice::text(&user.slack_id, text)).await {
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }

    /// Runs [`Workflows::retro_check`] over every retro board the team's sprints created.
    pub async fn check_action_cards(&self, team: &TeamConfig) -> Result<u32, WorkflowError> {
        let mut sent = 0;
        for board_id in self.store.retro_board_ids(&team.team_id).await? {
            if board_id.trim().is_empty() {
                continue;
            }
            match self.retro_check(team, &board_id).await {
                Ok(count) => sent += count,
                Err(error) => {
                    self.trap(&format!("retro board {board_id} could not be checked"), &error).await
                }
            }
        }
        Ok(sent)
    }

    /// Adds a card to the matching column of the current sprint's retro board.
    pub async fn add_retro_card(
        &self,
        team: &TeamConfig,
        kind: RetroKind,
        title: &str,
    ) -> Result<RetroCardOutcome, WorkflowError> {
        let sprint = match self.store.latest_sprint(&team.team_id).await? {
            Some(sprint) if !sprint.retro_board_id.is_empty() => sprint,
            _ => return Ok(RetroCardOutcome::NoRetroBoard),
        };
        let board =
            self.trello.board(&sprint.retro_board_id).await.map_err(WorkflowError::BoardRead)?;
        let lists = self.trello.board_lists(&board.id).await.map_err(WorkflowError::BoardRead)?;
        let list_name = kind.list_name();

        let Some(list) = lists.iter().find(|list| list.name == list_name) else {
            info!(
                event_name = "workflow.retro.missing_list",
                board = %board.id,
                list = list_name,
                "retro board is missing a column"
            );
            return Ok(RetroCardOutcome::MissingList { list_name, board });
        };
        self.trello.create_card(&list.id, title).await?;
        Ok(RetroCardOutcome::Created { title: title.to_string(), list_name, board })
    }
}

fn registered<'a>(users: &'a [UserRecord], trello: &str) -> Option<&'a UserRecord> {
    users
        .iter()
        .find(|user| !user.slack_id.is_empty() && user.trello.eq_ignore_ascii_case(trello))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{RetroCardOutcome, RetroKind};
    use crate::domain::board::{BoardList, Member};
    use crate::domain::records::{SprintRecord, UserRecord};
    use crate::team::fixtures;
    use crate::workflows::testing::{card, Harness, TrelloCall};

    fn sprint(retro_board_id: &str) -> SprintRecord {
        SprintRecord {
            team_id: "mcboard".into(),
            sprint_name: "MC 2026-03-02".into(),
            started_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("ts"),
            duration_days: 14,
            working_days: 10,
            retro_board_id: retro_board_id.into(),
        }
    }

    fn list(id: &str, name: &str) -> BoardList {
        BoardList { id: id.into(), name: name.into(), closed: false }
    }

    #[tokio::test]
    async fn idle_action_items_notify_registered_owners() {
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 9, 0, 0).single().expect("ts");
        let harness = Harness::new(now);
        let team = fixtures::team();
        harness.store.with(|state| {
            state.sprints.push(sprint("retro-1"));
            state.users.push(UserRecord {
                name: "Sam".into(),
                slack_id: "U7".into(),
                trello: "sam".into(),
                github: String::new(),
                email: String::new(),
            });
        });

        let mut idle = card("idle", "Fix flaky deploy", "retro-actions");
        idle.id_board = "retro-1".into();
        idle.id_members = vec!["m-sam".into(), "m-ghost".into()];
        idle.date_last_activity = Some(now - Duration::days(9));
        let mut busy = idle.clone();
        busy.id = "busy".into();
        busy.date_last_activity = Some(now - Duration::days(2));
        harness.trello.add_card(idle, None);
        harness.trello.add_card(busy, None);
        harness.trello.with(|board| {
            board.lists.insert(
                "retro-1".into(),
                vec![list("retro-well", "What Went Well"), list("retro-actions", "Action Items")],
            );
            for (id, username) in [("m-sam", "sam"), ("m-ghost", "ghost")] {
                board.members.insert(
                    id.into(),
                    Member { id: id.into(), username: username.into(), full_name: String::new() },
                );
            }
        });

        let sent = harness.workflows.check_action_cards(&team).await.expect("retro check");

        assert_eq!(sent, 1);
        let (to, notice) = harness.chat.directs().pop().expect("dm");
        assert_eq!(to, "U7");
        assert!(notice.text.contains("no activity in the past 7 days"));
        assert!(notice.text.ends_with("<https://trello.com/c/idle|Fix flaky deploy>"));
    }

    #[tokio::test]
    async fn retro_cards_land_on_the_matching_column() {
        let harness = Harness::new(Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).single().expect("ts"));
        let team = fixtures::team();

        let outcome = harness
            .workflows
            .add_retro_card(&team, RetroKind::Well, "pairing")
            .await
            .expect("no sprint");
        assert_eq!(outcome, RetroCardOutcome::NoRetroBoard);

        harness.store.with(|state| state.sprints.push(sprint("retro-1")));
        harness.trello.with(|board| {
            board.lists.insert("retro-1".into(), vec![list("retro-well", "What Went Well")]);
        });

        let outcome = harness
            .workflows
            .add_retro_card(&team, RetroKind::parse("good").expect("kind"), "pairing")
            .await
            .expect("created");
        assert!(outcome.reply().starts_with("I created your card `pairing` on list `What Went Well`"));
        assert!(harness
            .trello
            .calls()
            .contains(&TrelloCall::CreateCard { list: "retro-well".into(), name: "pairing".into() }));

        let outcome = harness
            .workflows
            .add_retro_card(&team, RetroKind::Vent, "coffee")
            .await
            .expect("missing list");
        assert!(matches!(outcome, RetroCardOutcome::MissingList { list_name: "Vent", .. }));
    }

    #[test]
    fn retro_kind_accepts_synonyms() {
        assert_eq!(RetroKind::parse("wrong"), Some(RetroKind::Improve));
        assert_eq!(RetroKind::parse("improvement"), Some(RetroKind::Improve));
        assert_eq!(RetroKind::parse("Vent"), Some(RetroKind::Vent));
        assert_eq!(RetroKind::parse("meh"), None);
    }
}
