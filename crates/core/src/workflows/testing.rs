//! In-memory fakes of every port for workflow tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};

use crate::domain::board::{
    Attachment, Board, BoardList, Card, CardAction, CustomFieldItem, FieldUpdate, FieldValue,
    Label, Member, PluginData, PullRequest,
};
use crate::domain::records::{
    BugLabel, BurndownEntry, CardTrackerRow, CategoryLabel, ChapterCardsEntry, Holiday,
    SprintRecord, SquadPointsEntry, ThemeCountEntry, UserRecord,
};
use crate::errors::{PortError, StoreError};
use crate::ports::{
    CategoryStore, ChatNotifier, Clock, GithubApi, HistoryStore, HolidayStore, Notice,
    SprintStore, TrelloApi, UserStore,
};
use crate::workflows::{WorkflowSettings, Workflows};

pub const PLUGIN: &str = "points-plugin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrelloCall {
    Move { card: String, list: String },
    Top { card: String },
    RemoveLabel { card: String, label: String },
    RemoveMember { card: String, member: String },
    Comment { card: String, text: String },
    SetField { card: String, field: String, value: FieldUpdate },
    Archive { card: String },
    CreateCard { list: String, name: String },
    CreateBoard { name: String },
    CreateList { board: String, name: String },
    Collection { board: String, collection: String },
    AddMember { board: String, username: String },
}

#[derive(Default)]
pub struct FakeBoard {
    pub cards: Vec<Card>,
    pub points: HashMap<String, u32>,
    pub actions: HashMap<String, Vec<CardAction>>,
    pub attachments: HashMap<String, Vec<Attachment>>,
    pub members: HashMap<String, Member>,
    pub labels: Vec<Label>,
    pub lists: HashMap<String, Vec<BoardList>>,
    pub calls: Vec<TrelloCall>,
    pub fail_reads: bool,
    next_id: u32,
}

#[derive(Default)]
pub struct FakeTrello {
    state: Mutex<FakeBoard>,
}

impl FakeTrello {
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeBoard) -> R) -> R {
        let mut state = self.state.lock().expect("fake trello lock");
        f(&mut state)
    }

    pub fn add_card(&self, card: Card, points: Option<u32>) {
        self.with(|board| {
            if let Some(points) = points {
                board.points.insert(card.id.clone(), points);
            }
            board.cards.push(card);
        });
    }

    pub fn calls(&self) -> Vec<TrelloCall> {
        self.with(|board| board.calls.clone())
    }

    pub fn card(&self, id: &str) -> Card {
        self.with(|board| board.cards.iter().find(|card| card.id == id).cloned())
            .expect("card exists")
    }

    fn read_guard(board: &FakeBoard) -> Result<(), PortError> {
        if board.fail_reads {
            Err(PortError::Status { service: "trello", status: 500, body: "boom".into() })
        } else {
            Ok(())
        }
    }

    fn mutate_card(&self, card_id: &str, call: TrelloCall, f: impl FnOnce(&mut Card)) {
        self.with(|board| {
            if let Some(card) = board.cards.iter_mut().find(|card| card.id == card_id) {
                f(card);
            }
            board.calls.push(call);
        });
    }
}

#[async_trait]
impl TrelloApi for FakeTrello {
    async fn board(&self, board_id: &str) -> Result<Board, PortError> {
        Ok(Board { id: board_id.into(), name: format!("Board {board_id}"), ..Board::default() })
    }

    async fn board_lists(&self, board_id: &str) -> Result<Vec<BoardList>, PortError> {
        self.with(|board| {
            Self::read_guard(board)?;
            Ok(board.lists.get(board_id).cloned().unwrap_or_default())
        })
    }

    async fn board_labels(&self, _board_id: &str) -> Result<Vec<Label>, PortError> {
        self.with(|board| {
            Self::read_guard(board)?;
            Ok(board.labels.clone())
        })
    }

    async fn board_cards(&self, board_id: &str) -> Result<Vec<Card>, PortError> {
        self.with(|board| {
            Self::read_guard(board)?;
            Ok(board
                .cards
                .iter()
                .filter(|card| card.id_board.is_empty() || card.id_board == board_id)
                .cloned()
                .collect())
        })
    }

    async fn list_cards(&self, list_id: &str) -> Result<Vec<Card>, PortError> {
        self.with(|board| {
            Self::read_guard(board)?;
            Ok(board
                .cards
                .iter()
                .filter(|card| card.id_list == list_id)
                .cloned()
                .collect())
        })
    }

    async fn card_plugin_data(&self, card_id: &str) -> Result<Vec<PluginData>, PortError> {
        self.with(|board| {
            Ok(board
                .points
                .get(card_id)
                .map(|points| {
                    vec![PluginData {
                        id_plugin: PLUGIN.into(),
                        value: format!("{{\"points\":{points}}}"),
                    }]
                })
                .unwrap_or_default())
        })
    }

    async fn card_actions(
        &self,
        card_id: &str,
        _filter: &str,
    ) -> Result<Vec<CardAction>, PortError> {
        self.with(|board| Ok(board.actions.get(card_id).cloned().unwrap_or_default()))
    }

    async fn card_attachments(&self, card_id: &str) -> Result<Vec<Attachment>, PortError> {
        self.with(|board| Ok(board.attachments.get(card_id).cloned().unwrap_or_default()))
    }

    async fn card_members(&self, card_id: &str) -> Result<Vec<Member>, PortError> {
        self.with(|board| {
            let ids = board
                .cards
                .iter()
                .find(|card| card.id == card_id)
                .map(|card| card.id_members.clone())
                .unwrap_or_default();
            Ok(ids.iter().filter_map(|id| board.members.get(id).cloned()).collect())
        })
    }

    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<(), PortError> {
        let call = TrelloCall::Move { card: card_id.into(), list: list_id.into() };
        self.mutate_card(card_id, call, |card| card.id_list = list_id.into());
        Ok(())
    }

    async fn move_card_to_top(&self, card_id: &str) -> Result<(), PortError> {
        self.mutate_card(card_id, TrelloCall::Top { card: card_id.into() }, |_| {});
        Ok(())
    }

    async fn remove_label(&self, card_id: &str, label_id: &str) -> Result<(), PortError> {
        let call = TrelloCall::RemoveLabel { card: card_id.into(), label: label_id.into() };
        self.mutate_card(card_id, call, |card| {
            card.id_labels.retain(|id| id != label_id);
            card.labels.retain(|label| label.id != label_id);
        });
        Ok(())
    }

    async fn remove_member(&self, card_id: &str, member_id: &str) -> Result<(), PortError> {
        let call = TrelloCall::RemoveMember { card: card_id.into(), member: member_id.into() };
        self.mutate_card(card_id, call, |card| card.id_members.retain(|id| id != member_id));
        Ok(())
    }

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), PortError> {
        let call = TrelloCall::Comment { card: card_id.into(), text: text.into() };
        self.mutate_card(card_id, call, |_| {});
        Ok(())
    }

    async fn set_custom_field(
        &self,
        card_id: &str,
        field_id: &str,
        value: FieldUpdate,
    ) -> Result<(), PortError> {
        let call = TrelloCall::SetField {
            card: card_id.into(),
            field: field_id.into(),
            value: value.clone(),
        };
        self.mutate_card(card_id, call, |card| {
            let new_value = match value {
                FieldUpdate::Text(text) => FieldValue { text: Some(text), number: None },
                FieldUpdate::Number(number) => FieldValue { text: None, number: Some(number) },
            };
            match card.custom_field_items.iter_mut().find(|item| item.id_custom_field == field_id)
            {
                Some(item) => item.value = Some(new_value),
                None => card.custom_field_items.push(CustomFieldItem {
                    id_custom_field: field_id.into(),
                    value: Some(new_value),
                }),
            }
        });
        Ok(())
    }

    async fn archive_card(&self, card_id: &str) -> Result<(), PortError> {
        self.mutate_card(card_id, TrelloCall::Archive { card: card_id.into() }, |card| {
            card.closed = true
        });
        Ok(())
    }

    async fn create_card(&self, list_id: &str, name: &str) -> Result<Card, PortError> {
        Ok(self.with(|board| {
            board.next_id += 1;
            let card = Card {
                id: format!("new-card-{}", board.next_id),
                name: name.into(),
                id_list: list_id.into(),
                short_url: format!("https://trello.com/c/new{}", board.next_id),
                ..Card::default()
            };
            board.calls.push(TrelloCall::CreateCard { list: list_id.into(), name: name.into() });
            board.cards.push(card.clone());
            card
        }))
    }

    async fn create_board(&self, name: &str, _org_id: &str) -> Result<Board, PortError> {
        Ok(self.with(|board| {
            board.next_id += 1;
            board.calls.push(TrelloCall::CreateBoard { name: name.into() });
            Board { id: format!("board-{}", board.next_id), name: name.into(), ..Board::default() }
        }))
    }

    async fn create_list(&self, board_id: &str, name: &str) -> Result<BoardList, PortError> {
        Ok(self.with(|board| {
            board.next_id += 1;
            board.calls.push(TrelloCall::CreateList { board: board_id.into(), name: name.into() });
            let list =
                BoardList { id: format!("list-{}", board.next_id), name: name.into(), closed: false };
            board.lists.entry(board_id.to_string()).or_default().push(list.clone());
            list
        }))
    }

    async fn add_board_to_collection(
        &self,
        board_id: &str,
        collection_id: &str,
    ) -> Result<(), PortError> {
        self.with(|board| {
            board.calls.push(TrelloCall::Collection {
                board: board_id.into(),
                collection: collection_id.into(),
            })
        });
        Ok(())
    }

    async fn add_board_member(&self, board_id: &str, username: &str) -> Result<(), PortError> {
        self.with(|board| {
            board.calls.push(TrelloCall::AddMember {
                board: board_id.into(),
                username: username.into(),
            })
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGithub {
    pulls: Mutex<HashMap<(String, u64), PullRequest>>,
}

impl FakeGithub {
    pub fn insert(&self, repo: &str, pull: PullRequest) {
        self.pulls.lock().expect("github lock").insert((repo.to_string(), pull.number), pull);
    }
}

#[async_trait]
impl GithubApi for FakeGithub {
    async fn pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, PortError> {
        self.pulls.lock().expect("github lock").get(&(repo.to_string(), number)).cloned().ok_or(
            PortError::Status { service: "github", status: 404, body: "Not Found".into() },
        )
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    posts: Mutex<Vec<Notice>>,
    directs: Mutex<Vec<(String, Notice)>>,
}

impl RecordingNotifier {
    pub fn posts(&self) -> Vec<Notice> {
        self.posts.lock().expect("notifier lock").clone()
    }

    pub fn directs(&self) -> Vec<(String, Notice)> {
        self.directs.lock().expect("notifier lock").clone()
    }

    pub fn posted_to(&self, channel: &str) -> Vec<Notice> {
        self.posts().into_iter().filter(|notice| notice.channel == channel).collect()
    }
}

#[async_trait]
impl ChatNotifier for RecordingNotifier {
    async fn post(&self, notice: &Notice) -> Result<(), PortError> {
        self.posts.lock().expect("notifier lock").push(notice.clone());
        Ok(())
    }

    async fn direct_message(&self, slack_user_id: &str, notice: &Notice) -> Result<(), PortError> {
        self.directs.lock().expect("notifier lock").push((slack_user_id.to_string(), notice.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryState {
    pub sprints: Vec<SprintRecord>,
    pub squads: Vec<CategoryLabel>,
    pub chapters: Vec<CategoryLabel>,
    pub ignored: Vec<(String, String)>,
    pub bugs: Vec<BugLabel>,
    pub users: Vec<UserRecord>,
    pub holidays: Vec<Holiday>,
    pub burndown: Vec<BurndownEntry>,
    pub squad_points: Vec<SquadPointsEntry>,
    pub theme_counts: Vec<ThemeCountEntry>,
    pub chapter_cards: Vec<ChapterCardsEntry>,
    pub tracker: Vec<CardTrackerRow>,
    pub archives: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().expect("memory store lock");
        f(&mut state)
    }
}

#[async_trait]
impl SprintStore for MemoryStore {
    async fn latest_sprint(&self, team_id: &str) -> Result<Option<SprintRecord>, StoreError> {
        Ok(self.with(|state| {
            state
                .sprints
                .iter()
                .filter(|sprint| sprint.team_id == team_id)
                .max_by_key(|sprint| sprint.started_at)
                .cloned()
        }))
    }

    async fn record_sprint(&self, sprint: &SprintRecord) -> Result<(), StoreError> {
        self.with(|state| state.sprints.push(sprint.clone()));
        Ok(())
    }

    async fn retro_board_ids(&self, team_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.with(|state| {
            state
                .sprints
                .iter()
                .filter(|sprint| sprint.team_id == team_id && !sprint.retro_board_id.is_empty())
                .map(|sprint| sprint.retro_board_id.clone())
                .collect()
        }))
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn squads(&self, board_id: &str) -> Result<Vec<CategoryLabel>, StoreError> {
        Ok(self.with(|state| {
            state.squads.iter().filter(|squad| squad.board_id == board_id).cloned().collect()
        }))
    }

    async fn chapters(&self, board_id: &str) -> Result<Vec<CategoryLabel>, StoreError> {
        Ok(self.with(|state| {
            state.chapters.iter().filter(|chapter| chapter.board_id == board_id).cloned().collect()
        }))
    }

    async fn ignored_labels(&self, board_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.with(|state| {
            state
                .ignored
                .iter()
                .filter(|(board, _)| board == board_id)
                .map(|(_, label)| label.clone())
                .collect()
        }))
    }

    async fn ignore_label(&self, board_id: &str, label_id: &str) -> Result<(), StoreError> {
        self.with(|state| state.ignored.push((board_id.into(), label_id.into())));
        Ok(())
    }

    async fn bug_labels(&self, board_id: &str) -> Result<Vec<BugLabel>, StoreError> {
        Ok(self.with(|state| {
            state.bugs.iter().filter(|bug| bug.board_id == board_id).cloned().collect()
        }))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn users(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(self.with(|state| state.users.clone()))
    }

    async fn user_by_slack_id(&self, slack_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.with(|state| state.users.iter().find(|user| user.slack_id == slack_id).cloned()))
    }

    async fn user_by_trello(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.with(|state| {
            state.users.iter().find(|user| user.trello.eq_ignore_ascii_case(username)).cloned()
        }))
    }

    async fn add_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.with(|state| state.users.push(user.clone()));
        Ok(())
    }
}

#[async_trait]
impl HolidayStore for MemoryStore {
    async fn holiday_on(&self, date: NaiveDate) -> Result<Option<Holiday>, StoreError> {
        Ok(self.with(|state| state.holidays.iter().find(|holiday| holiday.date == date).cloned()))
    }

    async fn holidays_in_year(&self, year: i32) -> Result<Vec<Holiday>, StoreError> {
        Ok(self.with(|state| {
            state.holidays.iter().filter(|holiday| holiday.date.year() == year).cloned().collect()
        }))
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn record_burndown(&self, entry: &BurndownEntry) -> Result<(), StoreError> {
        self.with(|state| state.burndown.push(entry.clone()));
        Ok(())
    }

    async fn record_squad_points(&self, entries: &[SquadPointsEntry]) -> Result<(), StoreError> {
        self.with(|state| state.squad_points.extend_from_slice(entries));
        Ok(())
    }

    async fn squad_points_for(
        &self,
        sprint_name: &str,
    ) -> Result<Vec<SquadPointsEntry>, StoreError> {
        Ok(self.with(|state| {
            state
                .squad_points
                .iter()
                .filter(|entry| entry.sprint_name.eq_ignore_ascii_case(sprint_name))
                .cloned()
                .collect()
        }))
    }

    async fn record_theme_counts(&self, entries: &[ThemeCountEntry]) -> Result<(), StoreError> {
        self.with(|state| state.theme_counts.extend_from_slice(entries));
        Ok(())
    }

    async fn record_chapter_cards(
        &self,
        entries: &[ChapterCardsEntry],
    ) -> Result<(), StoreError> {
        self.with(|state| state.chapter_cards.extend_from_slice(entries));
        Ok(())
    }

    async fn reset_card_tracker(&self) -> Result<(), StoreError> {
        self.with(|state| state.tracker.clear());
        Ok(())
    }

    async fn record_card_tracker(&self, rows: &[CardTrackerRow]) -> Result<(), StoreError> {
        self.with(|state| state.tracker.extend_from_slice(rows));
        Ok(())
    }

    async fn archive_card_tracker(&self, table_name: &str) -> Result<(), StoreError> {
        self.with(|state| state.archives.push(table_name.to_string()));
        Ok(())
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct Harness {
    pub trello: Arc<FakeTrello>,
    pub github: Arc<FakeGithub>,
    pub chat: Arc<RecordingNotifier>,
    pub store: Arc<MemoryStore>,
    pub workflows: Workflows,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        let trello = Arc::new(FakeTrello::default());
        let github = Arc::new(FakeGithub::default());
        let chat = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let settings = WorkflowSettings {
            bot_name: "TikTok".into(),
            bot_member_id: "bot-member".into(),
            points_plugin_id: PLUGIN.into(),
            trello_org_id: "org1".into(),
            table_prefix: "scrumbot".into(),
            log_channel: "bot-logs".into(),
            log_to_slack: false,
            logging_prefix: String::new(),
            local_offset: FixedOffset::east_opt(0).expect("utc offset"),
        };
        let workflows = Workflows::new(
            trello.clone(),
            github.clone(),
            chat.clone(),
            store.clone(),
            settings,
        )
        .with_clock(Arc::new(FixedClock(now)));
        Self { trello, github, chat, store, workflows }
    }
}

/// Card id whose creation-time prefix encodes `created`.
pub fn card_id(created: DateTime<Utc>, n: u32) -> String {
    format!("{:08x}{:016x}", created.timestamp(), n)
}

pub fn card(id: &str, name: &str, list: &str) -> Card {
    Card {
        id: id.into(),
        name: name.into(),
        id_list: list.into(),
        short_url: format!("https://trello.com/c/{id}"),
        ..Card::default()
    }
}

pub fn with_field(mut card: Card, field: &str, value: FieldValue) -> Card {
    card.custom_field_items
        .push(CustomFieldItem { id_custom_field: field.into(), value: Some(value) });
    card
}

pub fn text(value: &str) -> FieldValue {
    FieldValue { text: Some(value.into()), number: None }
}

pub fn number(value: &str) -> FieldValue {
    FieldValue { text: None, number: Some(value.into()) }
}
