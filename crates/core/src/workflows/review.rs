//! Review column checks: lagging PR cards, skipped reviews and the stand-up PR list.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::calendar::{is_stale, review_age_allowance};
use crate::domain::board::{entered_list_at, parse_pull_request_url, Card, CardAction};
use crate::errors::WorkflowError;
use crate::ports::Notice;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

const ALERT_COLOR: &str = "#ff0000";

/// Marker left on Done cards once a skipped review has been reported.
pub fn skipped_review_marker(bot_name: &str) -> String {
    format!("{bot_name} PR Message:")
}

enum PrState {
    /// No usable GitHub pull request attached, or GitHub could not be asked.
    Unknown,
    Merged(DateTime<Utc>),
    Open { updated_at: DateTime<Utc> },
}

impl Workflows {
    /// Reports Review cards older than `StaleTime` hours. Cards whose pull request was
    /// merged get an individual nudge; open pull requests only count when they are also
    /// stale on GitHub; cards without a pull request always count.
    pub async fn stale_pr_cards(&self, team: &TeamConfig) -> Result<String, WorkflowError> {
        let cards = self.read_list(&team.review_list).await?;
        let now = self.now();
        let allowance = review_age_allowance(
            self.today(),
            team.ignore_weekends,
            self.yesterday_was_holiday().await,
        );
        let mut lagging = String::new();

        for card in &cards {
            let Some(since) = self.review_entry_time(team, card).await else {
                continue;
            };
            if !is_stale(now, since, allowance, team.stale_hours) {
                debug!(event_name = "workflow.review.fresh", card = %card.id, "review card within threshold");
                continue;
            }

            match self.pull_request_state(card).await {
                PrState::Merged(merged_at) => self.nudge_merged(team, card, merged_at).await,
                PrState::Open { updated_at } => {
                    if is_stale(now, updated_at, allowance, team.stale_hours) {
                        lagging.push_str(&format!("{}\n", card.short_link()));
                    }
                }
                PrState::Unknown => lagging.push_str(&format!("{}\n", card.short_link())),
            }
        }

        if !lagging.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "<!here> WARNING!! Lagging PR Card(s)!!",
                ALERT_COLOR,
                format!("These are {} hours or older\n{lagging}", team.stale_hours),
            ))
            .await;
        }
        Ok(lagging)
    }

    async fn review_entry_time(&self, team: &TeamConfig, card: &Card) -> Option<DateTime<Utc>> {
        match self.trello.card_actions(&card.id, "updateCard:idList").await {
            Ok(actions) => entered_list_at(&actions, &team.review_list).or_else(|| card.created_at()),
            Err(error) => {
                self.trap(&format!("could not read history of {}", card.short_link()), &error).await;
                None
            }
        }
    }

    async fn pull_request_state(&self, card: &Card) -> PrState {
        let attachments = match self.trello.card_attachments(&card.id).await {
            Ok(attachments) => attachments,
            Err(error) => {
                self.trap(&format!("could not read attachments of {}", card.short_link()), &error)
                    .await;
                return PrState::Unknown;
            }
        };
        let Some((repo, number)) = attachments
            .iter()
            .filter(|attachment| !attachment.is_upload)
            .find_map(|attachment| parse_pull_request_url(&attachment.url))
        else {
            return PrState::Unknown;
        };

        match self.github.pull_request(&repo, number).await {
            Ok(pull) => match pull.merged_at {
                Some(merged_at) if pull.merged => PrState::Merged(merged_at),
                _ => PrState::Open { updated_at: pull.updated_at },
            },
            Err(error) => {
                self.trap(&format!("could not read pull request {repo}#{number}"), &error).await;
                PrState::Unknown
            }
        }
    }

    async fn nudge_merged(&self, team: &TeamConfig, card: &Card, merged_at: DateTime<Utc>) {
        let merged = merged_at.with_timezone(&self.settings.local_offset).format("%Y-%m-%d %H:%M:%S");
        let mut mentions = String::new();
        if let Ok(members) = self.trello.card_members(&card.id).await {
            for member in members {
                if let Ok(Some(user)) = self.store.user_by_trello(&member.username).await {
                    if !user.slack_id.is_empty() {
                        mentions.push_str(&format!("<@{}> ", user.slack_id));
                    }
                }
            }
        }
        let link = format!("<{}|{}>", if card.url.is_empty() { &card.short_url } else { &card.url }, card.name);
        let text = if mentions.is_empty() {
            format!(
                "*PLEASE NOTE* : The Github Pull Request for this card was merged on `{merged}`, does this card need to be closed in Trello? {link}\n"
            )
        } else {
            format!(
                "{mentions} The Github Pull Request for this card was merged on `{merged}`, does this card need to be closed in Trello? {link}\n"
            )
        };
        self.notify(Notice::text(&team.complaint_channel, text)).await;
    }

    /// Flags Done cards that arrived from any list other than Review. Each flagged card gets
    /// a marker comment so it is reported once; its first member is messaged directly when
    /// registered.
    pub async fn skipped_pr(&self, team: &TeamConfig) -> Result<String, WorkflowError> {
        let cards = self.read_list(&team.done_list).await?;
        let marker = skipped_review_marker(&self.settings.bot_name);
        let mut flagged = String::new();

        for card in &cards {
            let comments = match self.trello.card_actions(&card.id, "commentCard").await {
                Ok(comments) => comments,
                Err(error) => {
                    self.trap(&format!("could not read comments of {}", card.short_link()), &error)
                        .await;
                    continue;
                }
            };
            if comments.iter().any(|comment| self.is_marker(comment, &marker)) {
                continue;
            }

            let history = match self.trello.card_actions(&card.id, "updateCard:idList").await {
                Ok(history) => history,
                Err(error) => {
                    self.trap(&format!("could not read history of {}", card.short_link()), &error)
                        .await;
                    continue;
                }
            };
            let skipped = history
                .iter()
                .filter(|action| action.moved_into(&team.done_list))
                .max_by_key(|action| action.date)
                .is_some_and(|action| !action.moved_from(&team.review_list));
            if !skipped {
                continue;
            }

            flagged.push_str(&format!("{}\n", card.link()));
            let comment = match self.owner_slack_id(card).await {
                Some((slack_id, trello)) => {
                    let warning = format!(
                        "*Warning!* This card with your face on it, appears to have skipped the `Review` column, please resolve this by adding notes as to why this happened. Even spikes should be reviewed! Thank you!\n{}",
                        card.link()
                    );
                    self.direct(&slack_id, Notice::text(&slack_id, warning)).await;
                    format!(
                        "{marker} Sent warning to @{trello} that this card skipped the Review process and they should put an update in it with an explanation."
                    )
                }
                None => format!(
                    "{marker} Couldn't find a card owner on this card that has skipped the Review process so I sent a general alert to the {} slack channel about it.",
                    team.complaint_channel
                ),
            };
            if let Err(error) = self.trello.add_comment(&card.id, &comment).await {
                self.trap(&format!("could not leave the review marker on {}", card.id), &error).await;
            }
        }

        if !flagged.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "*Warning* The following cards appear to have skipped the review column in trello.  If you are an owner of one of these cards I will slack you directly about putting a note in it regarding why it skipped `Ready for Review`!\nPlease review these!",
                ALERT_COLOR,
                flagged.clone(),
            ))
            .await;
        }
        Ok(flagged)
    }

    fn is_marker(&self, comment: &CardAction, marker: &str) -> bool {
        let by_bot = self.settings.bot_member_id.is_empty()
            || comment.id_member_creator == self.settings.bot_member_id;
        by_bot && comment.data.text.as_deref().is_some_and(|text| text.contains(marker))
    }

    /// Slack id and Trello username of the card's first member, when registered.
    async fn owner_slack_id(&self, card: &Card) -> Option<(String, String)> {
        let first = card.id_members.first()?;
        let members = self.trello.card_members(&card.id).await.ok()?;
        let member = members.into_iter().find(|member| &member.id == first)?;
        let user = self.store.user_by_trello(&member.username).await.ok()??;
        if user.slack_id.is_empty() {
            return None;
        }
        Some((user.slack_id, member.username))
    }

    /// Posts the Review list as a stand-up reminder. Returns how many cards were listed.
    pub async fn pr_summary(&self, team: &TeamConfig) -> Result<usize, WorkflowError> {
        let cards = self.read_list(&team.review_list).await?;
        if cards.is_empty() {
            return Ok(0);
        }
        let listing: String = cards.iter().map(|card| format!("{}\n", card.link())).collect();
        self.notify(Notice::with_attachment(
            &team.complaint_channel,
            "Reminder, here are the current PR's for discussion at Stand-up today:\n",
            "#006400",
            listing,
        ))
        .await;
        Ok(cards.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use super::skipped_review_marker;
    use crate::domain::board::{
        ActionData, ActionList, Attachment, CardAction, Member, PullRequest,
    };
    use crate::domain::records::{Holiday, UserRecord};
    use crate::team::fixtures;
    use crate::workflows::testing::{card, Harness, TrelloCall};

    // a Wednesday, so no weekend allowance applies
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).single().expect("ts")
    }

    fn moved(from: &str, to: &str, hours_ago: i64) -> CardAction {
        CardAction {
            kind: "updateCard".into(),
            date: Some(now() - Duration::hours(hours_ago)),
            data: ActionData {
                list_before: Some(ActionList { id: from.into(), name: from.into() }),
                list_after: Some(ActionList { id: to.into(), name: to.into() }),
                ..ActionData::default()
            },
            ..CardAction::default()
        }
    }

    fn pr_link(number: u64) -> Attachment {
        Attachment {
            url: format!("https://github.com/acme/widgets/pull/{number}"),
            ..Attachment::default()
        }
    }

    #[tokio::test]
    async fn stale_card_without_attachments_is_always_reported() {
        let harness = Harness::new(now());
        let team = fixtures::team();
        harness.trello.add_card(card("bare", "No PR", "l-review"), None);
        harness.trello.add_card(card("fresh", "Fresh", "l-review"), None);
        harness.trello.with(|board| {
            board.actions.insert("bare".into(), vec![moved("l-working", "l-review", 30)]);
            board.actions.insert("fresh".into(), vec![moved("l-working", "l-review", 3)]);
        });

        let lagging = harness.workflows.stale_pr_cards(&team).await.expect("stale");

        assert_eq!(lagging, "<https://trello.com/c/bare|No PR>\n");
        let notice = harness.chat.posted_to("complaints").pop().expect("alert");
        assert_eq!(notice.text, "<!here> WARNING!! Lagging PR Card(s)!!");
        assert!(notice.attachment.expect("body").text.starts_with("These are 24 hours or older\n"));
    }

    #[tokio::test]
    async fn github_state_decides_for_attached_pull_requests() {
        let harness = Harness::new(now());
        let team = fixtures::team();
        for id in ["merged", "busy", "quiet"] {
            harness.trello.add_card(card(id, id, "l-review"), None);
        }
        harness.trello.with(|board| {
            for (id, number) in [("merged", 1), ("busy", 2), ("quiet", 3)] {
                board.actions.insert(id.into(), vec![moved("l-working", "l-review", 50)]);
                board.attachments.insert(id.into(), vec![pr_link(number)]);
            }
        });
        harness.github.insert(
            "widgets",
            PullRequest {
                number: 1,
                merged: true,
                merged_at: Some(now() - Duration::hours(5)),
                updated_at: now() - Duration::hours(5),
            },
        );
        harness.github.insert(
            "widgets",
            PullRequest { number: 2, merged: false, merged_at: None, updated_at: now() - Duration::hours(2) },
        );
        harness.github.insert(
            "widgets",
            PullRequest { number: 3, merged: false, merged_at: None, updated_at: now() - Duration::hours(40) },
        );

        let lagging = harness.workflows.stale_pr_cards(&team).await.expect("stale");

        assert_eq!(lagging, "<https://trello.com/c/quiet|quiet>\n");
        let posts = harness.chat.posted_to("complaints");
        assert!(posts.iter().any(|notice| notice.text.starts_with(
            "*PLEASE NOTE* : The Github Pull Request for this card was merged on `2026-06-10 07:00:00`"
        )));
    }

    #[tokio::test]
    async fn monday_allowance_keeps_weekend_cards_quiet() {
        let monday = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).single().expect("ts");
        let harness = Harness::new(monday);
        let team = fixtures::team();
        harness.trello.add_card(card("weekend", "Friday PR", "l-review"), None);
        harness.trello.with(|board| {
            let mut action = moved("l-working", "l-review", 0);
            action.date = Some(monday - Duration::hours(68));
            board.actions.insert("weekend".into(), vec![action]);
        });

        let lagging = harness.workflows.stale_pr_cards(&team).await.expect("stale");

        assert_eq!(lagging, "");
    }

    #[tokio::test]
    async fn partial_hours_past_the_threshold_count_as_stale() {
        let harness = Harness::new(now());
        let team = fixtures::team();
        harness.trello.add_card(card("late", "Late PR", "l-review"), None);
        harness.trello.with(|board| {
            let mut action = moved("l-working", "l-review", 0);
            action.date = Some(now() - Duration::minutes(24 * 60 + 50));
            board.actions.insert("late".into(), vec![action]);
        });

        let lagging = harness.workflows.stale_pr_cards(&team).await.expect("stale");

        assert_eq!(lagging, "<https://trello.com/c/late|Late PR>\n");
    }

    #[tokio::test]
    async fn yesterdays_holiday_is_discounted_even_without_holiday_support() {
        let harness = Harness::new(now());
        let mut team = fixtures::team();
        team.holiday_support = false;
        harness.store.with(|state| {
            state.holidays.push(Holiday {
                date: NaiveDate::from_ymd_opt(2026, 6, 9).expect("date"),
                name: "Founders Day".into(),
                message: "Office closed".into(),
            })
        });
        harness.trello.add_card(card("hol", "Holiday PR", "l-review"), None);
        harness.trello.with(|board| {
            board.actions.insert("hol".into(), vec![moved("l-working", "l-review", 30)]);
        });

        let lagging = harness.workflows.stale_pr_cards(&team).await.expect("stale");

        assert_eq!(lagging, "");
    }

    #[tokio::test]
    async fn skipped_review_is_reported_once_and_owner_messaged() {
        let harness = Harness::new(now());
        let team = fixtures::team();
        let mut skipped = card("skip", "Skipper", "l-done");
        skipped.id_members = vec!["m-pat".into()];
        harness.trello.add_card(skipped, None);
        harness.trello.add_card(card("proper", "Reviewed", "l-done"), None);
        harness.trello.with(|board| {
            board.members.insert(
                "m-pat".into(),
                Member { id: "m-pat".into(), username: "pat".into(), full_name: "Pat".into() },
            );
            board.actions.insert("skip".into(), vec![moved("l-working", "l-done", 4)]);
            board.actions.insert("proper".into(), vec![moved("l-review", "l-done", 4)]);
        });
        harness.store.with(|state| {
            state.users.push(UserRecord {
                name: "Pat".into(),
                slack_id: "U42".into(),
                trello: "pat".into(),
                github: String::new(),
                email: String::new(),
            })
        });

        let flagged = harness.workflows.skipped_pr(&team).await.expect("skipped");

        assert_eq!(flagged, "<https://trello.com/c/skip|Skipper>\n");
        assert_eq!(harness.chat.directs().len(), 1);
        assert_eq!(harness.chat.directs()[0].0, "U42");
        let marker = harness
            .trello
            .calls()
            .into_iter()
            .find_map(|call| match call {
                TrelloCall::Comment { card, text } if card == "skip" => Some(text),
                _ => None,
            })
            .expect("marker comment");
        assert!(marker.starts_with(&skipped_review_marker("TikTok")));

        // the fake does not turn comments into actions, so feed the marker back in
        harness.trello.with(|board| {
            board.actions.get_mut("skip").expect("history").push(CardAction {
                kind: "commentCard".into(),
                id_member_creator: "bot-member".into(),
                data: ActionData { text: Some(marker), ..ActionData::default() },
                ..CardAction::default()
            });
        });
        let again = harness.workflows.skipped_pr(&team).await.expect("second run");
        assert_eq!(again, "");
    }

    #[tokio::test]
    async fn pr_summary_lists_review_cards() {
        let harness = Harness::new(now());
        let team = fixtures::team();
        assert_eq!(harness.workflows.pr_summary(&team).await.expect("empty"), 0);

        harness.trello.add_card(card("r1", "Login", "l-review"), None);
        assert_eq!(harness.workflows.pr_summary(&team).await.expect("summary"), 1);
        let notice = harness.chat.posted_to("complaints").pop().expect("reminder");
        assert_eq!(notice.attachment.expect("body").text, "<https://trello.com/c/r1|Login>\n");
    }
}
