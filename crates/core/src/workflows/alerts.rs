//! Board trolling and ceremony reminders.

use rand::seq::SliceRandom;
use tracing::info;

use crate::domain::board::Card;
use crate::domain::records::Holiday;
use crate::errors::WorkflowError;
use crate::ports::Notice;
use crate::team::TeamConfig;
use crate::workflows::Workflows;

const ALERT_COLOR: &str = "#ff0000";

/// Ceremony a reminder is sent for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    Standup,
    Retro,
    Demo,
    Wdw,
    Sdlc,
}

impl AlertKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standup" => Some(Self::Standup),
            "retro" => Some(Self::Retro),
            "demo" => Some(Self::Demo),
            "wdw" => Some(Self::Wdw),
            "sdlc" => Some(Self::Sdlc),
            _ => None,
        }
    }

    pub fn meeting(self) -> &'static str {
        match self {
            Self::Standup => "Stand-Up",
            Self::Retro => "Retro",
            Self::Demo => "Demos",
            Self::Wdw => "WDW",
            Self::Sdlc => "White Fences & SDLC review",
        }
    }

    fn channel(self, team: &TeamConfig) -> &str {
        match self {
            Self::Standup => &team.standup_alert_channel,
            Self::Retro => &team.retro_alert_channel,
            Self::Demo => &team.demo_alert_channel,
            Self::Wdw | Self::Sdlc => &team.wdw_alert_channel,
        }
    }

    fn link(self, team: &TeamConfig) -> &str {
        match self {
            Self::Standup => &team.standup_link,
            Self::Retro => &team.retro_alert_link,
            Self::Demo => &team.demo_alert_link,
            Self::Wdw => &team.wdw_alert_link,
            Self::Sdlc => "",
        }
    }
}

pub fn greetings(meeting: &str) -> [String; 4] {
    [
        format!("Hey everybody its time for {meeting}"),
        format!("Oh ya its {meeting} time!"),
        format!("Tick tock, join us for {meeting}!"),
        format!("Hey there, its that time again! Let's do {meeting}"),
    ]
}

/// What one troll of the board found. Each field holds one link per line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrollReport {
    pub point_issues: String,
    pub members_removed: String,
    pub unassigned: String,
    pub missing_themes: String,
}

impl Workflows {
    /// Checks in-flight cards for point problems and misplaced owners, then looks for cards
    /// without theme labels.
    pub async fn alert_runner(&self, team: &TeamConfig) -> Result<TrollReport, WorkflowError> {
        info!(
            event_name = "workflow.alerts.troll",
            team = %team.team_id,
            max_points = team.max_points,
            "checking points, members and spikes"
        );
        let cards = self.read_board(team).await?;
        let mut report = TrollReport::default();

        let unassigned_lists = [team.next_sprint_list.as_str(), team.ready_for_work_list.as_str()];
        for card in cards.iter().filter(|card| {
            card.id_list == team.next_sprint_list
                || card.id_list == team.ready_for_work_list
                || card.id_list == team.working_list
        }) {
            if card.has_label(&team.silence_label) {
                continue;
            }

            let points = self.card_points(card).await;
            if points > team.max_points {
                report
                    .point_issues
                    .push_str(&format!("{} contains *{points}* points!\n", card.short_link()));
            }
            if points == 0 && !card.is_spike() {
                report.point_issues.push_str(&format!("{} contains *ZERO* points!\n", card.short_link()));
            }

            if unassigned_lists.contains(&card.id_list.as_str()) && !card.id_members.is_empty() {
                self.strip_members(card).await;
                report.members_removed.push_str(&format!("{}\n", card.short_link()));
            }
            if card.id_list == team.working_list && card.id_members.is_empty() {
                report.unassigned.push_str(&format!("{}\n", card.short_link()));
            }
        }

        if !report.members_removed.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "<!here> NOTICE!  I have *removed* people from these cards",
                ALERT_COLOR,
                format!("These cards should not be assigned yet!\n{}", report.members_removed),
            ))
            .await;
        }
        if !report.unassigned.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "<!here> Warning Un-Assigned Work!!",
                ALERT_COLOR,
                format!(
                    "I'm sad! These cards are in the working column but have nobody assigned to them!\n{}",
                    report.unassigned
                ),
            ))
            .await;
        }
        if !report.point_issues.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "<!here> Warning cards with Point issues!!",
                ALERT_COLOR,
                format!("These cards have too many or not enough points!\n{}", report.point_issues),
            ))
            .await;
        }

        for list in [&team.upcoming_list, &team.scoped_list, &team.ready_for_work_list] {
            match self.check_themes(team, list).await {
                Ok(lines) => report.missing_themes.push_str(&lines),
                Err(error) => self.trap("theme check failed during troll", &error).await,
            }
        }
        if !report.missing_themes.is_empty() {
            self.notify(Notice::with_attachment(
                &team.complaint_channel,
                "*WARNING*! The following cards do *not* have appropriate Theme Labels on them: ",
                ALERT_COLOR,
                report.missing_themes.clone(),
            ))
            .await;
        }
        Ok(report)
    }

    async fn strip_members(&self, card: &Card) {
        for member in &card.id_members {
            if let Err(error) = self.trello.remove_member(&card.id, member).await {
                self.trap(&format!("could not remove a member from {}", card.short_link()), &error)
                    .await;
            }
        }
    }

    /// Counts open critical bugs waiting in Backlog, Upcoming and Scoped and raises the alarm.
    pub async fn check_bugs(&self, team: &TeamConfig) -> Result<u32, WorkflowError> {
        let bugs = self.store.bug_labels(&team.board_id).await?;
        let critical: Vec<&str> = bugs
            .iter()
            .filter(|bug| bug.level.eq_ignore_ascii_case("critical"))
            .map(|bug| bug.label_id.as_str())
            .collect();
        if critical.is_empty() {
            return Ok(0);
        }

        let cards = self.read_board(team).await?;
        let waiting = [&team.backlog_list, &team.upcoming_list, &team.scoped_list];
        let mut listing = String::new();
        let mut count = 0_u32;
        for card in cards.iter().filter(|card| waiting.contains(&&card.id_list)) {
            if critical.iter().any(|label| card.has_label(label)) {
                listing.push_str(&format!("{}\n", card.link()));
                count += 1;
            }
        }

        match count {
            0 => info!(event_name = "workflow.alerts.no_critical_bugs", team = %team.team_id, "no critical bugs found"),
            1 => {
                self.notify(Notice::with_attachment(
                    &team.complaint_channel,
                    "<!here> *CRITICAL* Bug Opened!",
                    "#FF0000",
                    listing,
                ))
                .await
            }
            _ => {
                self.notify(Notice::with_attachment(
                    &team.complaint_channel,
                    format!("<!here> *CRITICAL* Bugs Opened!\n{count} new critical bugs.\n"),
                    "#FF0000",
                    listing,
                ))
                .await
            }
        }
        Ok(count)
    }

    /// Sends a ceremony reminder. Returns `false` when skipped for a holiday or a missing
    /// channel.
    pub async fn send_alert(&self, team: &TeamConfig, kind: AlertKind) -> bool {
        if let Some(holiday) = self.holiday_today(team).await {
            info!(
                event_name = "workflow.alerts.skipped_holiday",
                team = %team.team_id,
                meeting = kind.meeting(),
                holiday = %holiday.name,
                "today is a holiday, skipping reminder"
            );
            return false;
        }
        let channel = kind.channel(team);
        if channel.is_empty() {
            info!(
                event_name = "workflow.alerts.no_channel",
                team = %team.team_id,
                meeting = kind.meeting(),
                "no alert channel configured"
            );
            return false;
        }

        let options = greetings(kind.meeting());
        let greeting = options.choose(&mut rand::thread_rng()).map(String::as_str).unwrap_or_default();
        self.notify(Notice::text(channel, format!("<!here> {greeting} - {}", kind.link(team)))).await;
        true
    }

    /// Lets the team know the bot is off for today's holiday.
    pub async fn holiday_troll(&self, team: &TeamConfig) -> Option<Holiday> {
        let holiday = self.holiday_today(team).await?;
        let text = if holiday.name.eq_ignore_ascii_case("saas off-site") {
            format!(
                "I'm at the SaaS Off-Site today so I'm not doing my regular routine. {}",
                holiday.message
            )
        } else {
            format!("I'm not working today, it's a company Holiday! {}", holiday.message)
        };
        self.notify(Notice::text(&team.complaint_channel, text)).await;
        Some(holiday)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{greetings, AlertKind};
    use crate::domain::board::Label;
    use crate::domain::records::{BugLabel, Holiday};
    use crate::team::fixtures;
    use crate::workflows::testing::{card, Harness, TrelloCall};

    fn harness() -> Harness {
        Harness::new(Utc.with_ymd_and_hms(2026, 3, 4, 15, 0, 0).single().expect("ts"))
    }

    fn themed(id: &str, name: &str, list: &str) -> crate::domain::board::Card {
        let mut card = card(id, name, list);
        card.labels.push(Label { id: "theme-1".into(), name: "Platform".into(), color: None });
        card
    }

    #[tokio::test]
    async fn troll_reports_points_and_owners() {
        let harness = harness();
        let team = fixtures::team();
        harness.trello.add_card(themed("big", "Huge", "l-working"), Some(13));
        harness.trello.add_card(themed("zero", "Nothing", "l-rfw"), Some(0));
        harness.trello.add_card(themed("spike", "Look {Spike}", "l-next"), Some(0));
        let mut owned = themed("owned", "Claimed early", "l-next");
        owned.id_members = vec!["m1".into()];
        harness.trello.add_card(owned, Some(3));
        let mut hushed = themed("hush", "Quiet", "l-working");
        hushed.id_labels = vec!["lbl-silence".into()];
        harness.trello.add_card(hushed, Some(40));

        let report = harness.workflows.alert_runner(&team).await.expect("troll");

        assert_eq!(
            report.point_issues,
            "<https://trello.com/c/big|Huge> contains *13* points!\n\
             <https://trello.com/c/zero|Nothing> contains *ZERO* points!\n"
        );
        assert_eq!(report.members_removed, "<https://trello.com/c/owned|Claimed early>\n");
        assert_eq!(report.unassigned, "<https://trello.com/c/big|Huge>\n");
        assert!(harness
            .trello
            .calls()
            .contains(&TrelloCall::RemoveMember { card: "owned".into(), member: "m1".into() }));
        assert_eq!(harness.chat.posted_to("complaints").len(), 3);
    }

    #[tokio::test]
    async fn critical_bugs_count_only_waiting_lists() {
        let harness = harness();
        let team = fixtures::team();
        harness.store.with(|state| {
            state.bugs.push(BugLabel {
                board_id: "board1".into(),
                label_id: "bug-crit".into(),
                level: "Critical".into(),
            })
        });
        for (id, list) in [("b1", "l-backlog"), ("b2", "l-scoped"), ("b3", "l-working")] {
            let mut bug = card(id, "Broken", list);
            bug.id_labels = vec!["bug-crit".into()];
            harness.trello.add_card(bug, None);
        }

        assert_eq!(harness.workflows.check_bugs(&team).await.expect("bugs"), 2);
        let notice = harness.chat.posted_to("complaints").pop().expect("alarm");
        assert_eq!(notice.text, "<!here> *CRITICAL* Bugs Opened!\n2 new critical bugs.\n");
    }

    #[tokio::test]
    async fn reminders_respect_holidays_and_channels() {
        let harness = harness();
        let mut team = fixtures::team();

        assert!(harness.workflows.send_alert(&team, AlertKind::Standup).await);
        let notice = harness.chat.posted_to("standup").pop().expect("reminder");
        assert!(notice.text.starts_with("<!here> "));
        assert!(greetings("Stand-Up").iter().any(|greeting| notice.text.contains(greeting.as_str())));

        assert!(!harness.workflows.send_alert(&team, AlertKind::Demo).await);

        harness.store.with(|state| {
            state.holidays.push(Holiday {
                date: NaiveDate::from_ymd_opt(2026, 3, 4).expect("date"),
                name: "SaaS Off-Site".into(),
                message: "See you tomorrow.".into(),
            })
        });
        assert!(!harness.workflows.send_alert(&team, AlertKind::Standup).await);
        let holiday = harness.workflows.holiday_troll(&team).await.expect("holiday");
        assert_eq!(holiday.name, "SaaS Off-Site");
        let notice = harness.chat.posted_to("complaints").pop().expect("holiday notice");
        assert!(notice.text.starts_with("I'm at the SaaS Off-Site today"));

        team.holiday_support = false;
        assert!(harness.workflows.holiday_troll(&team).await.is_none());
    }

    #[test]
    fn alert_kinds_parse_case_insensitively() {
        assert_eq!(AlertKind::parse("WDW"), Some(AlertKind::Wdw));
        assert_eq!(AlertKind::parse("sdlc").map(AlertKind::meeting), Some("White Fences & SDLC review"));
        assert_eq!(AlertKind::parse("lunch"), None);
    }
}
