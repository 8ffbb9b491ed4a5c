//! The state of one room, with no I/O.
//!
//! [`Lobby`] owns membership, the host, the round state machine, and live
//! progress. Every mutating method returns the events to deliver as
//! `(Recipient, ServerEvent)` pairs; the room actor does the delivering.
//! Time comes in as arguments, so everything here is deterministic.

use std::time::Duration;

use keyrace_protocol::{
    FinishReason, GameMode, LobbySummary, PlayerId, PlayerSnapshot, ProgressUpdate, Profile,
    Recipient, RoomCode, RoomSnapshot, RoomStatus, RoundResult, RoundStart, ServerEvent,
};
use rand::RngCore;
use rand::seq::IndexedRandom;

use crate::content::{ContentProvider, FALLBACK_TEXT};
use crate::ranking::{RaceEntry, rank};
use crate::round::{RoundPlan, select_round};
use crate::{RoomError, RoomSettings};

/// Events produced by one state change, in delivery order.
pub type Outbox = Vec<(Recipient, ServerEvent)>;

#[derive(Debug, Clone)]
struct Member {
    id: PlayerId,
    profile: Profile,
    ready: bool,
    connected: bool,
    progress: f64,
    wpm: f64,
    completed_in: Option<Duration>,
    rank: Option<u32>,
}

impl Member {
    fn new(id: PlayerId, profile: Profile, ready: bool) -> Self {
        Self {
            id,
            profile,
            ready,
            connected: true,
            progress: 0.0,
            wpm: 0.0,
            completed_in: None,
            rank: None,
        }
    }

    fn reset_race(&mut self) {
        self.progress = 0.0;
        self.wpm = 0.0;
        self.completed_in = None;
        self.rank = None;
    }
}

#[derive(Debug, Clone)]
struct CurrentRound {
    plan: RoundPlan,
    text: String,
    start_timestamp: u64,
}

/// Result of removing a member.
#[derive(Debug)]
pub struct Removal {
    pub outbox: Outbox,
    /// The room has no members left and should be torn down.
    pub emptied: bool,
}

/// One room's complete state.
#[derive(Debug)]
pub struct Lobby {
    code: RoomCode,
    settings: RoomSettings,
    host: PlayerId,
    status: RoomStatus,
    round: u32,
    /// Join order.
    members: Vec<Member>,
    current: Option<CurrentRound>,
    /// Every passage this room has raced, oldest first.
    shown: Vec<String>,
}

impl Lobby {
    /// Creates a room with `host` as its only (ready) member.
    pub fn new(code: RoomCode, settings: RoomSettings, host: PlayerId, profile: Profile) -> Self {
        Self {
            code,
            settings,
            host,
            status: RoomStatus::Waiting,
            round: 1,
            members: vec![Member::new(host, profile, true)],
            current: None,
            shown: Vec::new(),
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn host(&self) -> PlayerId {
        self.host
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.iter().any(|m| m.id == player)
    }

    /// Members whose connection is live, in join order.
    pub fn connected_players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.members.iter().filter(|m| m.connected).map(|m| m.id)
    }

    /// Whether a round is being raced.
    pub fn round_active(&self) -> bool {
        self.status == RoomStatus::InProgress
    }

    /// Passages shown so far.
    pub fn shown(&self) -> &[String] {
        &self.shown
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.code.clone(),
            host_id: self.host,
            mode: self.settings.mode,
            max_players: self.settings.max_players,
            has_password: self.settings.has_password(),
            status: self.status,
            round: self.round,
            target_text: self.current.as_ref().map(|c| c.text.clone()),
            time_limit: self.current.as_ref().map(|c| c.plan.time_limit.as_secs()),
            start_timestamp: self.current.as_ref().map(|c| c.start_timestamp),
            players: self
                .members
                .iter()
                .map(|m| PlayerSnapshot {
                    connection_id: m.id,
                    username: m.profile.username.clone(),
                    avatar: m.profile.avatar.clone(),
                    theme: m.profile.theme.clone(),
                    is_host: m.id == self.host,
                    is_ready: m.ready,
                    connected: m.connected,
                    progress: m.progress,
                    wpm: m.wpm,
                    rank: m.rank,
                })
                .collect(),
        }
    }

    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            room_id: self.code.clone(),
            mode: self.settings.mode,
            players: self.members.len() as u32,
            max_players: self.settings.max_players,
            has_password: self.settings.has_password(),
        }
    }

    /// Whether the lobby browser should offer this room.
    pub fn is_open(&self) -> bool {
        self.status.is_joinable() && (self.members.len() as u32) < self.settings.max_players
    }

    // -- Membership ---------------------------------------------------------

    /// Adds a player.
    ///
    /// Checks, in order: the room is waiting, the password matches, there
    /// is a free slot, the player is not already a member.
    pub fn join(
        &mut self,
        player: PlayerId,
        profile: Profile,
        password: Option<&str>,
    ) -> Result<Outbox, RoomError> {
        if !self.status.is_joinable() {
            return Err(RoomError::NotJoinable(self.code.clone()));
        }
        if !self.settings.admits(password) {
            return Err(RoomError::WrongPassword(self.code.clone()));
        }
        if self.members.len() as u32 >= self.settings.max_players {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        if self.is_member(player) {
            return Err(RoomError::AlreadyInRoom(player, self.code.clone()));
        }

        self.members.push(Member::new(player, profile, false));
        tracing::info!(room_id = %self.code, %player, players = self.members.len(), "player joined");

        let snapshot = self.snapshot();
        Ok(vec![
            (Recipient::All, ServerEvent::PlayerJoined(snapshot.clone())),
            (Recipient::Player(player), ServerEvent::JoinedSuccess(snapshot)),
        ])
    }

    /// Removes a player for good (leave, disconnect without grace, or an
    /// expired grace period).
    ///
    /// Hands the host role to the earliest-joined remaining member if the
    /// host left, and settles a running round if the departure decides it.
    pub fn remove(&mut self, player: PlayerId) -> Result<Removal, RoomError> {
        let index = self
            .members
            .iter()
            .position(|m| m.id == player)
            .ok_or_else(|| RoomError::NotInRoom(player, self.code.clone()))?;
        self.members.remove(index);
        tracing::info!(room_id = %self.code, %player, players = self.members.len(), "player left");

        if self.members.is_empty() {
            self.current = None;
            return Ok(Removal {
                outbox: Vec::new(),
                emptied: true,
            });
        }

        self.promote_if_host(player);
        let mut outbox = vec![(Recipient::All, ServerEvent::PlayerJoined(self.snapshot()))];
        outbox.extend(self.settle_round());
        Ok(Removal {
            outbox,
            emptied: false,
        })
    }

    /// Marks a member as dropped while their slot is held.
    pub fn mark_disconnected(&mut self, player: PlayerId) -> Result<Outbox, RoomError> {
        let member = self.member_mut(player)?;
        member.connected = false;
        tracing::info!(room_id = %self.code, %player, "player slot held for reconnect");

        let mut outbox = vec![(Recipient::All, ServerEvent::PlayerJoined(self.snapshot()))];
        outbox.extend(self.settle_round());
        Ok(outbox)
    }

    /// Brings a held member back.
    pub fn mark_reconnected(&mut self, player: PlayerId) -> Result<Outbox, RoomError> {
        self.member_mut(player)?.connected = true;
        tracing::info!(room_id = %self.code, %player, "player reconnected");

        let snapshot = self.snapshot();
        Ok(vec![
            (Recipient::Player(player), ServerEvent::SessionResumed(snapshot.clone())),
            (Recipient::All, ServerEvent::PlayerJoined(snapshot)),
        ])
    }

    pub fn set_ready(&mut self, player: PlayerId, ready: bool) -> Result<Outbox, RoomError> {
        self.member_mut(player)?.ready = ready;
        Ok(vec![(Recipient::All, ServerEvent::RoomUpdated(self.snapshot()))])
    }

    // -- Rounds -------------------------------------------------------------

    /// Starts the next round on the host's request.
    ///
    /// Picks the plan and passage, moves through `starting` into
    /// `in_progress`, and returns the `game_starting` broadcast along
    /// with the plan so the caller can arm the round timer.
    pub fn start(
        &mut self,
        by: PlayerId,
        rng: &mut dyn RngCore,
        content: &dyn ContentProvider,
        unix_ms: u64,
    ) -> Result<(Outbox, RoundPlan), RoomError> {
        if by != self.host {
            return Err(RoomError::NotHost(self.code.clone()));
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::RoundInProgress(self.code.clone()));
        }
        if (self.connected_players().count() as u32) < RoomSettings::MIN_PLAYERS {
            return Err(RoomError::NotEnoughPlayers(
                self.code.clone(),
                RoomSettings::MIN_PLAYERS,
            ));
        }

        self.transition(RoomStatus::Starting);
        let plan = select_round(self.settings.mode, self.round, rng);
        let text = self.choose_text(plan, rng, content);
        self.shown.push(text.clone());
        for member in &mut self.members {
            member.reset_race();
        }
        self.current = Some(CurrentRound {
            plan,
            text: text.clone(),
            start_timestamp: unix_ms,
        });
        self.transition(RoomStatus::InProgress);

        tracing::info!(
            room_id = %self.code,
            round = self.round,
            difficulty = %plan.difficulty,
            time_limit_s = plan.time_limit.as_secs(),
            "round started"
        );

        let start = RoundStart {
            round: self.round,
            difficulty: plan.difficulty,
            text,
            time: plan.time_limit.as_secs(),
            start_timestamp: unix_ms,
        };
        Ok((vec![(Recipient::All, ServerEvent::GameStarting(start))], plan))
    }

    /// Records a progress report `elapsed` into the round.
    ///
    /// Reports outside a running round, and reports lower than the
    /// player's last accepted value, are dropped without error. Accepted
    /// values are relayed to everyone else; if this report completes the
    /// field, the round finishes right away.
    pub fn record_progress(
        &mut self,
        player: PlayerId,
        progress: f64,
        wpm: f64,
        elapsed: Duration,
    ) -> Result<Outbox, RoomError> {
        if !progress.is_finite() || !(0.0..=100.0).contains(&progress) {
            return Err(RoomError::InvalidProgress(format!(
                "progress must be between 0 and 100, got {progress}"
            )));
        }
        if !wpm.is_finite() || wpm < 0.0 {
            return Err(RoomError::InvalidProgress(format!(
                "wpm must be a non-negative number, got {wpm}"
            )));
        }

        let code = self.code.clone();
        let round_active = self.round_active();
        let member = self.member_mut(player)?;
        if !round_active {
            tracing::trace!(room_id = %code, %player, "progress outside a round, dropped");
            return Ok(Vec::new());
        }
        if progress < member.progress {
            tracing::debug!(room_id = %code, %player, progress, last = member.progress, "regressive progress, dropped");
            return Ok(Vec::new());
        }

        member.progress = progress;
        member.wpm = wpm;
        if progress >= 100.0 && member.completed_in.is_none() {
            member.completed_in = Some(elapsed);
            tracing::info!(room_id = %code, %player, elapsed_ms = elapsed.as_millis() as u64, "player completed passage");
        }

        let mut outbox = vec![(
            Recipient::AllExcept(player),
            ServerEvent::OpponentProgress(ProgressUpdate {
                connection_id: player,
                progress,
                wpm,
            }),
        )];
        outbox.extend(self.settle_round());
        Ok(outbox)
    }

    /// Ends the running round: ranks, broadcasts results, and returns the
    /// room to `waiting`. Does nothing when no round is running.
    pub fn finish(&mut self, reason: FinishReason) -> Outbox {
        if !self.round_active() {
            return Vec::new();
        }
        self.transition(RoomStatus::Finished);

        let entries: Vec<RaceEntry> = self
            .members
            .iter()
            .enumerate()
            .map(|(join_order, m)| RaceEntry {
                player: m.id,
                username: m.profile.username.clone(),
                progress: m.progress,
                wpm: m.wpm,
                completion: m.completed_in,
                join_order,
            })
            .collect();
        let standings = rank(&entries);
        for standing in &standings {
            if let Some(member) = self.members.iter_mut().find(|m| m.id == standing.connection_id) {
                member.rank = Some(standing.rank);
            }
        }

        let result = RoundResult {
            round: self.round,
            reason,
            standings,
        };
        tracing::info!(room_id = %self.code, round = self.round, ?reason, "round finished");

        if self.settings.mode == GameMode::Tier {
            self.round += 1;
        }
        self.current = None;
        self.transition(RoomStatus::Waiting);

        vec![
            (Recipient::All, ServerEvent::RoundFinished(result)),
            (Recipient::All, ServerEvent::RoomUpdated(self.snapshot())),
        ]
    }

    /// Drops the running round without results.
    ///
    /// The room still passes through `finished`, but no standings are
    /// sent and the round number does not advance.
    pub fn abandon_round(&mut self) -> Outbox {
        if !self.round_active() {
            return Vec::new();
        }
        tracing::info!(room_id = %self.code, round = self.round, "round abandoned");
        self.transition(RoomStatus::Finished);
        self.current = None;
        for member in &mut self.members {
            member.reset_race();
        }
        self.transition(RoomStatus::Waiting);
        vec![(Recipient::All, ServerEvent::RoomUpdated(self.snapshot()))]
    }

    // -- Internals ----------------------------------------------------------

    /// Finishes or abandons the round if membership changes decided it.
    fn settle_round(&mut self) -> Outbox {
        if !self.round_active() {
            return Vec::new();
        }
        if !self.members.iter().any(|m| m.connected) {
            return self.abandon_round();
        }
        let all_done = self
            .members
            .iter()
            .filter(|m| m.connected)
            .all(|m| m.completed_in.is_some());
        if all_done {
            return self.finish(FinishReason::AllCompleted);
        }
        Vec::new()
    }

    fn promote_if_host(&mut self, departed: PlayerId) {
        if departed != self.host {
            return;
        }
        // `members` is non-empty here.
        if let Some(next) = self.members.first_mut() {
            next.ready = true;
            self.host = next.id;
            tracing::info!(room_id = %self.code, new_host = %self.host, "host reassigned");
        }
    }

    fn choose_text(
        &self,
        plan: RoundPlan,
        rng: &mut dyn RngCore,
        content: &dyn ContentProvider,
    ) -> String {
        if let Some(text) = content.passage(plan.difficulty, &self.shown, rng) {
            return text;
        }
        if let Some(text) = self.shown.choose(rng) {
            tracing::debug!(room_id = %self.code, "content exhausted, reusing a shown passage");
            return text.clone();
        }
        tracing::warn!(room_id = %self.code, difficulty = %plan.difficulty, "no content available, using fallback passage");
        FALLBACK_TEXT.to_owned()
    }

    fn transition(&mut self, to: RoomStatus) {
        debug_assert!(
            self.status.can_transition_to(to),
            "illegal room transition {} -> {}",
            self.status,
            to
        );
        tracing::debug!(room_id = %self.code, from = %self.status, %to, "room status changed");
        self.status = to;
    }

    fn member_mut(&mut self, player: PlayerId) -> Result<&mut Member, RoomError> {
        self.members
            .iter_mut()
            .find(|m| m.id == player)
            .ok_or_else(|| RoomError::NotInRoom(player, self.code.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ParagraphBank;
    use keyrace_protocol::Difficulty;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    // -- Helpers ------------------------------------------------------------

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn profile(name: &str) -> Profile {
        Profile {
            username: name.into(),
            avatar: "a".into(),
            theme: "t".into(),
        }
    }

    fn lobby(mode: &str, max: u32, password: Option<&str>) -> Lobby {
        Lobby::new(
            RoomCode::new("TEST01"),
            RoomSettings::new(mode, max, password.map(String::from)).unwrap(),
            pid(1),
            profile("host"),
        )
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(99)
    }

    /// A lobby with players 1..=n, ready to start.
    fn filled(mode: &str, n: u64) -> Lobby {
        let mut lobby = lobby(mode, 4, None);
        for id in 2..=n {
            lobby.join(pid(id), profile(&format!("p{id}")), None).unwrap();
        }
        lobby
    }

    fn started(mode: &str, n: u64) -> Lobby {
        let mut lobby = filled(mode, n);
        lobby
            .start(pid(1), &mut rng(), &ParagraphBank::default(), 1_000)
            .unwrap();
        lobby
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn host_count(lobby: &Lobby) -> usize {
        lobby.snapshot().players.iter().filter(|p| p.is_host).count()
    }

    // =====================================================================
    // new / snapshot
    // =====================================================================

    #[test]
    fn test_new_host_is_ready_and_only_member() {
        let lobby = lobby("random", 2, None);
        let snapshot = lobby.snapshot();
        assert_eq!(snapshot.players.len(), 1);
        assert!(snapshot.players[0].is_host);
        assert!(snapshot.players[0].is_ready);
        assert_eq!(snapshot.status, RoomStatus::Waiting);
        assert_eq!(snapshot.round, 1);
        assert_eq!(snapshot.target_text, None);
    }

    #[test]
    fn test_snapshot_hides_password() {
        let snapshot = lobby("random", 2, Some("pw")).snapshot();
        assert!(snapshot.has_password);
        assert!(!format!("{snapshot:?}").contains("\"pw\""));
    }

    // =====================================================================
    // join
    // =====================================================================

    #[test]
    fn test_join_broadcasts_then_confirms_to_joiner() {
        let mut lobby = lobby("random", 2, None);
        let outbox = lobby.join(pid(2), profile("bo"), None).unwrap();

        assert_eq!(outbox.len(), 2);
        assert!(matches!(&outbox[0], (Recipient::All, ServerEvent::PlayerJoined(s)) if s.players.len() == 2));
        assert!(matches!(&outbox[1], (Recipient::Player(p), ServerEvent::JoinedSuccess(_)) if *p == pid(2)));
        assert!(!lobby.snapshot().players[1].is_ready);
    }

    #[test]
    fn test_join_third_player_into_two_seat_room_is_full() {
        let mut lobby = lobby("random", 2, None);
        lobby.join(pid(2), profile("bo"), None).unwrap();

        let result = lobby.join(pid(3), profile("cy"), None);
        assert!(matches!(result, Err(RoomError::RoomFull(_))));
        assert_eq!(lobby.len(), 2);
    }

    #[test]
    fn test_join_wrong_password() {
        let mut lobby = lobby("random", 4, Some("secret"));
        assert!(matches!(
            lobby.join(pid(2), profile("bo"), Some("guess")),
            Err(RoomError::WrongPassword(_))
        ));
        assert!(lobby.join(pid(2), profile("bo"), Some("secret")).is_ok());
    }

    #[test]
    fn test_join_checks_status_before_password_and_capacity() {
        let mut lobby = started("random", 2);
        let result = lobby.join(pid(9), profile("late"), Some("whatever"));
        assert!(matches!(result, Err(RoomError::NotJoinable(_))));
    }

    #[test]
    fn test_join_checks_password_before_capacity() {
        let mut lobby = lobby("random", 2, Some("pw"));
        lobby.join(pid(2), profile("bo"), Some("pw")).unwrap();
        let result = lobby.join(pid(3), profile("cy"), Some("nope"));
        assert!(matches!(result, Err(RoomError::WrongPassword(_))));
    }

    #[test]
    fn test_join_twice_is_already_in_room() {
        let mut lobby = lobby("random", 4, None);
        lobby.join(pid(2), profile("bo"), None).unwrap();
        assert!(matches!(
            lobby.join(pid(2), profile("bo"), None),
            Err(RoomError::AlreadyInRoom(..))
        ));
    }

    // =====================================================================
    // remove / host promotion
    // =====================================================================

    #[test]
    fn test_remove_host_promotes_next_joined() {
        let mut lobby = filled("random", 3);
        let removal = lobby.remove(pid(1)).unwrap();

        assert!(!removal.emptied);
        assert_eq!(lobby.host(), pid(2));
        assert_eq!(host_count(&lobby), 1);
        assert_eq!(lobby.status(), RoomStatus::Waiting);
        assert!(matches!(&removal.outbox[0], (Recipient::All, ServerEvent::PlayerJoined(s)) if s.host_id == pid(2)));
    }

    #[test]
    fn test_remove_non_host_keeps_host() {
        let mut lobby = filled("random", 3);
        lobby.remove(pid(2)).unwrap();
        assert_eq!(lobby.host(), pid(1));
        assert_eq!(host_count(&lobby), 1);
    }

    #[test]
    fn test_remove_last_member_empties() {
        let mut lobby = lobby("random", 2, None);
        let removal = lobby.remove(pid(1)).unwrap();
        assert!(removal.emptied);
        assert!(removal.outbox.is_empty());
        assert!(lobby.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_not_in_room() {
        let mut lobby = lobby("random", 2, None);
        assert!(matches!(lobby.remove(pid(5)), Err(RoomError::NotInRoom(..))));
    }

    #[test]
    fn test_exactly_one_host_through_churn() {
        let mut lobby = lobby("random", 4, None);
        for id in 2..=4 {
            lobby.join(pid(id), profile("x"), None).unwrap();
            assert_eq!(host_count(&lobby), 1);
        }
        for id in 1..=3 {
            lobby.remove(pid(id)).unwrap();
            assert_eq!(host_count(&lobby), 1);
        }
        assert_eq!(lobby.host(), pid(4));
    }

    #[test]
    fn test_remove_mid_round_leaving_only_finishers_finishes_round() {
        let mut lobby = started("random", 3);
        lobby.record_progress(pid(1), 100.0, 80.0, secs(20)).unwrap();
        lobby.record_progress(pid(2), 100.0, 70.0, secs(25)).unwrap();
        assert!(lobby.round_active());

        let removal = lobby.remove(pid(3)).unwrap();

        assert!(!lobby.round_active());
        assert!(removal.outbox.iter().any(|(_, e)| matches!(e, ServerEvent::RoundFinished(_))));
    }

    // =====================================================================
    // start
    // =====================================================================

    #[test]
    fn test_start_by_non_host_is_rejected() {
        let mut lobby = filled("random", 2);
        let result = lobby.start(pid(2), &mut rng(), &ParagraphBank::default(), 0);
        assert!(matches!(result, Err(RoomError::NotHost(_))));
        assert_eq!(lobby.status(), RoomStatus::Waiting);
    }

    #[test]
    fn test_start_by_non_host_mid_round_is_not_host() {
        let mut lobby = started("random", 2);
        let result = lobby.start(pid(2), &mut rng(), &ParagraphBank::default(), 0);
        assert!(matches!(result, Err(RoomError::NotHost(_))));
        assert!(lobby.round_active());
    }

    #[test]
    fn test_start_alone_is_not_enough_players() {
        let mut lobby = lobby("random", 2, None);
        let result = lobby.start(pid(1), &mut rng(), &ParagraphBank::default(), 0);
        assert!(matches!(result, Err(RoomError::NotEnoughPlayers(_, 2))));
    }

    #[test]
    fn test_start_while_running_is_round_in_progress() {
        let mut lobby = started("random", 2);
        let result = lobby.start(pid(1), &mut rng(), &ParagraphBank::default(), 0);
        assert!(matches!(result, Err(RoomError::RoundInProgress(_))));
    }

    #[test]
    fn test_start_random_broadcasts_matching_time() {
        let mut lobby = filled("random", 2);
        let (outbox, plan) = lobby
            .start(pid(1), &mut rng(), &ParagraphBank::default(), 1_234)
            .unwrap();

        assert_eq!(lobby.status(), RoomStatus::InProgress);
        let [(Recipient::All, ServerEvent::GameStarting(start))] = outbox.as_slice() else {
            panic!("expected one game_starting broadcast, got {outbox:?}");
        };
        assert!(start.time == 45 || start.time == 90);
        assert_eq!(start.time, plan.time_limit.as_secs());
        assert_eq!(start.start_timestamp, 1_234);
        assert_eq!(lobby.snapshot().target_text.as_deref(), Some(start.text.as_str()));
    }

    #[test]
    fn test_start_tier_first_round_is_easy() {
        let mut lobby = filled("tier", 2);
        let bank = ParagraphBank::default();
        let (outbox, _) = lobby.start(pid(1), &mut rng(), &bank, 0).unwrap();
        let ServerEvent::GameStarting(start) = &outbox[0].1 else {
            panic!("expected game_starting");
        };
        assert_eq!(start.difficulty, Difficulty::Easy);
        assert_eq!(start.time, 40);
        assert_eq!(start.round, 1);
    }

    #[test]
    fn test_start_ignores_disconnected_members_for_minimum() {
        let mut lobby = filled("random", 2);
        lobby.mark_disconnected(pid(2)).unwrap();
        let result = lobby.start(pid(1), &mut rng(), &ParagraphBank::default(), 0);
        assert!(matches!(result, Err(RoomError::NotEnoughPlayers(..))));
    }

    /// A two-player tier room; its first rounds are always easy, so a
    /// bank with only easy passages drives text selection.
    fn tier_pair() -> Lobby {
        let mut lobby = Lobby::new(
            RoomCode::new("TIER01"),
            RoomSettings::new("tier", 2, None).unwrap(),
            pid(1),
            profile("h"),
        );
        lobby.join(pid(2), profile("g"), None).unwrap();
        lobby
    }

    #[test]
    fn test_start_avoids_repeating_texts_until_exhausted() {
        let bank = ParagraphBank::empty().with_passages(Difficulty::Easy, ["a", "b"]);
        let mut lobby = tier_pair();
        let mut r = rng();

        lobby.start(pid(1), &mut r, &bank, 0).unwrap();
        lobby.abandon_round();
        lobby.start(pid(1), &mut r, &bank, 0).unwrap();

        let mut shown = lobby.shown().to_vec();
        shown.sort();
        assert_eq!(shown, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_start_reuses_shown_text_when_provider_exhausted() {
        let bank = ParagraphBank::empty().with_passages(Difficulty::Easy, ["only"]);
        let mut lobby = tier_pair();
        let mut r = rng();

        lobby.start(pid(1), &mut r, &bank, 0).unwrap();
        lobby.abandon_round();
        let (outbox, _) = lobby.start(pid(1), &mut r, &bank, 0).unwrap();

        let ServerEvent::GameStarting(start) = &outbox[0].1 else {
            panic!("expected game_starting");
        };
        assert_eq!(start.text, "only");
    }

    #[test]
    fn test_start_uses_fallback_with_no_content_and_no_history() {
        let mut lobby = filled("random", 2);
        let (outbox, _) = lobby
            .start(pid(1), &mut rng(), &ParagraphBank::empty(), 0)
            .unwrap();
        let ServerEvent::GameStarting(start) = &outbox[0].1 else {
            panic!("expected game_starting");
        };
        assert_eq!(start.text, FALLBACK_TEXT);
    }

    // =====================================================================
    // record_progress
    // =====================================================================

    #[test]
    fn test_progress_relayed_to_others_only() {
        let mut lobby = started("random", 3);
        let outbox = lobby.record_progress(pid(2), 30.0, 55.0, secs(5)).unwrap();

        assert_eq!(outbox.len(), 1);
        let (recipient, event) = &outbox[0];
        assert_eq!(*recipient, Recipient::AllExcept(pid(2)));
        assert_eq!(
            *event,
            ServerEvent::OpponentProgress(ProgressUpdate {
                connection_id: pid(2),
                progress: 30.0,
                wpm: 55.0,
            })
        );
    }

    #[test]
    fn test_progress_regression_is_dropped() {
        let mut lobby = started("random", 2);
        lobby.record_progress(pid(2), 60.0, 50.0, secs(5)).unwrap();

        let outbox = lobby.record_progress(pid(2), 40.0, 50.0, secs(6)).unwrap();

        assert!(outbox.is_empty());
        let snapshot = lobby.snapshot();
        assert_eq!(snapshot.player(pid(2)).unwrap().progress, 60.0);
    }

    #[test]
    fn test_progress_outside_round_is_dropped() {
        let mut lobby = filled("random", 2);
        let outbox = lobby.record_progress(pid(2), 10.0, 10.0, secs(1)).unwrap();
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_progress_rejects_out_of_range_and_nan() {
        let mut lobby = started("random", 2);
        for (progress, wpm) in [(101.0, 1.0), (-1.0, 1.0), (f64::NAN, 1.0), (10.0, -5.0), (10.0, f64::INFINITY)] {
            let result = lobby.record_progress(pid(2), progress, wpm, secs(1));
            assert!(matches!(result, Err(RoomError::InvalidProgress(_))), "{progress}/{wpm}");
        }
    }

    #[test]
    fn test_progress_from_non_member_is_not_in_room() {
        let mut lobby = started("random", 2);
        let result = lobby.record_progress(pid(42), 10.0, 1.0, secs(1));
        assert!(matches!(result, Err(RoomError::NotInRoom(..))));
    }

    #[test]
    fn test_all_complete_finishes_early_with_completion_order() {
        let mut lobby = started("random", 2);
        lobby.record_progress(pid(2), 100.0, 90.0, secs(30)).unwrap();
        assert!(lobby.round_active());

        let outbox = lobby.record_progress(pid(1), 100.0, 95.0, secs(35)).unwrap();

        assert!(!lobby.round_active());
        let result = outbox
            .iter()
            .find_map(|(_, e)| match e {
                ServerEvent::RoundFinished(r) => Some(r.clone()),
                _ => None,
            })
            .expect("round_finished broadcast");
        assert_eq!(result.reason, FinishReason::AllCompleted);
        assert_eq!(result.standings[0].connection_id, pid(2));
        assert_eq!(result.standings[0].rank, 1);
        assert_eq!(result.standings[1].connection_id, pid(1));
        assert_eq!(result.standings[1].rank, 2);
    }

    #[test]
    fn test_completion_time_is_first_report_of_hundred() {
        let mut lobby = started("random", 3);
        lobby.record_progress(pid(2), 100.0, 90.0, secs(30)).unwrap();
        lobby.record_progress(pid(2), 100.0, 91.0, secs(40)).unwrap();
        let outbox = lobby.finish(FinishReason::TimeUp);

        let ServerEvent::RoundFinished(result) = &outbox[0].1 else {
            panic!("expected round_finished");
        };
        assert_eq!(result.standings[0].completion_ms, Some(30_000));
    }

    // =====================================================================
    // finish / abandon
    // =====================================================================

    #[test]
    fn test_finish_time_up_ranks_and_returns_to_waiting() {
        let mut lobby = started("random", 3);
        lobby.record_progress(pid(3), 70.0, 40.0, secs(10)).unwrap();
        lobby.record_progress(pid(1), 20.0, 20.0, secs(10)).unwrap();

        let outbox = lobby.finish(FinishReason::TimeUp);

        assert_eq!(lobby.status(), RoomStatus::Waiting);
        assert_eq!(outbox.len(), 2);
        let ServerEvent::RoundFinished(result) = &outbox[0].1 else {
            panic!("expected round_finished");
        };
        let order: Vec<_> = result.standings.iter().map(|s| s.connection_id).collect();
        assert_eq!(order, vec![pid(3), pid(1), pid(2)]);
        let ServerEvent::RoomUpdated(snapshot) = &outbox[1].1 else {
            panic!("expected room_updated");
        };
        assert_eq!(snapshot.player(pid(3)).unwrap().rank, Some(1));
        assert_eq!(snapshot.target_text, None);
    }

    #[test]
    fn test_finish_tier_increments_round_random_does_not() {
        let mut tier = started("tier", 2);
        tier.finish(FinishReason::TimeUp);
        assert_eq!(tier.round(), 2);

        let mut random = started("random", 2);
        random.finish(FinishReason::TimeUp);
        assert_eq!(random.round(), 1);
    }

    #[test]
    fn test_finish_when_idle_is_noop() {
        let mut lobby = filled("random", 2);
        assert!(lobby.finish(FinishReason::TimeUp).is_empty());
    }

    #[test]
    fn test_all_disconnected_mid_round_abandons() {
        let mut lobby = started("random", 2);
        lobby.mark_disconnected(pid(1)).unwrap();
        assert!(lobby.round_active());

        let outbox = lobby.mark_disconnected(pid(2)).unwrap();

        assert_eq!(lobby.status(), RoomStatus::Waiting);
        assert!(!outbox.iter().any(|(_, e)| matches!(e, ServerEvent::RoundFinished(_))));
        assert_eq!(lobby.round(), 1);
    }

    #[test]
    fn test_abandon_round_tier_keeps_round_and_clears_race() {
        let mut lobby = started("tier", 2);
        lobby.record_progress(pid(1), 45.0, 30.0, secs(5)).unwrap();

        let outbox = lobby.abandon_round();

        assert_eq!(lobby.status(), RoomStatus::Waiting);
        assert_eq!(lobby.round(), 1);
        assert_eq!(outbox.len(), 1);
        let ServerEvent::RoomUpdated(snapshot) = &outbox[0].1 else {
            panic!("expected room_updated");
        };
        assert_eq!(snapshot.player(pid(1)).unwrap().progress, 0.0);
        assert_eq!(snapshot.target_text, None);
    }

    #[test]
    fn test_abandon_round_when_idle_is_noop() {
        let mut lobby = filled("random", 2);
        assert!(lobby.abandon_round().is_empty());
        assert_eq!(lobby.status(), RoomStatus::Waiting);
    }

    #[test]
    fn test_disconnected_racer_does_not_block_early_finish() {
        let mut lobby = started("random", 2);
        lobby.mark_disconnected(pid(2)).unwrap();
        let outbox = lobby.record_progress(pid(1), 100.0, 60.0, secs(12)).unwrap();
        assert!(outbox.iter().any(|(_, e)| matches!(e, ServerEvent::RoundFinished(_))));
    }

    #[test]
    fn test_reconnect_sends_resumed_snapshot_then_broadcast() {
        let mut lobby = filled("random", 2);
        lobby.mark_disconnected(pid(2)).unwrap();
        assert!(!lobby.snapshot().player(pid(2)).unwrap().connected);

        let outbox = lobby.mark_reconnected(pid(2)).unwrap();

        assert!(matches!(&outbox[0], (Recipient::Player(p), ServerEvent::SessionResumed(_)) if *p == pid(2)));
        assert!(matches!(&outbox[1], (Recipient::All, ServerEvent::PlayerJoined(_))));
        assert!(lobby.snapshot().player(pid(2)).unwrap().connected);
    }

    #[test]
    fn test_set_ready_broadcasts_snapshot() {
        let mut lobby = filled("random", 2);
        let outbox = lobby.set_ready(pid(2), true).unwrap();
        let [(Recipient::All, ServerEvent::RoomUpdated(snapshot))] = outbox.as_slice() else {
            panic!("expected room_updated");
        };
        assert!(snapshot.player(pid(2)).unwrap().is_ready);
    }

    #[test]
    fn test_summary_and_is_open() {
        let mut lobby = lobby("tier", 2, Some("pw"));
        let summary = lobby.summary();
        assert_eq!(summary.players, 1);
        assert!(summary.has_password);
        assert!(lobby.is_open());

        lobby.join(pid(2), profile("bo"), Some("pw")).unwrap();
        assert!(!lobby.is_open());
    }
}
