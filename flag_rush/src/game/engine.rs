//! The per-room round state machine.
//!
//! One engine instance drives every room. Each entrypoint resolves the room
//! handle, takes the room lock, and performs the transition while holding
//! it; broadcasts are enqueue-only so nothing blocks under the lock. Timers
//! re-validate room liveness and `is_active` on entry, so a transition that
//! raced a deletion or a stop becomes a no-op.
//!
//! Transitions: `waiting → starting → question → results → (question |
//! finished)`, with STOP_GAME jumping any state back to `waiting`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Duration;

use super::timers::TimerRegistry;
use super::{GameAnswer, GamePhase, GameQuestion, compute_leaderboard, compute_stats};
use crate::broadcast::Broadcaster;
use crate::clock::now_ms;
use crate::constants::{CORRECT_POINT_COST, MIN_ROOM_SIZE};
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::net::messages::ServerMessage;
use crate::questions::QuestionProvider;
use crate::room::{Room, RoomStore};

/// Pacing of the non-question delays. Production values are fixed by the
/// protocol; tests compress them to keep scenarios fast.
#[derive(Clone, Copy, Debug)]
pub struct GameTimings {
    /// Delay between GAME_STARTING/GAME_RESTARTED and the first question.
    pub start_countdown: Duration,
    /// Delay between QUESTION_RESULTS and the next question.
    pub results_delay: Duration,
}

impl Default for GameTimings {
    fn default() -> Self {
        Self {
            start_countdown: Duration::from_secs(5),
            results_delay: Duration::from_secs(3),
        }
    }
}

/// Drives the round state machine for every room.
pub struct GameEngine {
    rooms: Arc<RoomStore>,
    broadcaster: Arc<Broadcaster>,
    timers: Arc<TimerRegistry>,
    provider: Arc<dyn QuestionProvider>,
    timings: GameTimings,
}

impl GameEngine {
    /// Create the engine.
    ///
    /// # Arguments
    ///
    /// * `rooms` - Room store the engine mutates through
    /// * `broadcaster` - Fan-out for round events
    /// * `provider` - Question source (see [`QuestionProvider`])
    /// * `timings` - Inter-round pacing
    ///
    /// # Returns
    ///
    /// * `Arc<GameEngine>` - Shared engine; timer tasks hold clones
    pub fn new(
        rooms: Arc<RoomStore>,
        broadcaster: Arc<Broadcaster>,
        provider: Arc<dyn QuestionProvider>,
        timings: GameTimings,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms,
            broadcaster,
            timers: Arc::new(TimerRegistry::new()),
            provider,
            timings,
        })
    }

    /// Start a game in a room.
    ///
    /// Resets every member's score, clears round history, emits
    /// `GAME_STARTING{countdown}` and schedules the first question.
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room to start
    /// * `user_id` - Caller; must be the room's host
    ///
    /// # Errors
    ///
    /// * `PERMISSION_DENIED` - Caller is not the host
    /// * `INVALID_GAME_STATE` - Fewer than 2 members, or already active
    /// * `ROOM_NOT_FOUND` - Room was deleted concurrently
    pub async fn start_game(self: &Arc<Self>, room_id: &str, user_id: &str) -> AppResult<()> {
        let handle = self.rooms.get(room_id).await.ok_or_else(AppError::room_not_found)?;
        let mut room = handle.lock().await;

        require_host(&room, user_id)?;
        if room.members.len() < MIN_ROOM_SIZE {
            return Err(AppError::invalid_game_state("need at least 2 players"));
        }
        if room.game.is_active {
            return Err(AppError::invalid_game_state("game already in progress"));
        }

        self.begin_game(&mut room, false).await;
        Ok(())
    }

    /// Host restarts a finished game.
    pub async fn restart_game(self: &Arc<Self>, room_id: &str, user_id: &str) -> AppResult<()> {
        let handle = self.rooms.get(room_id).await.ok_or_else(AppError::room_not_found)?;
        let mut room = handle.lock().await;

        require_host(&room, user_id)?;
        if room.game.phase != GamePhase::Finished {
            return Err(AppError::invalid_game_state(
                "can only restart a finished game",
            ));
        }
        if room.members.len() < MIN_ROOM_SIZE {
            return Err(AppError::invalid_game_state("need at least 2 players"));
        }

        self.begin_game(&mut room, true).await;
        Ok(())
    }

    /// Host force-stops the game from any state.
    pub async fn stop_game(self: &Arc<Self>, room_id: &str, user_id: &str) -> AppResult<()> {
        let handle = self.rooms.get(room_id).await.ok_or_else(AppError::room_not_found)?;
        let mut room = handle.lock().await;
        require_host(&room, user_id)?;
        self.halt(&mut room).await;
        self.broadcaster
            .to_members(&room.member_ids(), &ServerMessage::GameStopped)
            .await;
        Ok(())
    }

    /// Record an answer during the question phase.
    ///
    /// Scores the answer (`CORRECT_POINT_COST` flat for a correct code),
    /// appends it to the round and the history, recomputes the leaderboard
    /// cache, and broadcasts `ANSWER_SUBMITTED`. When the last member
    /// answers, the round closes ahead of its timer.
    ///
    /// Idempotent per (user, question): a second submission changes nothing
    /// and emits nothing.
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room with an active question
    /// * `user_id` - Answering member
    /// * `answer` - Sanitized answer value, compared to the country code
    ///
    /// # Errors
    ///
    /// * `GAME_NOT_ACTIVE` - No game running
    /// * `INVALID_GAME_STATE` - Not in the question phase (deadline passed)
    /// * `PERMISSION_DENIED` - Caller is not a member
    pub async fn submit_answer(
        self: &Arc<Self>,
        room_id: &str,
        user_id: &str,
        answer: &str,
    ) -> AppResult<()> {
        let handle = self.rooms.get(room_id).await.ok_or_else(AppError::room_not_found)?;
        let mut room = handle.lock().await;

        if !room.game.is_active {
            return Err(AppError::new(ErrorKind::GameNotActive, "no game in progress"));
        }
        if room.game.phase != GamePhase::Question {
            return Err(AppError::invalid_game_state("answers are closed"));
        }
        if !room.has_member(user_id) {
            return Err(AppError::permission_denied("not a member of this room"));
        }
        if room.game.has_answered(user_id) {
            return Ok(());
        }

        let Some(question) = room.game.current_question.clone() else {
            return Err(AppError::invalid_game_state("no current question"));
        };

        let now = now_ms();
        let is_correct = answer == question.correct_answer;
        let points_awarded = if is_correct { CORRECT_POINT_COST } else { 0 };
        let username = room
            .member(user_id)
            .map(|m| m.username.clone())
            .unwrap_or_default();

        let record = GameAnswer {
            user_id: user_id.to_string(),
            username: username.clone(),
            answer: answer.to_string(),
            time_to_answer: now - question.start_time,
            is_correct,
            points_awarded,
            timestamp: now,
        };
        room.game.answers.push(record.clone());
        room.game.answer_history.push(record);

        let score = {
            let member = room.member_mut(user_id).expect("membership checked above");
            member.has_answered = true;
            member.score += points_awarded;
            member.score
        };

        room.game.leaderboard = compute_leaderboard(&room.game.answer_history, &room.members);

        let message = ServerMessage::AnswerSubmitted {
            user_id: user_id.to_string(),
            username,
            has_answered: true,
            total_answers: room.game.answers.len(),
            total_players: room.members.len(),
            points_awarded,
            score,
        };
        self.broadcaster
            .to_members(&room.member_ids(), &message)
            .await;

        // Everyone answered: close the round ahead of the timer.
        if room.game.answers.len() >= room.members.len() {
            self.end_question_inner(&mut room).await;
        }
        Ok(())
    }

    /// Timer entrypoint: advance to the next question or finish the game.
    /// Aborts silently if the room vanished or the game was stopped.
    pub fn next_question<'a>(
        self: &'a Arc<Self>,
        room_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(handle) = self.rooms.get(room_id).await else {
                return;
            };
            let mut room = handle.lock().await;
            if !room.game.is_active {
                return;
            }

            if room.game.current_question_index >= room.game.total_questions {
                self.end_game_inner(&mut room).await;
                return;
            }

            let Some(drawn) = self
                .provider
                .next_question(room.settings.difficulty, &room.game.used_countries)
            else {
                log::warn!(
                    "question pool exhausted for room {room_id} at question {}",
                    room.game.current_question_index
                );
                self.end_game_inner(&mut room).await;
                return;
            };

            let start_time = now_ms();
            let question = GameQuestion {
                index: room.game.current_question_index,
                correct_answer: drawn.country.code.to_string(),
                start_time,
                end_time: start_time + i64::from(room.settings.time_per_question) * 1000,
                country: drawn.country,
                options: drawn.options,
            };

            room.game.used_countries.insert(question.correct_answer.clone());
            room.game.phase = GamePhase::Question;
            room.game.answers.clear();
            room.game.current_question_index += 1;
            for member in &mut room.members {
                member.has_answered = false;
            }

            let message = ServerMessage::NewQuestion {
                question: question.view(),
                total_questions: room.game.total_questions,
            };
            room.game.current_question = Some(question);
            self.broadcaster
                .to_members(&room.member_ids(), &message)
                .await;

            let engine = self.clone();
            let id = room.id.clone();
            let budget = Duration::from_secs(u64::from(room.settings.time_per_question));
            self.timers
                .schedule(room.id.clone(), budget, async move {
                    engine.end_question(&id).await;
                })
                .await;
        })
    }

    /// Timer entrypoint: the question's time budget elapsed.
    pub async fn end_question(self: &Arc<Self>, room_id: &str) {
        let Some(handle) = self.rooms.get(room_id).await else {
            return;
        };
        let mut room = handle.lock().await;
        if !room.game.is_active || room.game.phase != GamePhase::Question {
            return;
        }
        self.end_question_inner(&mut room).await;
    }

    /// Cancel timers and deactivate without broadcasting. Used by STOP_GAME
    /// and by room teardown.
    pub async fn halt(&self, room: &mut Room) {
        self.timers.cancel(&room.id).await;
        room.game.is_active = false;
        room.game.phase = GamePhase::Waiting;
        room.game.current_question = None;
    }

    /// True if a timer is pending for the room. Exposed for tests and the
    /// stats surface.
    pub async fn has_timer(&self, room_id: &str) -> bool {
        self.timers.has_timer(room_id).await
    }

    async fn begin_game(self: &Arc<Self>, room: &mut Room, restarted: bool) {
        for member in &mut room.members {
            member.score = 0;
            member.has_answered = false;
        }
        room.game.is_active = true;
        room.game.phase = GamePhase::Starting;
        room.game.current_question = None;
        room.game.answers.clear();
        room.game.answer_history.clear();
        room.game.used_countries.clear();
        room.game.leaderboard.clear();
        room.game.current_question_index = 0;
        room.game.total_questions = room.settings.question_count;
        room.game.game_start_time = Some(now_ms());
        room.game.game_end_time = None;

        let countdown = self.timings.start_countdown.as_secs() as u32;
        let message = if restarted {
            ServerMessage::GameRestarted { countdown }
        } else {
            ServerMessage::GameStarting { countdown }
        };
        self.broadcaster
            .to_members(&room.member_ids(), &message)
            .await;

        log::info!(
            "room {}: game {} with {} questions at {:?}",
            room.id,
            if restarted { "restarted" } else { "started" },
            room.game.total_questions,
            room.settings.difficulty
        );

        let engine = self.clone();
        let id = room.id.clone();
        self.timers
            .schedule(room.id.clone(), self.timings.start_countdown, async move {
                engine.next_question(&id).await;
            })
            .await;
    }

    async fn end_question_inner(self: &Arc<Self>, room: &mut Room) {
        let Some(question) = room.game.current_question.clone() else {
            return;
        };
        self.timers.cancel(&room.id).await;
        room.game.phase = GamePhase::Results;
        room.game.leaderboard = compute_leaderboard(&room.game.answer_history, &room.members);

        let message = ServerMessage::QuestionResults {
            correct_answer: question.correct_answer.clone(),
            correct_country: question.country.clone(),
            player_answers: room.game.answers.clone(),
            leaderboard: room.game.leaderboard.clone(),
        };
        self.broadcaster
            .to_members(&room.member_ids(), &message)
            .await;

        let engine = self.clone();
        let id = room.id.clone();
        self.timers
            .schedule(room.id.clone(), self.timings.results_delay, async move {
                engine.next_question(&id).await;
            })
            .await;
    }

    async fn end_game_inner(self: &Arc<Self>, room: &mut Room) {
        self.timers.cancel(&room.id).await;

        room.game.leaderboard = compute_leaderboard(&room.game.answer_history, &room.members);
        room.game.phase = GamePhase::Finished;
        room.game.is_active = false;
        room.game.current_question = None;
        room.game.game_end_time = Some(now_ms());

        let stats = compute_stats(&room.game, room.settings.difficulty);
        log::info!(
            "room {}: game ended after {} questions, {} answers",
            room.id,
            stats.total_questions,
            stats.total_answers
        );

        let message = ServerMessage::GameEnded {
            leaderboard: room.game.leaderboard.clone(),
            game_stats: stats,
        };
        self.broadcaster
            .to_members(&room.member_ids(), &message)
            .await;
    }
}

fn require_host(room: &Room, user_id: &str) -> AppResult<()> {
    if room.host != user_id {
        return Err(AppError::permission_denied("host only"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::{ClientConnection, ConnectionRegistry, OutboundFrame};
    use crate::questions::FlagQuestionProvider;
    use crate::room::RoomSettings;
    use tokio::sync::mpsc;

    struct Rig {
        rooms: Arc<RoomStore>,
        registry: Arc<ConnectionRegistry>,
        engine: Arc<GameEngine>,
        room_id: String,
    }

    async fn rig() -> (
        Rig,
        mpsc::UnboundedReceiver<OutboundFrame>,
        mpsc::UnboundedReceiver<OutboundFrame>,
    ) {
        let rooms = Arc::new(RoomStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let (broadcaster, _evict_rx) = Broadcaster::new(registry.clone(), rooms.clone());
        let engine = GameEngine::new(
            rooms.clone(),
            broadcaster,
            Arc::new(FlagQuestionProvider::new()),
            GameTimings {
                start_countdown: Duration::from_millis(10),
                results_delay: Duration::from_millis(10),
            },
        );

        let handle = rooms
            .create(
                &"host".to_string(),
                "alice",
                "Room".to_string(),
                RoomSettings::default(),
            )
            .await
            .unwrap();
        let room_id = {
            let mut room = handle.lock().await;
            room.add_member("guest", "bob").unwrap();
            room.id.clone()
        };

        let (conn_a, rx_a) = ClientConnection::new("host".to_string(), "ip".to_string());
        let (conn_b, rx_b) = ClientConnection::new("guest".to_string(), "ip".to_string());
        registry.install(conn_a).await;
        registry.install(conn_b).await;

        (
            Rig {
                rooms,
                registry,
                engine,
                room_id,
            },
            rx_a,
            rx_b,
        )
    }

    fn parse(frame: OutboundFrame) -> serde_json::Value {
        match frame {
            OutboundFrame::Text(text) => serde_json::from_str(&text).unwrap(),
            OutboundFrame::Close { .. } => panic!("unexpected close frame"),
        }
    }

    async fn next_of_type(
        rx: &mut mpsc::UnboundedReceiver<OutboundFrame>,
        kind: &str,
    ) -> serde_json::Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for frame")
                .expect("channel closed");
            let value = parse(frame);
            if value["type"] == kind {
                return value;
            }
        }
    }

    #[tokio::test]
    async fn test_start_game_requires_host() {
        let (rig, _rx_a, _rx_b) = rig().await;
        let err = rig.engine.start_game(&rig.room_id, "guest").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_start_game_requires_two_members() {
        let (rig, _rx_a, _rx_b) = rig().await;
        let handle = rig.rooms.get(&rig.room_id).await.unwrap();
        handle.lock().await.remove_member("guest").unwrap();

        let err = rig.engine.start_game(&rig.room_id, "host").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidGameState);
    }

    #[tokio::test]
    async fn test_start_game_rejects_double_start() {
        let (rig, _rx_a, _rx_b) = rig().await;
        rig.engine.start_game(&rig.room_id, "host").await.unwrap();
        let err = rig.engine.start_game(&rig.room_id, "host").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidGameState);
    }

    #[tokio::test]
    async fn test_game_reaches_question_phase_with_timer() {
        let (rig, mut rx_a, _rx_b) = rig().await;
        rig.engine.start_game(&rig.room_id, "host").await.unwrap();

        next_of_type(&mut rx_a, "GAME_STARTING").await;
        let question = next_of_type(&mut rx_a, "NEW_QUESTION").await;
        assert_eq!(question["data"]["totalQuestions"], 20);
        assert_eq!(question["data"]["question"]["options"].as_array().unwrap().len(), 4);
        // Question phase holds exactly one timer (the deadline).
        assert!(rig.engine.has_timer(&rig.room_id).await);

        let handle = rig.rooms.get(&rig.room_id).await.unwrap();
        let room = handle.lock().await;
        assert_eq!(room.game.phase, GamePhase::Question);
        assert_eq!(room.game.current_question_index, 1);
    }

    #[tokio::test]
    async fn test_all_answers_preempt_question_timer() {
        let (rig, mut rx_a, _rx_b) = rig().await;
        rig.engine.start_game(&rig.room_id, "host").await.unwrap();
        next_of_type(&mut rx_a, "NEW_QUESTION").await;

        let correct = {
            let handle = rig.rooms.get(&rig.room_id).await.unwrap();
            let room = handle.lock().await;
            room.game.current_question.as_ref().unwrap().correct_answer.clone()
        };

        rig.engine
            .submit_answer(&rig.room_id, "host", &correct)
            .await
            .unwrap();
        rig.engine
            .submit_answer(&rig.room_id, "guest", "ZZ")
            .await
            .unwrap();

        // Results arrive immediately, well before the 15 s question budget.
        let results = next_of_type(&mut rx_a, "QUESTION_RESULTS").await;
        assert_eq!(results["data"]["correctAnswer"], correct);
        assert_eq!(
            results["data"]["playerAnswers"].as_array().unwrap().len(),
            2
        );
        let board = results["data"]["leaderboard"].as_array().unwrap();
        assert_eq!(board[0]["userId"], "host");
        assert_eq!(board[0]["score"], 1);
    }

    #[tokio::test]
    async fn test_submit_answer_is_idempotent() {
        let (rig, mut rx_a, _rx_b) = rig().await;
        rig.engine.start_game(&rig.room_id, "host").await.unwrap();
        next_of_type(&mut rx_a, "NEW_QUESTION").await;

        rig.engine
            .submit_answer(&rig.room_id, "host", "XX")
            .await
            .unwrap();
        rig.engine
            .submit_answer(&rig.room_id, "host", "YY")
            .await
            .unwrap();

        let handle = rig.rooms.get(&rig.room_id).await.unwrap();
        let room = handle.lock().await;
        assert_eq!(room.game.answers.len(), 1);
        assert_eq!(room.game.answers[0].answer, "XX");
    }

    #[tokio::test]
    async fn test_submit_answer_outside_question_phase_fails() {
        let (rig, _rx_a, _rx_b) = rig().await;
        let err = rig
            .engine
            .submit_answer(&rig.room_id, "host", "FR")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::GameNotActive);
    }

    #[tokio::test]
    async fn test_submit_answer_rejects_non_member() {
        let (rig, mut rx_a, _rx_b) = rig().await;
        rig.engine.start_game(&rig.room_id, "host").await.unwrap();
        next_of_type(&mut rx_a, "NEW_QUESTION").await;

        let err = rig
            .engine
            .submit_answer(&rig.room_id, "stranger", "FR")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_stop_game_resets_to_waiting_and_cancels_timer() {
        let (rig, mut rx_a, _rx_b) = rig().await;
        rig.engine.start_game(&rig.room_id, "host").await.unwrap();
        next_of_type(&mut rx_a, "NEW_QUESTION").await;

        rig.engine.stop_game(&rig.room_id, "host").await.unwrap();
        next_of_type(&mut rx_a, "GAME_STOPPED").await;

        let handle = rig.rooms.get(&rig.room_id).await.unwrap();
        let room = handle.lock().await;
        assert_eq!(room.game.phase, GamePhase::Waiting);
        assert!(!room.game.is_active);
        assert!(room.game.current_question.is_none());
        drop(room);
        assert!(!rig.engine.has_timer(&rig.room_id).await);
    }

    #[tokio::test]
    async fn test_restart_requires_finished_phase() {
        let (rig, _rx_a, _rx_b) = rig().await;
        let err = rig
            .engine
            .restart_game(&rig.room_id, "host")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidGameState);
    }

    #[tokio::test]
    async fn test_deleted_room_transitions_are_silent() {
        let (rig, _rx_a, _rx_b) = rig().await;
        rig.engine.start_game(&rig.room_id, "host").await.unwrap();
        rig.rooms.remove(&rig.room_id).await.unwrap();

        // Fired timers find no room and no-op.
        rig.engine.next_question(&rig.room_id).await;
        rig.engine.end_question(&rig.room_id).await;
        let err = rig.engine.submit_answer(&rig.room_id, "host", "FR").await;
        assert_eq!(err.unwrap_err().kind, ErrorKind::RoomNotFound);
    }

    #[tokio::test]
    async fn test_broadcast_failure_keeps_state_machine_running() {
        let (rig, mut rx_a, _rx_b) = rig().await;
        // Guest has no live connection anymore.
        rig.registry.remove("guest").await;

        rig.engine.start_game(&rig.room_id, "host").await.unwrap();
        next_of_type(&mut rx_a, "NEW_QUESTION").await;

        let handle = rig.rooms.get(&rig.room_id).await.unwrap();
        assert_eq!(handle.lock().await.game.phase, GamePhase::Question);
    }
}
