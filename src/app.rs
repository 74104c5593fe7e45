use ratatui::widgets::ListState;

use crate::controller::{Controller, ExchangeKind, Phase, Snapshot, Submission, FALLBACK_REPLY};
use crate::feedback::{FeedbackSelection, FEEDBACK_OPTIONS};
use crate::transcript::Turn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub base_url: String,

    // Conversation state, refreshed from the controller every loop
    pub controller: Controller,
    pub snapshot: Snapshot,

    // Prompt input
    pub input: String,
    pub cursor: usize,

    // Chat pane scroll state
    pub chat_scroll: u16,
    pub chat_height: u16,       // Inner height of the chat pane
    pub chat_total_lines: u16,  // Wrapped line count from the last render
    pub follow_bottom: bool,
    pub show_thoughts: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Feedback dialog
    pub show_feedback: bool,
    pub feedback_selection: FeedbackSelection,
    pub feedback_state: ListState,
}

impl App {
    pub fn new(controller: Controller, base_url: &str) -> Self {
        let snapshot = controller.snapshot();
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            base_url: base_url.to_string(),

            controller,
            snapshot,

            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_total_lines: 0,
            follow_bottom: true,
            show_thoughts: false,

            animation_frame: 0,

            show_feedback: false,
            feedback_selection: FeedbackSelection::default(),
            feedback_state: ListState::default(),
        }
    }

    /// Pull the latest controller state. New turns or a change in the
    /// in-flight phase snap the chat back to the bottom.
    pub fn refresh(&mut self) {
        let snapshot = self.controller.snapshot();
        if snapshot.transcript.len() != self.snapshot.transcript.len()
            || snapshot.phase != self.snapshot.phase
        {
            self.follow_bottom = true;
        }
        self.snapshot = snapshot;
    }

    /// Live check against the controller, not the last snapshot.
    pub fn input_enabled(&self) -> bool {
        self.controller.input_enabled()
    }

    /// Kick off the greeting request in the background.
    pub fn start(&mut self) {
        if let Some(token) = self.controller.begin(Phase::Waiting(ExchangeKind::Start)) {
            let controller = self.controller.clone();
            tokio::spawn(async move { controller.run_start(token).await });
        }
        self.refresh();
    }

    /// Send the input box contents. The input is kept only when another
    /// exchange is still running.
    pub fn submit_input(&mut self) -> Submission {
        let outcome = match self.controller.claim_prompt(&self.input) {
            Ok(claim) => {
                let controller = self.controller.clone();
                tokio::spawn(async move { controller.run_prompt(claim).await });
                Submission::Sent
            }
            Err(rejected) => rejected,
        };

        if outcome != Submission::Busy {
            self.input.clear();
            self.cursor = 0;
        }
        self.refresh();
        outcome
    }

    /// Feedback is offered on a reply and on the fallback apology.
    pub fn can_give_feedback(&self) -> bool {
        let retryable = match self.snapshot.transcript.last() {
            Some(Turn::Notice(text)) => text == FALLBACK_REPLY,
            Some(turn) => turn.is_reply(),
            None => false,
        };
        self.input_enabled() && retryable
    }

    pub fn open_feedback(&mut self) {
        if !self.can_give_feedback() {
            return;
        }
        self.show_feedback = true;
        self.feedback_selection = FeedbackSelection::default();
        self.feedback_state.select(Some(0));
    }

    pub fn close_feedback(&mut self) {
        self.show_feedback = false;
    }

    pub fn feedback_nav_down(&mut self) {
        let i = self.feedback_state.selected().unwrap_or(0);
        self.feedback_state
            .select(Some((i + 1).min(FEEDBACK_OPTIONS.len() - 1)));
    }

    pub fn feedback_nav_up(&mut self) {
        let i = self.feedback_state.selected().unwrap_or(0);
        self.feedback_state.select(Some(i.saturating_sub(1)));
    }

    pub fn toggle_feedback_option(&mut self) {
        if let Some(i) = self.feedback_state.selected() {
            self.feedback_selection.toggle(i);
        }
    }

    pub fn submit_feedback(&mut self) {
        self.show_feedback = false;
        let selected = self.feedback_selection.messages();
        if let Ok(claim) = self.controller.claim_feedback(selected) {
            let controller = self.controller.clone();
            tokio::spawn(async move { controller.run_feedback(claim).await });
        }
        self.refresh();
    }

    pub fn dismiss_alert(&mut self) {
        self.controller.dismiss_alert();
        self.refresh();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if !self.input_enabled() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    fn max_scroll(&self) -> u16 {
        self.chat_total_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
        self.follow_bottom = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_bottom = false;
    }

    pub fn scroll_bottom(&mut self) {
        self.follow_bottom = true;
    }

    /// Called by the renderer once the wrapped height of the chat is known.
    pub fn update_chat_metrics(&mut self, total_lines: u16, height: u16) {
        self.chat_total_lines = total_lines;
        self.chat_height = height;
        if self.follow_bottom {
            self.chat_scroll = self.max_scroll();
        } else {
            self.chat_scroll = self.chat_scroll.min(self.max_scroll());
        }
    }
}
