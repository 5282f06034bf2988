use std::sync::Arc;

use aiagent_core::{ChatController, ConversationState};
use tokio::sync::mpsc;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input line
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Latest snapshot published by the controller
    pub conversation: ConversationState,

    // Chat pane
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height, set during render
    pub chat_width: u16,  // inner width, set during render
    pub follow_tail: bool,

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub status: Option<String>,

    pub controller: Arc<ChatController>,
    pub events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(controller: Arc<ChatController>, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            input: String::new(),
            cursor: 0,

            conversation: controller.snapshot(),

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_tail: true,

            animation_frame: 0,
            status: None,

            controller,
            events,
        }
    }

    pub fn update_conversation(&mut self, state: ConversationState) {
        self.conversation = state;
        if self.follow_tail {
            self.scroll_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.awaiting_response {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn latest_reply(&self) -> Option<&str> {
        self.conversation.latest_reply().map(|entry| entry.content())
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.max_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
        self.follow_tail = self.chat_scroll >= max_scroll;
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_tail = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
        self.follow_tail = true;
    }

    pub fn half_page(&self) -> u16 {
        (self.visible_height() / 2).max(1)
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    fn max_scroll(&self) -> u16 {
        self.chat_line_count().saturating_sub(self.visible_height())
    }

    /// Estimated rendered height of the chat pane, mirroring `ui::chat_lines`
    pub fn chat_line_count(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: usize = 0;
        for entry in &self.conversation.entries {
            total += 1; // author line
            if entry.image().is_some() {
                total += 1;
            }
            for line in entry.content().lines() {
                // Character count, not byte length, for UTF-8
                let chars = line.chars().count();
                total += if chars == 0 { 1 } else { chars.div_ceil(wrap_width) };
            }
            total += 1; // blank line after entry
        }

        if self.conversation.awaiting_response {
            total += 2; // "AI:" + "Thinking..."
        }

        total.min(u16::MAX as usize) as u16
    }
}
