/// A choice in the feedback dialog: what the user sees and what the model is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackOption {
    pub label: &'static str,
    pub message: &'static str,
}

pub const FEEDBACK_OPTIONS: &[FeedbackOption] = &[
    FeedbackOption {
        label: "The response was irrelevant",
        message: "The user felt like your response was irrelevant. Try again.",
    },
    FeedbackOption {
        label: "I don't like the direction the story is heading",
        message: "The user did not like the direction you took in your response. Try again.",
    },
    FeedbackOption {
        label: "The story is not cohesive",
        message: "The user felt that the story was not cohesive. Make sure that the story progresses fluidly and comes to a logical conclusion, try again.",
    },
    FeedbackOption {
        label: "The story is too boring",
        message: "The user thought the story was too boring, try again and make it more interesting.",
    },
    FeedbackOption {
        label: "The story is too predictable",
        message: "The user felt like the story was not surprising enough, and could already see where the story was going from an early stage. Try again and subvert expectations tastefully.",
    },
    FeedbackOption {
        label: "The story is too short",
        message: "The story is too short, try again and make it longer.",
    },
    FeedbackOption {
        label: "The content is inappropriate",
        message: "The content you generated is highly inappropriate. Please try again.",
    },
];

/// Checkbox state of the feedback dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackSelection {
    checked: Vec<bool>,
}

impl Default for FeedbackSelection {
    fn default() -> Self {
        Self {
            checked: vec![false; FEEDBACK_OPTIONS.len()],
        }
    }
}

impl FeedbackSelection {
    pub fn toggle(&mut self, idx: usize) {
        if let Some(checked) = self.checked.get_mut(idx) {
            *checked = !*checked;
        }
    }

    pub fn is_checked(&self, idx: usize) -> bool {
        self.checked.get(idx).copied().unwrap_or(false)
    }

    /// Messages of the checked options, in dialog order.
    pub fn messages(&self) -> Vec<String> {
        FEEDBACK_OPTIONS
            .iter()
            .zip(&self.checked)
            .filter(|(_, checked)| **checked)
            .map(|(option, _)| option.message.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_follow_dialog_order() {
        let mut selection = FeedbackSelection::default();
        selection.toggle(5);
        selection.toggle(0);
        assert_eq!(
            selection.messages(),
            vec![
                FEEDBACK_OPTIONS[0].message.to_string(),
                FEEDBACK_OPTIONS[5].message.to_string(),
            ]
        );
    }

    #[test]
    fn test_toggle_twice_unchecks() {
        let mut selection = FeedbackSelection::default();
        selection.toggle(2);
        selection.toggle(2);
        assert!(!selection.is_checked(2));
        assert!(selection.messages().is_empty());
    }

    #[test]
    fn test_toggle_out_of_range_is_ignored() {
        let mut selection = FeedbackSelection::default();
        selection.toggle(FEEDBACK_OPTIONS.len());
        assert_eq!(selection, FeedbackSelection::default());
    }
}
