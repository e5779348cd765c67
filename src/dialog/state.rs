use std::fmt;

use serde::{Deserialize, Serialize};

use super::profile::UserProfile;

/// The two named dialogs a resumed conversation can enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogId {
    /// Onboarding: asks for name and city.
    WhoAreYou,
    /// Greets a user whose profile is already filled in.
    HelloUser,
}

impl DialogId {
    /// Users with a known city skip onboarding.
    pub fn for_profile(profile: &UserProfile) -> Self {
        if profile.is_onboarded() {
            DialogId::HelloUser
        } else {
            DialogId::WhoAreYou
        }
    }

    pub fn first_step(&self) -> Step {
        match self {
            DialogId::WhoAreYou => Step::PromptForName,
            DialogId::HelloUser => Step::DisplayProfile,
        }
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogId::WhoAreYou => write!(f, "WHO_ARE_YOU"),
            DialogId::HelloUser => write!(f, "HELLO_USER"),
        }
    }
}

/// Waterfall steps. A prompting step is the one persisted while the dialog
/// waits; the reply is fed into the step after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    PromptForName,
    PromptForCity,
    CaptureCity,
    DisplayProfile,
}

impl Step {
    /// Position of the step inside its dialog.
    pub fn index(&self) -> usize {
        match self {
            Step::PromptForName | Step::DisplayProfile => 0,
            Step::PromptForCity => 1,
            Step::CaptureCity => 2,
        }
    }

    pub fn next(&self) -> Option<Step> {
        match self {
            Step::PromptForName => Some(Step::PromptForCity),
            Step::PromptForCity => Some(Step::CaptureCity),
            Step::CaptureCity | Step::DisplayProfile => None,
        }
    }
}

/// The active dialog of a conversation: where it stopped and what the last
/// prompt produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogFrame {
    pub dialog: DialogId,
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Persisted per conversation. Holds at most one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogState {
    #[serde(default)]
    stack: Vec<DialogFrame>,
}

impl DialogState {
    pub fn active(&self) -> Option<&DialogFrame> {
        self.stack.last()
    }

    /// Replaces whatever is active; `None` empties the stack.
    pub fn set_active(&mut self, frame: Option<DialogFrame>) {
        self.stack.clear();
        self.stack.extend(frame);
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogInput<'a> {
    Begin(DialogId),
    Reply(&'a str),
}

/// Side effects of a step, applied by the engine in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Say(String),
    SetName(String),
    SetCity(String),
}

/// Result of feeding one input to the dialog state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Frame to persist; `None` means the dialog ended (or never started).
    pub next: Option<DialogFrame>,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn idle() -> Self {
        Self {
            next: None,
            effects: Vec::new(),
        }
    }
}

/// Pure transition function of the dialog engine.
///
/// - `Begin` always starts the requested dialog, replacing any active one.
/// - `Reply` with no active dialog is dropped.
/// - A blank reply repeats the pending prompt without advancing.
pub fn transition(
    active: Option<&DialogFrame>,
    input: DialogInput<'_>,
    profile: &UserProfile,
) -> Transition {
    match input {
        DialogInput::Begin(dialog) => run_step(dialog, dialog.first_step(), None, profile),
        DialogInput::Reply(text) => {
            let Some(frame) = active else {
                return Transition::idle();
            };
            let text = text.trim();
            if text.is_empty() {
                return Transition {
                    next: Some(frame.clone()),
                    effects: vec![Effect::Say(prompt_text(frame))],
                };
            }
            match frame.step.next() {
                Some(step) => run_step(frame.dialog, step, Some(text.to_string()), profile),
                None => Transition::idle(),
            }
        }
    }
}

fn run_step(
    dialog: DialogId,
    step: Step,
    result: Option<String>,
    profile: &UserProfile,
) -> Transition {
    match step {
        Step::PromptForName => Transition {
            next: Some(DialogFrame {
                dialog,
                step,
                result: None,
            }),
            effects: vec![Effect::Say(ask_name())],
        },
        Step::PromptForCity => {
            let name = result.unwrap_or_default();
            Transition {
                effects: vec![Effect::SetName(name.clone()), Effect::Say(ask_city(&name))],
                next: Some(DialogFrame {
                    dialog,
                    step,
                    result: Some(name),
                }),
            }
        }
        Step::CaptureCity => {
            let city = result.unwrap_or_default();
            Transition {
                effects: vec![
                    Effect::Say(format!("Thanks. I'll remember that you live in {city}.")),
                    Effect::SetCity(city),
                ],
                next: None,
            }
        }
        Step::DisplayProfile => Transition {
            next: None,
            effects: vec![Effect::Say(profile.greeting())],
        },
    }
}

fn ask_name() -> String {
    "What is your name?".to_string()
}

fn ask_city(name: &str) -> String {
    format!("Hello {name}, what city do you live in?")
}

fn prompt_text(frame: &DialogFrame) -> String {
    match frame.step {
        Step::PromptForCity => ask_city(frame.result.as_deref().unwrap_or_default()),
        _ => ask_name(),
    }
}
