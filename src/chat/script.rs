//! Scripted conversational flow that collects visitor information before a
//! human agent joins.
//!
//! The engine is a fixed step sequence. Each visitor reply advances exactly
//! one step and produces the next prompt; the step reached is persisted as
//! `{"step": ...}` metadata on the prompt message so reopening a session can
//! recover the state without pattern-matching rendered prompt text. Replay
//! over the raw history remains available as a fallback for messages written
//! without the tag.
//!
//! Deactivation is irreversible: one admin-sender message anywhere in the
//! history disables the engine for that session for good.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chat::message::{ChatMessage, CustomerInfo, Sender};

/// Metadata key under which script messages store their step.
pub const STEP_METADATA_KEY: &str = "step";

/// Replies accepted as "yes" at the confirmation step (compared
/// case-insensitively; `oui` also matches as a substring).
const AFFIRMATIVE: [&str; 2] = ["oui", "o"];

/// Current position of the scripted flow for one session.
///
/// A step names the prompt most recently issued; the next visitor reply is
/// interpreted against it. `Start` means no prompt has been issued yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    /// No prompt issued yet.
    Start,
    /// Greeting sent; the next reply only acknowledges it.
    Welcome,
    /// Asking for the visitor's name.
    Name,
    /// Asking for the company.
    Company,
    /// Asking which service or product is of interest.
    Service,
    /// Asking for a callback phone number.
    Phone,
    /// Recap sent; awaiting a yes/no on talking to a live agent.
    Confirmation,
    /// Terminal: a live agent was requested, the visitor is waiting.
    LivechatWaiting,
    /// Terminal: the visitor declined a live conversation.
    Completed,
    /// Terminal: an admin joined the session; the engine never runs again.
    Deactivated,
}

impl ScriptStep {
    /// Stable string form for the metadata tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Welcome => "welcome",
            Self::Name => "name",
            Self::Company => "company",
            Self::Service => "service",
            Self::Phone => "phone",
            Self::Confirmation => "confirmation",
            Self::LivechatWaiting => "livechat_waiting",
            Self::Completed => "completed",
            Self::Deactivated => "deactivated",
        }
    }

    /// Whether the flow is finished for this session.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::LivechatWaiting | Self::Completed | Self::Deactivated)
    }

    /// Step reached after one more prompt, when no metadata tag is
    /// available. The confirmation branch cannot be recovered this way, so
    /// the fallback conservatively lands on `Completed`.
    const fn successor(self) -> Self {
        match self {
            Self::Start => Self::Welcome,
            Self::Welcome => Self::Name,
            Self::Name => Self::Company,
            Self::Company => Self::Service,
            Self::Service => Self::Phone,
            Self::Phone => Self::Confirmation,
            Self::Confirmation => Self::Completed,
            terminal => terminal,
        }
    }

    /// Profile field the next visitor reply fills at this step, if any.
    const fn collects(self) -> Option<ProfileField> {
        match self {
            Self::Name => Some(ProfileField::Name),
            Self::Company => Some(ProfileField::Company),
            Self::Service => Some(ProfileField::Service),
            Self::Phone => Some(ProfileField::Phone),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScriptStep {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "start" => Ok(Self::Start),
            "welcome" => Ok(Self::Welcome),
            "name" => Ok(Self::Name),
            "company" => Ok(Self::Company),
            "service" => Ok(Self::Service),
            "phone" => Ok(Self::Phone),
            "confirmation" => Ok(Self::Confirmation),
            "livechat_waiting" => Ok(Self::LivechatWaiting),
            "completed" => Ok(Self::Completed),
            "deactivated" => Ok(Self::Deactivated),
            _ => Err(value.to_string()),
        }
    }
}

/// Profile field collected by a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ProfileField {
    Name,
    Company,
    Service,
    Phone,
}

/// Engine state for one session: current step plus the profile collected so
/// far. Derived from the message history, never stored as its own row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptState {
    /// Prompt most recently issued.
    pub step: ScriptStep,
    /// Profile fields collected across steps.
    pub profile: CustomerInfo,
}

impl Default for ScriptStep {
    fn default() -> Self {
        Self::Start
    }
}

impl ScriptState {
    /// Recompute the engine state by replaying a session's history in order.
    ///
    /// The computation is a pure fold, so it is idempotent. An admin-sender
    /// message anywhere short-circuits to `Deactivated` before anything else
    /// is considered. Script messages move the step forward, preferring the
    /// persisted metadata tag over sequence counting; visitor messages fill
    /// the profile field the pending prompt asked for.
    #[must_use]
    pub fn replay(messages: &[ChatMessage]) -> Self {
        if messages.iter().any(|m| m.sender == Sender::Admin) {
            return Self {
                step: ScriptStep::Deactivated,
                profile: CustomerInfo::default(),
            };
        }

        let mut state = Self::default();
        for message in messages {
            match message.sender {
                Sender::Script => {
                    state.step = tagged_step(message).unwrap_or_else(|| state.step.successor());
                }
                Sender::Visitor => {
                    let reply = message.body.trim();
                    if reply.is_empty() {
                        continue;
                    }
                    if let Some(field) = state.step.collects() {
                        state.record(field, reply);
                    }
                }
                // Admin messages short-circuited above.
                Sender::Admin => {}
            }
        }
        state
    }

    /// Consume one visitor reply and produce the next prompt.
    ///
    /// Whitespace-only replies are a no-op, not an error: the step does not
    /// advance and no prompt is produced. Terminal steps likewise produce
    /// nothing.
    #[must_use]
    pub fn advance(&self, reply: &str) -> Advance {
        let reply = reply.trim();
        if reply.is_empty() || self.step.is_terminal() {
            return self.noop();
        }

        let mut profile = self.profile.clone();
        if let Some(field) = self.step.collects() {
            Self::record_into(&mut profile, field, reply);
        }

        let (next, handoff) = match self.step {
            ScriptStep::Start => (ScriptStep::Welcome, false),
            ScriptStep::Welcome => (ScriptStep::Name, false),
            ScriptStep::Name => (ScriptStep::Company, false),
            ScriptStep::Company => (ScriptStep::Service, false),
            ScriptStep::Service => (ScriptStep::Phone, false),
            ScriptStep::Phone => (ScriptStep::Confirmation, false),
            ScriptStep::Confirmation => {
                if is_affirmative(reply) {
                    (ScriptStep::LivechatWaiting, true)
                } else {
                    (ScriptStep::Completed, false)
                }
            }
            _ => return self.noop(),
        };

        Advance {
            prompt: Some(prompt_text(next, &profile)),
            next,
            handoff: handoff.then(|| profile.clone()),
            profile,
        }
    }

    fn record(&mut self, field: ProfileField, reply: &str) {
        Self::record_into(&mut self.profile, field, reply);
    }

    fn noop(&self) -> Advance {
        Advance {
            prompt: None,
            next: self.step,
            handoff: None,
            profile: self.profile.clone(),
        }
    }

    /// First non-empty reply wins; later replies never overwrite a field.
    fn record_into(profile: &mut CustomerInfo, field: ProfileField, reply: &str) {
        let slot = match field {
            ProfileField::Name => &mut profile.name,
            ProfileField::Company => &mut profile.company,
            ProfileField::Service => &mut profile.service,
            ProfileField::Phone => &mut profile.phone,
        };
        if slot.is_empty() {
            *slot = reply.to_string();
        }
    }
}

/// Result of feeding one visitor reply to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advance {
    /// Prompt text to persist as a script-sender message, if any.
    pub prompt: Option<String>,
    /// Step the session is at once the prompt is persisted.
    pub next: ScriptStep,
    /// Profile snapshot when the visitor asked for a live agent.
    pub handoff: Option<CustomerInfo>,
    /// Profile after recording this reply.
    pub profile: CustomerInfo,
}

/// Read the persisted step tag from a script message's metadata.
fn tagged_step(message: &ChatMessage) -> Option<ScriptStep> {
    message
        .metadata
        .as_ref()
        .and_then(|meta| meta.get(STEP_METADATA_KEY))
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| raw.parse().ok())
}

/// Case-insensitive match against the confirmation allow-list.
fn is_affirmative(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    lower.contains(AFFIRMATIVE[0]) || lower.trim() == AFFIRMATIVE[1]
}

/// Prompt text for a step, interpolating previously collected fields.
///
/// The wording is the production copy of the Axes Trade assistant and is
/// load-bearing only for humans; state recovery goes through the metadata
/// tag, never through this text.
#[must_use]
pub fn prompt_text(step: ScriptStep, profile: &CustomerInfo) -> String {
    match step {
        ScriptStep::Welcome => "Bonjour et bienvenue chez Axes Trade ! 👋 Je suis votre \
             assistant virtuel. Comment puis-je vous aider aujourd'hui ?"
            .to_string(),
        ScriptStep::Name => "Pour mieux vous assister, j'aurais besoin de quelques \
             informations. Quel est votre nom ?"
            .to_string(),
        ScriptStep::Company => format!(
            "Merci {}. Et de quelle entreprise faites-vous partie ?",
            profile.name
        ),
        ScriptStep::Service => "Super ! Maintenant, pouvez-vous me dire quel type de service \
             ou produit vous intéresse ? (Imprimantes, consommables, maintenance, etc.)"
            .to_string(),
        ScriptStep::Phone => "Excellent ! Afin qu'un de nos conseillers puisse vous \
             recontacter, pourriez-vous me laisser votre numéro de téléphone ?"
            .to_string(),
        ScriptStep::Confirmation => format!(
            "Merci pour ces informations {}. Un conseiller d'Axes Trade vous contactera \
             très rapidement au {} concernant votre demande sur {}. Préférez-vous parler \
             immédiatement avec un conseiller en ligne ?",
            profile.name, profile.phone, profile.service
        ),
        ScriptStep::LivechatWaiting => "Je recherche un conseiller disponible pour vous. \
             Veuillez patienter quelques instants..."
            .to_string(),
        ScriptStep::Completed => format!(
            "Merci pour votre demande {}. Notre équipe vous contactera dans les plus brefs \
             délais. Bonne journée !",
            profile.name
        ),
        ScriptStep::Start | ScriptStep::Deactivated => String::new(),
    }
}
