//! Autocompletion queries, link detection and entity extraction over draft text.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    state::{ComposeState, PresentationState},
    types::{PeerId, PeerSnapshot, TextEntity, TextEntityKind},
};

/// Autocompletion request derived from the draft and caret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ContextQuery {
    Hashtag(String),
    Mention(String),
    Command(String),
    /// `@bot query` typed at the start of the draft.
    InlineBot { address_name: String, query: String },
}

impl ContextQuery {
    /// An inline bot was addressed but nothing was typed after it yet.
    pub fn is_empty_inline(&self) -> bool {
        matches!(self, Self::InlineBot { query, .. } if query.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineBot {
    pub peer_id: PeerId,
    pub address_name: String,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineResult {
    pub id: String,
    pub title: String,
    /// Text sent when the result is picked.
    pub message_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContextQueryResult {
    Hashtags(Vec<String>),
    Mentions(Vec<PeerSnapshot>),
    Commands(Vec<BotCommand>),
    InlineResults {
        bot: InlineBot,
        results: Vec<InlineResult>,
    },
}

impl ContextQueryResult {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Hashtags(items) => items.is_empty(),
            Self::Mentions(items) => items.is_empty(),
            Self::Commands(items) => items.is_empty(),
            Self::InlineResults { results, .. } => results.is_empty(),
        }
    }
}

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '"', '\''];

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_hashtag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Derive the autocompletion query for `input`, if the caret sits in one.
pub fn context_query_for(input: &ComposeState) -> Option<ContextQuery> {
    if let Some(query) = inline_bot_query(&input.text) {
        return Some(query);
    }
    if !input.selection.is_collapsed() {
        return None;
    }

    let chars: Vec<char> = input.text.chars().collect();
    let caret = input.selection.end.min(chars.len());
    let start = chars[..caret]
        .iter()
        .rposition(|c| c.is_whitespace())
        .map_or(0, |position| position + 1);
    let (&first, rest) = chars[start..caret].split_first()?;
    let rest: String = rest.iter().collect();

    match first {
        '@' if rest.chars().all(is_username_char) => Some(ContextQuery::Mention(rest)),
        '#' if rest.chars().all(is_hashtag_char) => Some(ContextQuery::Hashtag(rest)),
        '/' if start == 0 && rest.chars().all(is_username_char) => {
            Some(ContextQuery::Command(rest))
        }
        _ => None,
    }
}

fn inline_bot_query(text: &str) -> Option<ContextQuery> {
    let rest = text.strip_prefix('@')?;
    let name_len = rest
        .find(|c: char| !is_username_char(c))
        .unwrap_or(rest.len());
    let (name, tail) = rest.split_at(name_len);
    let query = tail.strip_prefix(' ')?;
    if name.is_empty() {
        return None;
    }
    Some(ContextQuery::InlineBot {
        address_name: name.to_owned(),
        query: query.to_owned(),
    })
}

/// First link in `text` eligible for a preview, as written by the user.
pub fn detect_preview_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_end_matches(TRAILING_PUNCTUATION))
        .find(|token| is_previewable(token))
        .map(str::to_owned)
}

fn is_previewable(token: &str) -> bool {
    let parsed = if token.starts_with("http://") || token.starts_with("https://") {
        Url::parse(token)
    } else if token.starts_with("www.") {
        Url::parse(&format!("https://{token}"))
    } else {
        return false;
    };
    parsed
        .ok()
        .and_then(|url| url.host_str().map(|host| host.contains('.')))
        .unwrap_or(false)
}

/// Link-preview slot key for the focused input, honouring the dismissal marker.
pub fn url_preview_key(state: &PresentationState) -> Option<String> {
    let input = state.input_text();
    let url = detect_preview_url(&input.text)?;
    if input.disabled_preview_url.as_deref() == Some(url.as_str()) {
        return None;
    }
    Some(url)
}

/// Extract url, mention, hashtag and command entities from outgoing text.
pub fn text_entities(text: &str) -> Vec<TextEntity> {
    let mut entities = Vec::new();
    let mut offset = 0;
    for token in text.split(char::is_whitespace) {
        let trimmed = token.trim_end_matches(TRAILING_PUNCTUATION);
        if let Some(kind) = entity_kind(trimmed) {
            entities.push(TextEntity {
                kind,
                offset,
                length: trimmed.chars().count(),
            });
        }
        offset += token.chars().count() + 1;
    }
    entities
}

fn entity_kind(token: &str) -> Option<TextEntityKind> {
    if is_previewable(token) {
        return Some(TextEntityKind::Url);
    }
    let mut chars = token.chars();
    let first = chars.next()?;
    let rest = chars.as_str();
    if rest.is_empty() {
        return None;
    }
    match first {
        '@' if rest.chars().all(is_username_char) => Some(TextEntityKind::Mention),
        '#' if rest.chars().all(is_hashtag_char) => Some(TextEntityKind::Hashtag),
        '/' if rest
            .split('@')
            .all(|part| !part.is_empty() && part.chars().all(is_username_char)) =>
        {
            Some(TextEntityKind::BotCommand)
        }
        _ => None,
    }
}
