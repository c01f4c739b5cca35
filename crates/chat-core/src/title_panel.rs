use serde::{Deserialize, Serialize};

/// Banner shown in the title panel area.
///
/// Declaration order is display priority: later variants win when the
/// renderer can only show one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum TitlePanelContext {
    ChatInfo,
    PinnedMessage,
    RequestInProgress,
    ToastAlert(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitlePanelKind {
    ChatInfo,
    PinnedMessage,
    RequestInProgress,
    ToastAlert,
}

impl TitlePanelContext {
    pub fn kind(&self) -> TitlePanelKind {
        match self {
            Self::ChatInfo => TitlePanelKind::ChatInfo,
            Self::PinnedMessage => TitlePanelKind::PinnedMessage,
            Self::RequestInProgress => TitlePanelKind::RequestInProgress,
            Self::ToastAlert(_) => TitlePanelKind::ToastAlert,
        }
    }
}

/// Priority-sorted set of title panel contexts, at most one per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitlePanelContexts(Vec<TitlePanelContext>);

impl TitlePanelContexts {
    /// Insert `context`, replacing any context of the same kind.
    pub fn insert(&mut self, context: TitlePanelContext) {
        let kind = context.kind();
        if let Some(existing) = self.0.iter_mut().find(|existing| existing.kind() == kind) {
            *existing = context;
            return;
        }
        self.0.push(context);
        self.0.sort();
    }

    pub fn remove_kind(&mut self, kind: TitlePanelKind) {
        self.0.retain(|context| context.kind() != kind);
    }

    pub fn contains_kind(&self, kind: TitlePanelKind) -> bool {
        self.0.iter().any(|context| context.kind() == kind)
    }

    /// Highest-priority context, the one a single-banner renderer shows.
    pub fn top(&self) -> Option<&TitlePanelContext> {
        self.0.last()
    }

    pub fn as_slice(&self) -> &[TitlePanelContext] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_contexts_sorted_by_priority() {
        let mut contexts = TitlePanelContexts::default();
        contexts.insert(TitlePanelContext::ToastAlert("Saved".into()));
        contexts.insert(TitlePanelContext::ChatInfo);
        contexts.insert(TitlePanelContext::RequestInProgress);
        contexts.insert(TitlePanelContext::PinnedMessage);

        assert_eq!(
            contexts.as_slice(),
            &[
                TitlePanelContext::ChatInfo,
                TitlePanelContext::PinnedMessage,
                TitlePanelContext::RequestInProgress,
                TitlePanelContext::ToastAlert("Saved".into()),
            ]
        );
        assert_eq!(
            contexts.top(),
            Some(&TitlePanelContext::ToastAlert("Saved".into()))
        );
    }

    #[test]
    fn newer_toast_replaces_older_in_place() {
        let mut contexts = TitlePanelContexts::default();
        contexts.insert(TitlePanelContext::ToastAlert("first".into()));
        contexts.insert(TitlePanelContext::PinnedMessage);
        contexts.insert(TitlePanelContext::ToastAlert("second".into()));

        assert_eq!(
            contexts.as_slice(),
            &[
                TitlePanelContext::PinnedMessage,
                TitlePanelContext::ToastAlert("second".into()),
            ]
        );
    }

    #[test]
    fn removes_by_kind_and_ignores_duplicates() {
        let mut contexts = TitlePanelContexts::default();
        contexts.insert(TitlePanelContext::RequestInProgress);
        contexts.insert(TitlePanelContext::RequestInProgress);
        assert_eq!(contexts.as_slice().len(), 1);

        contexts.remove_kind(TitlePanelKind::RequestInProgress);
        assert!(contexts.is_empty());
        assert!(!contexts.contains_kind(TitlePanelKind::RequestInProgress));
    }
}
