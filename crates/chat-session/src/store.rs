//! Serialized reducer over the presentation snapshot.
//!
//! Every change goes through [`PresentationStateStore::apply`], which runs the
//! caller's transform followed by the derivation pipeline: keyboard
//! reconciliation, input panel derivation, context-query and link-preview
//! slot updates, and a final re-derivation before the snapshot is committed.

use std::sync::Arc;

use chat_core::{
    Begin, ContextQuery, ContextQueryResult, LinkPreview, PresentationState, SessionChannels,
    SessionEvent, SideEffectSlot, SlotTicket, UrlPreview, context_query_for, reconcile_keyboard,
    url_preview_key,
};
use chat_platform::{ContextQueryResolver, LinkPreviewResolver};
use tracing::{debug, trace};

use crate::completion::{Completion, CompletionSender, forward};

pub struct PresentationStateStore {
    current: Arc<PresentationState>,
    version: u64,
    context_query: SideEffectSlot<ContextQuery, Option<ContextQueryResult>>,
    url_preview: SideEffectSlot<String, Option<LinkPreview>>,
    context_resolver: Arc<dyn ContextQueryResolver>,
    link_resolver: Arc<dyn LinkPreviewResolver>,
    completions: CompletionSender,
    channels: SessionChannels,
}

impl PresentationStateStore {
    pub fn new(
        initial: PresentationState,
        context_resolver: Arc<dyn ContextQueryResolver>,
        link_resolver: Arc<dyn LinkPreviewResolver>,
        completions: CompletionSender,
        channels: SessionChannels,
    ) -> Self {
        Self {
            current: Arc::new(initial.with_derived_input_panel()),
            version: 0,
            context_query: SideEffectSlot::new("context_query"),
            url_preview: SideEffectSlot::new("url_preview"),
            context_resolver,
            link_resolver,
            completions,
            channels,
        }
    }

    /// Latest committed snapshot.
    pub fn state(&self) -> Arc<PresentationState> {
        Arc::clone(&self.current)
    }

    pub fn current(&self) -> &PresentationState {
        &self.current
    }

    /// Run `transform` and the derivation pipeline, then commit and publish.
    pub fn apply<F>(&mut self, transform: F) -> Arc<PresentationState>
    where
        F: FnOnce(PresentationState) -> PresentationState,
    {
        let previous = Arc::clone(&self.current);
        let candidate = transform((*previous).clone());
        let candidate = reconcile_keyboard(&previous, candidate).with_derived_input_panel();
        let candidate = self.resolve_context_query(candidate);
        let candidate = self.resolve_url_preview(candidate);
        let candidate = candidate.with_derived_input_panel();

        if *previous == candidate {
            trace!(version = self.version, "state transform was a no-op");
            return previous;
        }

        let selection_changed =
            previous.interface_state.selection != candidate.interface_state.selection;
        self.version += 1;
        self.current = Arc::new(candidate);
        trace!(version = self.version, "committed presentation state");

        self.channels
            .emit(SessionEvent::StateUpdated(Arc::clone(&self.current)));
        if selection_changed {
            self.channels.emit(SessionEvent::SelectionChanged(
                self.current.interface_state.selection.clone(),
            ));
        }
        Arc::clone(&self.current)
    }

    /// Fold a deferred context-query answer in, unless it was superseded.
    pub fn complete_context_query(
        &mut self,
        ticket: SlotTicket,
        result: Option<ContextQueryResult>,
    ) {
        if !self.context_query.accept(ticket) {
            return;
        }
        debug!(found = result.is_some(), "context query resolved");
        self.apply(|state| state.with_context_query_result(result));
    }

    /// Fold a deferred link preview in, unless it was superseded.
    pub fn complete_url_preview(&mut self, ticket: SlotTicket, preview: Option<LinkPreview>) {
        if !self.url_preview.accept(ticket) {
            return;
        }
        let Some(url) = self.url_preview.key().cloned() else {
            return;
        };
        debug!(%url, found = preview.is_some(), "link preview resolved");
        self.apply(|state| state.with_url_preview(preview.map(|preview| UrlPreview { url, preview })));
    }

    /// Cancel outstanding resolutions; late completions are dropped afterwards.
    pub fn shutdown(&mut self) {
        self.context_query.cancel();
        self.url_preview.cancel();
    }

    fn resolve_context_query(&mut self, mut candidate: PresentationState) -> PresentationState {
        let query = context_query_for(candidate.input_text());
        if self.context_query.key() == query.as_ref() {
            candidate.context_query = query;
            return candidate;
        }

        let Some(query) = query else {
            self.context_query.cancel();
            candidate.context_query = None;
            return candidate.with_context_query_result(None);
        };

        candidate.context_query = Some(query.clone());
        let resolver = Arc::clone(&self.context_resolver);
        let begin = self.context_query.begin(
            query,
            move |query| resolver.resolve(query),
            forward(self.completions.clone(), |ticket, result| {
                Completion::ContextQuery { ticket, result }
            }),
        );
        match begin {
            Begin::Immediate(result) => candidate.with_context_query_result(result),
            // The previous result stays visible until the new one lands.
            Begin::Pending(_) => candidate,
        }
    }

    fn resolve_url_preview(&mut self, candidate: PresentationState) -> PresentationState {
        let key = url_preview_key(&candidate);
        if self.url_preview.key() == key.as_ref() {
            return candidate;
        }

        let Some(url) = key else {
            self.url_preview.cancel();
            return candidate.with_url_preview(None);
        };

        let resolver = Arc::clone(&self.link_resolver);
        let begin = self.url_preview.begin(
            url.clone(),
            move |url| resolver.resolve(url),
            forward(self.completions.clone(), |ticket, preview| {
                Completion::UrlPreview { ticket, preview }
            }),
        );
        match begin {
            Begin::Immediate(preview) => {
                candidate.with_url_preview(preview.map(|preview| UrlPreview { url, preview }))
            }
            Begin::Pending(_) => candidate.with_url_preview(None),
        }
    }
}
